//! Unit tests for RePlots modules through the public API
//!
//! These cover the pieces the integration tests only reach indirectly:
//! error severities, the execution client, calendar decoding, reductions
//! and the string forms accepted in case configurations.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use ndarray::{array, Array3};
use replots::{
    calendar::{CalendarField, TimeUnits},
    climatology::{climatology_path, AvgType},
    config::CaseConfig,
    diagnostics::{resolve, DiagnosticType},
    errors::{ErrorKind, ReplotsError},
    file_selector::{history_span, HistoryType},
    netcdf_io::NetcdfFormat,
    parallel::{ClientMode, ExecutionClient},
    plots::PlotKind,
    statistics::{nanmean_axis, nanmean_groups, nanmean_series, TimeGroups},
};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

#[test]
fn test_error_kinds() {
    let unknown_plot = ReplotsError::UnknownPlotType("PM_BOGUS".to_string());
    assert_eq!(unknown_plot.kind(), ErrorKind::Recoverable);
    assert_eq!(
        unknown_plot.to_string(),
        "Unknown plot type requested: \"PM_BOGUS\""
    );

    let missing_tool = ReplotsError::ToolMissing {
        tool: "ncks".to_string(),
        reason: "not found".to_string(),
    };
    assert!(!missing_tool.is_recoverable());
    assert!(missing_tool
        .to_string()
        .contains("ncks is required to run the ocean diagnostics package"));

    let var_err = ReplotsError::VariableNotFound {
        var: "temp".to_string(),
    };
    assert_eq!(var_err.kind(), ErrorKind::Fatal);
    assert!(var_err.to_string().contains("Variable 'temp' not found"));
}

#[test]
fn test_client_sizes_from_launcher_environment() {
    let local = ExecutionClient::start_with_env(ClientMode::Local, Some(3), &env(&[]))
        .expect("Failed to start local client");
    assert_eq!(local.workers(), 3);
    assert_eq!(local.mode(), ClientMode::Local);

    let lsf = ExecutionClient::start_with_env(
        ClientMode::Lsf,
        Some(64),
        &env(&[("LSB_DJOB_NUMPROC", "4")]),
    )
    .expect("Failed to start LSF client");
    // thread override is ignored under a launcher
    assert_eq!(lsf.workers(), 4);

    let err = ExecutionClient::start_with_env(ClientMode::Lsf, None, &env(&[])).unwrap_err();
    assert!(matches!(err, ReplotsError::ClientInitialization(_)));
}

#[test]
fn test_batch_collects_every_failure() {
    let client = ExecutionClient::start_with_env(ClientMode::Local, Some(2), &env(&[])).unwrap();

    let squares = client
        .run_batch(&[1, 2, 3, 4], |n| Ok(n * n))
        .expect("Batch failed");
    assert_eq!(squares, vec![1, 4, 9, 16]);

    let err = client
        .run_batch(&[1, 2, 3, 4], |n| {
            if n % 2 == 0 {
                Err(ReplotsError::StatisticsError(format!("unit {n}")))
            } else {
                Ok(*n)
            }
        })
        .unwrap_err();
    match err {
        ReplotsError::BatchFailed { total, failures } => {
            assert_eq!(total, 4);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("expected BatchFailed, got {other}"),
    }
}

#[test]
fn test_calendar_decoding() {
    let noleap = TimeUnits::parse("days since 2000-01-01 00:00:00", "noleap").unwrap();
    // no Feb 29 in a noleap year
    let date = noleap.decode(59.0).unwrap();
    assert_eq!((date.year, date.month, date.day), (2000, 3, 1));
    let next_year = noleap.decode(365.0).unwrap();
    assert_eq!((next_year.year, next_year.month, next_year.day), (2001, 1, 1));

    let standard = TimeUnits::parse("seconds since 2000-01-01", "gregorian").unwrap();
    let leap_day = standard.decode(59.0 * 86_400.0).unwrap();
    assert_eq!((leap_day.month, leap_day.day), (2, 29));

    let day360 = TimeUnits::parse("days since 2000-01-01", "360_day").unwrap();
    let date = day360.decode(30.0 * 11.0 + 29.0).unwrap();
    assert_eq!((date.year, date.month, date.day), (2000, 12, 30));

    assert!(TimeUnits::parse("days after 2000-01-01", "noleap").is_err());
    assert!(TimeUnits::parse("days since 2000-01-01", "all_leap").is_err());
}

#[test]
fn test_nan_skipping_reductions() {
    let data = array![[1.0, f64::NAN, 3.0], [f64::NAN, f64::NAN, 5.0]].into_dyn();

    let mean = nanmean_axis(data.view(), 1).unwrap();
    assert_eq!(mean.shape(), &[2]);
    assert!((mean[[0]] - 2.0).abs() < 1e-12);
    assert!((mean[[1]] - 5.0).abs() < 1e-12);

    let column = nanmean_axis(data.view(), 0).unwrap();
    assert!(column[[1]].is_nan(), "all-missing cell stays missing");

    assert!(nanmean_axis(data.view(), 2).is_err());

    let series = nanmean_series(data.view(), 0).unwrap();
    assert!((series[0] - 2.0).abs() < 1e-12);
    assert!((series[1] - 5.0).abs() < 1e-12);
}

#[test]
fn test_grouped_means_follow_group_order() {
    let data = Array3::from_shape_fn((4, 1, 2), |(t, _, j)| (t * 10 + j) as f64).into_dyn();
    let groups = vec![vec![0, 2], vec![1, 3]];

    let means = nanmean_groups(data.view(), 0, &groups).unwrap();
    assert_eq!(means.shape(), &[2, 1, 2]);
    assert!((means[[0, 0, 0]] - 10.0).abs() < 1e-12);
    assert!((means[[1, 0, 1]] - 21.0).abs() < 1e-12);

    assert!(nanmean_groups(data.view(), 0, &[]).is_err());
}

#[test]
fn test_season_groups() {
    let units = TimeUnits::parse("days since 2001-01-01", "noleap").unwrap();
    let mid_months: Vec<f64> = (0..12_u32).map(|m| f64::from(m) * 30.0 + 15.0).collect();
    let dates = units.decode_all(&mid_months).unwrap();

    let groups = TimeGroups::new(CalendarField::Season, &dates);
    assert_eq!(groups.keys, vec![0, 1, 2, 3]);
    assert!(groups.indices.iter().all(|g| g.len() == 3));
    // December joins January and February
    assert!(groups.indices[0].contains(&11));
}

#[test]
fn test_avgtype_and_format_names() {
    assert_eq!("time".parse::<AvgType>().unwrap(), AvgType::Time);
    assert_eq!(
        "dayofyear".parse::<AvgType>().unwrap(),
        AvgType::Grouped(CalendarField::DayOfYear)
    );
    assert!("decade".parse::<AvgType>().is_err());
    assert_eq!(AvgType::Grouped(CalendarField::Month).to_string(), "month");

    assert_eq!(
        climatology_path(&PathBuf::from("/tavg"), "gom.ocn.hi", "season"),
        PathBuf::from("/tavg/gom.ocn.hi.season.nc")
    );

    assert_eq!("netcdfLarge".parse::<NetcdfFormat>().unwrap(), NetcdfFormat::Large);
    assert_eq!(NetcdfFormat::from_config("hdf"), NetcdfFormat::Netcdf4);
}

#[test]
fn test_diagnostic_and_plot_names() {
    let kinds = resolve(&["MODEL", "MODEL_VS_CONTROL"]).unwrap();
    assert_eq!(kinds, vec![DiagnosticType::Model, DiagnosticType::ModelVsControl]);
    assert_eq!(DiagnosticType::ModelTimeseries.dir_name(), "model_timeseries");

    let err = resolve(&["MODEL", "MODEL_VS_BOGUS"]).unwrap_err();
    assert!(matches!(err, ReplotsError::UnknownDiagnosticType(_)));
    assert!(matches!(resolve(&[]), Err(ReplotsError::Config(_))));

    assert_eq!("PM_CNTRDEPTH".parse::<PlotKind>().unwrap(), PlotKind::CntrDepth);
    assert!("PM_BOGUS".parse::<PlotKind>().unwrap_err().is_recoverable());
}

#[test]
fn test_history_span_from_file_names() {
    let slices = vec![
        PathBuf::from("/a/case.ocn.hi.2010-02-01.nc"),
        PathBuf::from("/a/case.ocn.hi.2011-11-01.nc"),
    ];
    let span = history_span(&slices).unwrap();
    assert_eq!((span.start_year, span.start_month), (2010, 2));
    assert_eq!((span.stop_year, span.stop_month), (2011, 11));
    assert_eq!(span.history_type, HistoryType::Slice);
    assert_eq!(span.months(), 22);

    let series = vec![PathBuf::from("/a/case.ocn.hi.temp.201001-201412.nc")];
    let span = history_span(&series).unwrap();
    assert_eq!(span.history_type, HistoryType::Series);
    assert_eq!(span.months(), 60);

    assert!(history_span(&[]).is_err());
}

#[test]
fn test_case_config_environment_overrides() {
    let text = r#"
CASE = "gom9k"
YEAR0 = "2010-01-01"
YEAR1 = "2010-12-31"
DOUT_PATHS = ["/archive"]
MODEL = true
"#;
    let mut overrides = BTreeMap::new();
    overrides.insert("CASE".to_string(), "gom3k".to_string());

    let config = CaseConfig::from_toml_str(text, &overrides).expect("Failed to parse config");
    assert_eq!(config.case, "gom3k");
    assert_eq!(config.case_prefix(), "gom3k.ocn.hi");
    assert_eq!(config.requested_diagnostics(), vec!["MODEL"]);
    assert!(matches!(config.workdir(), Err(ReplotsError::Config(_))));
}
