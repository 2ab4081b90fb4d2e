mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use tempfile::tempdir;

use common::{monthly_days, touch, write_history, ETA, XI};
use replots::climatology::{average, run_case};
use replots::config::CaseConfig;
use replots::dataset::DatasetHandle;
use replots::diagnostics::{run_diagnostics, DiagnosticType};
use replots::file_selector::select;
use replots::netcdf_io::read_file_variable;
use replots::parallel::ClientMode;
use replots::report::{record_webdir, write_index, ReportContext};
use replots::ReplotsError;

fn names(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

/// Two years of monthly history in two files; step `t` has value `t % 12 + 100 * (t / 12)`.
fn two_year_dataset(dir: &Path) -> DatasetHandle {
    let value = |offset: usize| move |t: usize| ((offset + t) % 12) as f64 + 100.0 * ((offset + t) / 12) as f64;
    let first = write_history(&dir.join("case.ocn.hi.2010-01-15.nc"), &monthly_days(0, 12), value(0));
    let second = write_history(&dir.join("case.ocn.hi.2011-01-15.nc"), &monthly_days(12, 12), value(12));

    let mut dataset = DatasetHandle::new();
    dataset.open(&[first, second]).expect("Failed to open dataset");
    dataset
        .start_client_with(ClientMode::Local, Some(2))
        .expect("Failed to start client");
    dataset
}

fn case_config(root: &Path, extra: &str) -> CaseConfig {
    let text = format!(
        r#"
CASE = "case"
YEAR0 = "2010-01-01"
YEAR1 = "2011-12-31"
DOUT_PATHS = ["{root}"]
MODELCASE_SUBDIR = "hist"
TAVGDIR = "{tavg}"
WORKDIR = "{work}"
MODEL_VARLIST = ["zeta", "temp"]
AVG_TYPES = ["time", "month"]
{extra}

[plots]
width = 400
height = 300
depths = [0.0, 50.0, 100.0, 500.0]
"#,
        root = root.display(),
        tavg = root.join("tavg").display(),
        work = root.join("diag").display(),
    );
    CaseConfig::from_toml_str(&text, &BTreeMap::new()).expect("Failed to parse case config")
}

#[test]
fn test_date_window_keeps_files_inside_range() {
    let root = tempdir().expect("Failed to create temp dir");
    let hist = root.path().join("hist");
    fs::create_dir(&hist).unwrap();
    for date in ["2010-01-15", "2010-03-01", "2010-07-01"] {
        touch(&hist.join(format!("case.ocn.hi.{date}.nc")));
    }
    touch(&hist.join("other.ocn.hi.2010-03-01.nc"));

    let files = select(
        &[root.path().to_path_buf()],
        "case",
        "ocn",
        "hi",
        "hist/",
        "2010-02-01",
        "2010-06-07",
        "%Y-%m-%d",
    )
    .expect("Selection failed");

    assert_eq!(names(&files), vec!["case.ocn.hi.2010-03-01.nc"]);
}

#[test]
fn test_selection_keeps_root_order() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    for date in ["2010-05-01", "2010-04-01"] {
        touch(&a.path().join(format!("case.ocn.hi.{date}.nc")));
    }
    touch(&b.path().join("case.ocn.hi.2010-01-01.nc"));

    let files = select(
        &[a.path().to_path_buf(), b.path().to_path_buf()],
        "case",
        "ocn",
        "hi",
        "",
        "2010-01-01",
        "2010-12-31",
        "%Y-%m-%d",
    )
    .unwrap();

    // sorted within each root, roots in the given order
    assert_eq!(
        names(&files),
        vec![
            "case.ocn.hi.2010-04-01.nc",
            "case.ocn.hi.2010-05-01.nc",
            "case.ocn.hi.2010-01-01.nc"
        ]
    );
}

#[test]
fn test_missing_root_fails_without_output() {
    let root = tempdir().unwrap();
    let config = case_config(root.path(), "");

    let err = run_case(&config, false, ClientMode::Local, Some(1)).unwrap_err();
    assert!(matches!(err, ReplotsError::DirectoryNotFound { .. }));
    assert!(!root.path().join("tavg").exists());
}

#[test]
fn test_time_mean_over_two_files() {
    let dir = tempdir().unwrap();
    let dataset = two_year_dataset(dir.path());
    let out = dir.path().join("tavg");

    let path = average(&dataset, &out, "case.ocn.hi", &["zeta".to_string()], "ocean_time", "time")
        .expect("Time average failed");
    assert_eq!(path, out.join("case.ocn.hi.time.nc"));

    let zeta = read_file_variable(&path, "zeta").unwrap();
    assert_eq!(zeta.shape(), &[ETA, XI]);
    // mean of month (0..12) is 5.5, mean of 100 * year is 50
    assert!((zeta[[1, 1]] - 55.5).abs() < 1e-9);
    assert!(zeta[[0, 0]].is_nan(), "land stays missing");

    let file = netcdf::open(&path).unwrap();
    let var = file.variable("zeta").unwrap();
    assert!(var.attribute("grid").is_none());
    assert!(var.attribute("long_name").is_some());
    assert!(file.variable("lon_rho").is_some(), "coordinates are carried");
    assert!(file.attribute("history").is_some());
}

#[test]
fn test_small_chunks_read_the_same_values() {
    let dir = tempdir().unwrap();
    let default = two_year_dataset(dir.path());
    let files = default.files().to_vec();

    // 12 steps per file read as chunks of 5, 5 and 2
    let mut chunked = DatasetHandle::new().with_chunk_size(5);
    chunked.open(&files).expect("Failed to open dataset");
    chunked
        .start_client_with(ClientMode::Local, Some(2))
        .expect("Failed to start client");
    assert_eq!(chunked.chunk_size(), 5);

    let expected = default.read_variable("temp").unwrap();
    let actual = chunked.read_variable("temp").unwrap();
    assert_eq!(actual.shape(), &[24, 2, ETA, XI]);
    assert_eq!(actual.shape(), expected.shape());
    for (a, b) in actual.iter().zip(expected.iter()) {
        assert!(a == b || (a.is_nan() && b.is_nan()), "{a} != {b}");
    }
    assert!((actual[[13, 0, 1, 1]] - 101.0).abs() < 1e-12);

    let vars = ["temp".to_string()];
    let from_default = average(&default, &dir.path().join("a"), "case.ocn.hi", &vars, "ocean_time", "month").unwrap();
    let from_chunked = average(&chunked, &dir.path().join("b"), "case.ocn.hi", &vars, "ocean_time", "month").unwrap();
    let a = read_file_variable(&from_default, "temp").unwrap();
    let b = read_file_variable(&from_chunked, "temp").unwrap();
    assert_eq!(a.shape(), &[12, 2, ETA, XI]);
    assert_eq!(
        a.iter().filter(|v| v.is_finite()).collect::<Vec<_>>(),
        b.iter().filter(|v| v.is_finite()).collect::<Vec<_>>()
    );
}

#[test]
fn test_monthly_climatology_has_twelve_slices() {
    let dir = tempdir().unwrap();
    let dataset = two_year_dataset(dir.path());
    let out = dir.path().join("tavg");

    let path = average(&dataset, &out, "case.ocn.hi", &["zeta".to_string(), "temp".to_string()], "ocean_time", "month")
        .expect("Monthly average failed");

    let month = read_file_variable(&path, "month").unwrap();
    assert_eq!(month.iter().copied().collect::<Vec<_>>(), (1..=12_i32).map(f64::from).collect::<Vec<_>>());

    let zeta = read_file_variable(&path, "zeta").unwrap();
    assert_eq!(zeta.shape(), &[12, ETA, XI]);
    for m in 0..12 {
        assert!((zeta[[m, 2, 3]] - (m as f64 + 50.0)).abs() < 1e-9);
    }

    let temp = read_file_variable(&path, "temp").unwrap();
    assert_eq!(temp.shape(), &[12, 2, ETA, XI]);
    assert!((temp[[0, 1, 1, 1]] - 60.0).abs() < 1e-9);
}

#[test]
fn test_rerun_overwrites_identically() {
    let dir = tempdir().unwrap();
    let dataset = two_year_dataset(dir.path());
    let out = dir.path().join("tavg");
    let vars = ["zeta".to_string()];

    let first = average(&dataset, &out, "case.ocn.hi", &vars, "ocean_time", "season").unwrap();
    let before = read_file_variable(&first, "zeta").unwrap();
    let second = average(&dataset, &out, "case.ocn.hi", &vars, "ocean_time", "season").unwrap();
    let after = read_file_variable(&second, "zeta").unwrap();

    assert_eq!(first, second);
    assert_eq!(before.shape(), &[4, ETA, XI]);
    assert_eq!(
        before.iter().filter(|v| v.is_finite()).collect::<Vec<_>>(),
        after.iter().filter(|v| v.is_finite()).collect::<Vec<_>>()
    );
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[test]
fn test_climatology_command_writes_every_avgtype() {
    let root = tempdir().unwrap();
    let hist = root.path().join("hist");
    fs::create_dir(&hist).unwrap();
    write_history(&hist.join("case.ocn.hi.2010-01-15.nc"), &monthly_days(0, 12), |t| t as f64);
    write_history(&hist.join("case.ocn.hi.2011-01-15.nc"), &monthly_days(12, 12), |t| (t + 12) as f64);
    let config = case_config(root.path(), "");

    let written = run_case(&config, false, ClientMode::Local, Some(2)).expect("Climatology failed");
    assert_eq!(
        names(&written),
        vec!["case.ocn.hi.time.nc", "case.ocn.hi.month.nc"]
    );
    let zeta = read_file_variable(&written[0], "zeta").unwrap();
    assert!((zeta[[2, 2]] - 11.5).abs() < 1e-9);
}

#[test]
fn test_unavailable_diagnostic_is_skipped() {
    let root = tempdir().unwrap();
    let hist = root.path().join("hist");
    fs::create_dir(&hist).unwrap();
    let files = vec![
        write_history(&hist.join("case.ocn.hi.2010-01-15.nc"), &monthly_days(0, 6), |t| t as f64),
        write_history(&hist.join("case.ocn.hi.2010-07-15.nc"), &monthly_days(6, 6), |t| (t + 6) as f64),
    ];
    // MODEL_VS_OBS has no observation root, so it must be skipped
    let config = case_config(root.path(), "MODEL = true\nMODEL_VS_OBS = true\nMODEL_TIMESERIES = true");

    let mut dataset = DatasetHandle::new();
    dataset.open(&files).unwrap();
    dataset.start_client_with(ClientMode::Local, Some(2)).unwrap();

    let outputs = run_diagnostics(&config, &dataset, &config.requested_diagnostics())
        .expect("Diagnostics aborted");
    let kinds: Vec<_> = outputs.iter().map(|o| o.diagnostic).collect();
    assert_eq!(kinds, vec![DiagnosticType::Model, DiagnosticType::ModelTimeseries]);

    let workdir = root.path().join("diag");
    let model = &outputs[0];
    let plots = names(&model.plots);
    assert!(plots.contains(&"zeta.png".to_string()));
    // temp is 10 m and 200 m deep, so 500 m has no water
    for depth in ["0", "50", "100"] {
        assert!(plots.contains(&format!("temp_{depth}m.png")), "missing temp at {depth} m");
    }
    assert!(!plots.contains(&"temp_500m.png".to_string()));
    for plot in &model.plots {
        let bytes = fs::read(plot).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
    assert!(workdir.join("model_timeseries/zeta.png").exists());

    let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let context = ReportContext::from_config(&config, now);
    assert_eq!(context.start_year, "2010");
    let index = write_index(&context, &outputs, &workdir).unwrap();
    let html = fs::read_to_string(index).unwrap();
    assert!(html.contains("href=\"model/zeta.png\""));
    assert!(html.contains("href=\"model_timeseries/temp.png\""));

    let marker = record_webdir(&config, &workdir, now).expect("Marker not written");
    assert_eq!(
        fs::read_to_string(marker).unwrap(),
        format!("OCNDIAG_WEBDIR:{}\n", workdir.display())
    );
}

#[test]
fn test_vertical_level_mismatch_skips_diagnostics() {
    let dir = tempdir().unwrap();
    let dataset = two_year_dataset(dir.path());

    // the history files have 2 levels
    let wrong = case_config(dir.path(), "MODEL = true\nVERTICAL = 30");
    let outputs = run_diagnostics(&wrong, &dataset, &wrong.requested_diagnostics())
        .expect("Level mismatch must not abort the run");
    assert!(outputs.is_empty());

    let right = case_config(dir.path(), "MODEL = true\nVERTICAL = 2\nPLOT_SETS = [\"PM_FLD2D\"]");
    let outputs = run_diagnostics(&right, &dataset, &right.requested_diagnostics()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(names(&outputs[0].plots), vec!["zeta.png"]);
}

#[test]
fn test_no_requested_diagnostics_is_an_error() {
    let dir = tempdir().unwrap();
    let dataset = two_year_dataset(dir.path());
    let config = case_config(dir.path(), "");

    let err = run_diagnostics(&config, &dataset, &config.requested_diagnostics()).unwrap_err();
    assert!(matches!(err, ReplotsError::Config(_)));
}
