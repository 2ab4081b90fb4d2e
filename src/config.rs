//! Case configuration.
//!
//! A case is described by a TOML file whose keys follow the post-processing
//! environment names (`CASE`, `YEAR0`, `DOUT_PATHS`, ...). Any environment
//! variable carrying the `OCNDIAG_` prefix overrides the file value after the
//! prefix is stripped, so `OCNDIAG_YEAR1=2010-06-30` replaces `YEAR1`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::{ReplotsError, Result};

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "OCNDIAG_";

const BOOL_KEYS: &[&str] = &[
    "MODEL",
    "MODEL_VS_OBS",
    "MODEL_VS_CONTROL",
    "MODEL_TIMESERIES",
];
const INT_KEYS: &[&str] = &["VERTICAL"];
const LIST_KEYS: &[&str] = &["DOUT_PATHS", "MODEL_VARLIST", "CNTRL_VARLIST", "AVG_TYPES", "PLOT_SETS"];

/// Immutable configuration for one model case.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseConfig {
    /// Case name, the first component of every history file name.
    #[serde(rename = "CASE")]
    pub case: String,

    /// Model component tag (`ocn`).
    #[serde(rename = "COMP", default = "default_comp")]
    pub comp: String,

    /// History file suffix following the component (`hi`, `pop.h`).
    #[serde(rename = "OCN_SUFFIX", default = "default_suffix")]
    pub suffix: String,

    /// Archive roots searched for history files.
    #[serde(rename = "DOUT_PATHS", default, deserialize_with = "comma_list")]
    pub dout_paths: Vec<PathBuf>,

    /// Sub-directory of each archive root holding the history files.
    #[serde(rename = "MODELCASE_SUBDIR", default)]
    pub subdir: String,

    /// First date of the averaging window.
    #[serde(rename = "YEAR0")]
    pub start_date: String,

    /// Last date of the averaging window (inclusive).
    #[serde(rename = "YEAR1")]
    pub end_date: String,

    /// chrono format of `YEAR0`/`YEAR1`.
    #[serde(rename = "DATE_PATTERN", default = "default_date_pattern")]
    pub date_pattern: String,

    /// Variables to average; empty means all.
    #[serde(rename = "MODEL_VARLIST", default, deserialize_with = "comma_list")]
    pub model_varlist: Vec<String>,

    /// Variables to average for the control case; empty means all.
    #[serde(rename = "CNTRL_VARLIST", default, deserialize_with = "comma_list")]
    pub cntrl_varlist: Vec<String>,

    /// Time dimension name.
    #[serde(rename = "TIME_DIM", default = "default_time_dim")]
    pub time_dim: String,

    /// Climatologies to produce.
    #[serde(rename = "AVG_TYPES", default = "default_avg_types", deserialize_with = "comma_list")]
    pub avg_types: Vec<String>,

    /// Output format: `netcdf`, `netcdfLarge`, `netcdf4` or `netcdf4c`.
    #[serde(default = "default_netcdf_format")]
    pub netcdf_format: String,

    /// Number of ocean vertical levels (`s_rho` length); 0 skips the level check.
    #[serde(rename = "VERTICAL", default)]
    pub vertical: i64,

    /// Climatology output directory.
    #[serde(rename = "TAVGDIR", default)]
    pub tavgdir: Option<PathBuf>,

    /// Diagnostics working directory (plots and `index.html`).
    #[serde(rename = "WORKDIR", default)]
    pub workdir: Option<PathBuf>,

    /// Root of observation files for model-vs-observation plots.
    #[serde(rename = "DIAGOBSROOT", default)]
    pub diag_obs_root: Option<PathBuf>,

    /// File-name prefix of the observation files under `DIAGOBSROOT`.
    #[serde(rename = "OBS_PREFIX", default = "default_obs_prefix")]
    pub obs_prefix: String,

    /// Control case name.
    #[serde(rename = "CNTRLCASE", default)]
    pub cntrl_case: Option<String>,

    /// Archive root of the control case.
    #[serde(rename = "CNTRLCASEDIR", default)]
    pub cntrl_case_dir: Option<PathBuf>,

    #[serde(rename = "CNTRLCASE_SUBDIR", default)]
    pub cntrl_subdir: String,

    #[serde(rename = "CNTRLYEAR0", default)]
    pub cntrl_start_date: Option<String>,

    #[serde(rename = "CNTRLYEAR1", default)]
    pub cntrl_end_date: Option<String>,

    #[serde(rename = "MODEL", default)]
    pub model: bool,

    #[serde(rename = "MODEL_VS_OBS", default)]
    pub model_vs_obs: bool,

    #[serde(rename = "MODEL_VS_CONTROL", default)]
    pub model_vs_control: bool,

    #[serde(rename = "MODEL_TIMESERIES", default)]
    pub model_timeseries: bool,

    /// Plot sets run by every diagnostic, by short name.
    #[serde(rename = "PLOT_SETS", default = "default_plot_sets", deserialize_with = "comma_list")]
    pub plot_sets: Vec<String>,

    #[serde(rename = "CESM_TAG", default)]
    pub cesm_tag: Option<String>,

    #[serde(rename = "USER_NAME", default)]
    pub user_name: Option<String>,

    /// Post-processing case path; the web-dir marker goes to `web_dirs/` under it.
    #[serde(rename = "PP_CASE_PATH", default)]
    pub pp_case_path: Option<PathBuf>,

    #[serde(default)]
    pub plots: PlotSettings,
}

/// Which history files make up a case and which variables to average.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySelection {
    pub case: String,
    pub roots: Vec<PathBuf>,
    pub subdir: String,
    pub start_date: String,
    pub end_date: String,
    pub variables: Vec<String>,
}

/// Figure settings shared by every plot set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotSettings {
    #[serde(default = "default_titlesize")]
    pub fig_titlesize: u32,
    #[serde(default = "default_ticksize")]
    pub fig_ticksize: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub top_labels: bool,
    #[serde(default = "default_true")]
    pub bottom_labels: bool,
    #[serde(default = "default_true")]
    pub left_labels: bool,
    #[serde(default)]
    pub right_labels: bool,
    /// Gridline spacing in degrees.
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,
    #[serde(default = "default_contour_levels")]
    pub contour_levels: usize,
    #[serde(default = "default_lon_var")]
    pub lon_var: String,
    #[serde(default = "default_lat_var")]
    pub lat_var: String,
    /// Vertical coordinate (1-D depth or 3-D z), negative or positive down.
    #[serde(default = "default_depth_var")]
    pub depth_var: String,
    #[serde(default = "default_surface_fields")]
    pub surface_fields: Vec<String>,
    #[serde(default = "default_depth_fields")]
    pub depth_fields: Vec<String>,
    /// Depths in metres for the contour-at-depth plot set.
    #[serde(default = "default_depths")]
    pub depths: Vec<f64>,
    #[serde(default = "default_timeseries_fields")]
    pub timeseries_fields: Vec<String>,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            fig_titlesize: default_titlesize(),
            fig_ticksize: default_ticksize(),
            width: default_width(),
            height: default_height(),
            top_labels: false,
            bottom_labels: true,
            left_labels: true,
            right_labels: false,
            grid_step: default_grid_step(),
            contour_levels: default_contour_levels(),
            lon_var: default_lon_var(),
            lat_var: default_lat_var(),
            depth_var: default_depth_var(),
            surface_fields: default_surface_fields(),
            depth_fields: default_depth_fields(),
            depths: default_depths(),
            timeseries_fields: default_timeseries_fields(),
        }
    }
}

fn default_comp() -> String {
    "ocn".to_string()
}
fn default_suffix() -> String {
    "hi".to_string()
}
fn default_date_pattern() -> String {
    "%Y-%m-%d".to_string()
}
fn default_time_dim() -> String {
    "ocean_time".to_string()
}
fn default_avg_types() -> Vec<String> {
    ["time", "season", "month", "year"].map(String::from).to_vec()
}
fn default_netcdf_format() -> String {
    "netcdf4".to_string()
}
fn default_obs_prefix() -> String {
    "obs".to_string()
}
fn default_plot_sets() -> Vec<String> {
    vec!["PM_FLD2D".to_string(), "PM_CNTRDEPTH".to_string()]
}
fn default_titlesize() -> u32 {
    16
}
fn default_ticksize() -> u32 {
    12
}
fn default_width() -> u32 {
    1500
}
fn default_height() -> u32 {
    1300
}
fn default_true() -> bool {
    true
}
fn default_grid_step() -> f64 {
    5.0
}
fn default_contour_levels() -> usize {
    8
}
fn default_lon_var() -> String {
    "lon_rho".to_string()
}
fn default_lat_var() -> String {
    "lat_rho".to_string()
}
fn default_depth_var() -> String {
    "z_rho".to_string()
}
fn default_surface_fields() -> Vec<String> {
    ["sustr", "svstr", "zeta"].map(String::from).to_vec()
}
fn default_depth_fields() -> Vec<String> {
    ["salt", "temp", "rho", "u", "v", "w"].map(String::from).to_vec()
}
fn default_depths() -> Vec<f64> {
    vec![
        0.0, 50.0, 100.0, 200.0, 300.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, 3500.0,
        4000.0,
    ]
}
fn default_timeseries_fields() -> Vec<String> {
    ["zeta", "temp", "salt"].map(String::from).to_vec()
}

/// Accepts either a TOML array or a comma-separated string.
fn comma_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Joined(String),
        List(Vec<String>),
    }

    let items = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Joined(s) => split_list(&s),
        OneOrMany::List(v) => v,
    };
    Ok(items.into_iter().map(T::from).collect())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Strip `prefix` from every key that carries it; other keys pass through.
pub fn strip_prefix(map: BTreeMap<String, String>, prefix: &str) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(k, v)| match k.strip_prefix(prefix) {
            Some(stripped) => (stripped.to_string(), v),
            None => (k, v),
        })
        .collect()
}

fn is_true(value: &str) -> Option<bool> {
    match value.to_ascii_uppercase().as_str() {
        "T" | "TRUE" => Some(true),
        "F" | "FALSE" => Some(false),
        _ => None,
    }
}

fn override_value(key: &str, raw: &str) -> Result<toml::Value> {
    if BOOL_KEYS.contains(&key) {
        return is_true(raw)
            .map(toml::Value::Boolean)
            .ok_or_else(|| ReplotsError::Config(format!("{key} expects TRUE or FALSE, got '{raw}'")));
    }
    if INT_KEYS.contains(&key) {
        return raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ReplotsError::Config(format!("{key} expects an integer, got '{raw}': {e}")));
    }
    if LIST_KEYS.contains(&key) {
        return Ok(toml::Value::Array(
            split_list(raw).into_iter().map(toml::Value::String).collect(),
        ));
    }
    Ok(toml::Value::String(raw.to_string()))
}

impl CaseConfig {
    /// Parse a configuration from TOML text, applying `overrides` on top.
    ///
    /// Override keys must already have their prefix stripped.
    pub fn from_toml_str(text: &str, overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut table: toml::Table = text.parse()?;
        for (key, raw) in overrides {
            debug!(key = %key, value = %raw, "configuration override");
            table.insert(key.clone(), override_value(key, raw)?);
        }
        let config: CaseConfig = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the case file at `path` and apply `OCNDIAG_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReplotsError::Config(format!("cannot read case file {}: {e}", path.display()))
        })?;
        let env: BTreeMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::from_toml_str(&text, &strip_prefix(env, ENV_PREFIX))
    }

    fn validate(&self) -> Result<()> {
        if self.case.trim().is_empty() {
            return Err(ReplotsError::Config("CASE must not be empty".to_string()));
        }
        if self.vertical < 0 {
            return Err(ReplotsError::Config(format!(
                "VERTICAL must be >= 0, got {}",
                self.vertical
            )));
        }
        if self.plots.width < 200 || self.plots.height < 200 {
            return Err(ReplotsError::Config(
                "plot width and height must be at least 200 pixels".to_string(),
            ));
        }
        Ok(())
    }

    /// `{case}.{comp}.{suffix}`, the shared prefix of history and climatology files.
    pub fn case_prefix(&self) -> String {
        format!("{}.{}.{}", self.case, self.comp, self.suffix)
    }

    /// Climatology output directory, required by the averaging pipeline.
    pub fn tavgdir(&self) -> Result<&Path> {
        self.tavgdir
            .as_deref()
            .ok_or_else(|| ReplotsError::Config("TAVGDIR is not set".to_string()))
    }

    /// Diagnostics working directory, required by the plotting pipeline.
    pub fn workdir(&self) -> Result<&Path> {
        self.workdir
            .as_deref()
            .ok_or_else(|| ReplotsError::Config("WORKDIR is not set".to_string()))
    }

    /// Archive roots, rejecting an empty list.
    pub fn dout_paths(&self) -> Result<&[PathBuf]> {
        if self.dout_paths.is_empty() {
            return Err(ReplotsError::Config("DOUT_PATHS is empty".to_string()));
        }
        Ok(&self.dout_paths)
    }

    /// History files to read for the model case, or for the control case
    /// when `control` is set.
    pub fn history_selection(&self, control: bool) -> Result<HistorySelection> {
        if !control {
            return Ok(HistorySelection {
                case: self.case.clone(),
                roots: self.dout_paths()?.to_vec(),
                subdir: self.subdir.clone(),
                start_date: self.start_date.clone(),
                end_date: self.end_date.clone(),
                variables: self.model_varlist.clone(),
            });
        }

        let case = self
            .cntrl_case
            .clone()
            .ok_or_else(|| ReplotsError::Config("CNTRLCASE is not set".to_string()))?;
        let root = self
            .cntrl_case_dir
            .clone()
            .ok_or_else(|| ReplotsError::Config("CNTRLCASEDIR is not set".to_string()))?;
        let variables = if self.cntrl_varlist.is_empty() {
            self.model_varlist.clone()
        } else {
            self.cntrl_varlist.clone()
        };
        Ok(HistorySelection {
            case,
            roots: vec![root],
            subdir: self.cntrl_subdir.clone(),
            start_date: self.cntrl_start_date.clone().unwrap_or_else(|| self.start_date.clone()),
            end_date: self.cntrl_end_date.clone().unwrap_or_else(|| self.end_date.clone()),
            variables,
        })
    }

    /// Diagnostics switched on, in the order they are run.
    pub fn requested_diagnostics(&self) -> Vec<&'static str> {
        [
            ("MODEL", self.model),
            ("MODEL_VS_OBS", self.model_vs_obs),
            ("MODEL_VS_CONTROL", self.model_vs_control),
            ("MODEL_TIMESERIES", self.model_timeseries),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
CASE = "gom9k"
YEAR0 = "2010-02-01"
YEAR1 = "2010-06-07"
DOUT_PATHS = "/data/a, /data/b"
MODEL_VARLIST = ["salt", "temp"]
MODEL = true
"#;

    #[test]
    fn parses_minimal_case_with_defaults() {
        let cfg = CaseConfig::from_toml_str(MINIMAL, &BTreeMap::new()).unwrap();
        assert_eq!(cfg.case_prefix(), "gom9k.ocn.hi");
        assert_eq!(
            cfg.dout_paths,
            vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]
        );
        assert_eq!(cfg.model_varlist, vec!["salt", "temp"]);
        assert_eq!(cfg.time_dim, "ocean_time");
        assert_eq!(cfg.avg_types, vec!["time", "season", "month", "year"]);
        assert_eq!(cfg.plots.depths.len(), 13);
        assert_eq!(cfg.requested_diagnostics(), vec!["MODEL"]);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut env = BTreeMap::new();
        env.insert("OCNDIAG_YEAR1".to_string(), "2010-12-31".to_string());
        env.insert("OCNDIAG_MODEL_VS_OBS".to_string(), "T".to_string());
        env.insert("OCNDIAG_VERTICAL".to_string(), "30".to_string());
        let env = strip_prefix(env, ENV_PREFIX);

        let cfg = CaseConfig::from_toml_str(MINIMAL, &env).unwrap();
        assert_eq!(cfg.end_date, "2010-12-31");
        assert!(cfg.model_vs_obs);
        assert_eq!(cfg.vertical, 30);
    }

    #[test]
    fn bad_boolean_override_is_config_error() {
        let mut env = BTreeMap::new();
        env.insert("MODEL".to_string(), "maybe".to_string());
        let err = CaseConfig::from_toml_str(MINIMAL, &env).unwrap_err();
        assert!(matches!(err, ReplotsError::Config(_)));
    }

    #[test]
    fn strip_prefix_keeps_unprefixed_keys() {
        let mut map = BTreeMap::new();
        map.insert("OCNDIAG_WORKDIR".to_string(), "/w".to_string());
        map.insert("CASE".to_string(), "c".to_string());
        let out = strip_prefix(map, "OCNDIAG_");
        assert_eq!(out.get("WORKDIR").map(String::as_str), Some("/w"));
        assert_eq!(out.get("CASE").map(String::as_str), Some("c"));
    }

    #[test]
    fn control_selection_falls_back_to_model_values() {
        let text = format!("{MINIMAL}CNTRLCASE = \"ctrl\"\nCNTRLCASEDIR = \"/ctrl\"\n");
        let cfg = CaseConfig::from_toml_str(&text, &BTreeMap::new()).unwrap();
        let sel = cfg.history_selection(true).unwrap();
        assert_eq!(sel.case, "ctrl");
        assert_eq!(sel.roots, vec![PathBuf::from("/ctrl")]);
        assert_eq!(sel.start_date, "2010-02-01");
        assert_eq!(sel.variables, vec!["salt", "temp"]);

        let cfg = CaseConfig::from_toml_str(MINIMAL, &BTreeMap::new()).unwrap();
        assert!(matches!(cfg.history_selection(true), Err(ReplotsError::Config(_))));
    }

    #[test]
    fn missing_workdir_is_reported() {
        let cfg = CaseConfig::from_toml_str(MINIMAL, &BTreeMap::new()).unwrap();
        assert!(matches!(cfg.workdir(), Err(ReplotsError::Config(_))));
    }
}
