//! Diagnostics orchestration
//!
//! Every requested diagnostic goes through the same two steps: check its
//! prerequisites, then render its plot sets. A recoverable error in either
//! step skips that diagnostic only; any other error aborts the run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::config::CaseConfig;
use crate::dataset::{DatasetHandle, DatasetSchema};
use crate::errors::{ReplotsError, Result};
use crate::file_selector;
use crate::plots::{plan_jobs, render_all, PlotJob, PlotKind, PlotRequest, Reference};

/// Vertical level dimension checked against `VERTICAL`.
const LEVEL_DIM: &str = "s_rho";

/// Diagnostic families that can be requested for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticType {
    Model,
    ModelVsObs,
    ModelVsControl,
    ModelTimeseries,
}

impl DiagnosticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticType::Model => "MODEL",
            DiagnosticType::ModelVsObs => "MODEL_VS_OBS",
            DiagnosticType::ModelVsControl => "MODEL_VS_CONTROL",
            DiagnosticType::ModelTimeseries => "MODEL_TIMESERIES",
        }
    }

    /// Sub-directory of the working directory holding this diagnostic's plots.
    pub fn dir_name(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Heading used in the HTML index.
    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticType::Model => "Model diagnostics",
            DiagnosticType::ModelVsObs => "Model vs. observations",
            DiagnosticType::ModelVsControl => "Model vs. control case",
            DiagnosticType::ModelTimeseries => "Model time series",
        }
    }
}

impl fmt::Display for DiagnosticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosticType {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MODEL" => Ok(DiagnosticType::Model),
            "MODEL_VS_OBS" => Ok(DiagnosticType::ModelVsObs),
            "MODEL_VS_CONTROL" => Ok(DiagnosticType::ModelVsControl),
            "MODEL_TIMESERIES" => Ok(DiagnosticType::ModelTimeseries),
            other => Err(ReplotsError::UnknownDiagnosticType(other.to_string())),
        }
    }
}

/// Plots written by one diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticOutput {
    pub diagnostic: DiagnosticType,
    pub plot_dir: PathBuf,
    pub plots: Vec<PathBuf>,
}

/// A diagnostic with the state its prerequisite check resolved.
#[derive(Debug)]
pub struct Diagnostic {
    kind: DiagnosticType,
    plot_dir: PathBuf,
    plot_kinds: Vec<PlotKind>,
    reference: Option<(DatasetHandle, String)>,
    jobs: Vec<PlotJob>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticType, workdir: &Path) -> Self {
        Self {
            kind,
            plot_dir: workdir.join(kind.dir_name()),
            plot_kinds: Vec::new(),
            reference: None,
            jobs: Vec::new(),
        }
    }

    pub fn kind(&self) -> DiagnosticType {
        self.kind
    }

    pub fn plot_dir(&self) -> &Path {
        &self.plot_dir
    }

    pub fn jobs(&self) -> &[PlotJob] {
        &self.jobs
    }

    fn unmet(&self, reason: impl Into<String>) -> ReplotsError {
        ReplotsError::Prerequisites {
            diagnostic: self.kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Resolve plot sets, open reference data and plan the render jobs.
    ///
    /// Missing reference data and unusable plot directories are recoverable.
    pub fn check_prerequisites(&mut self, config: &CaseConfig, dataset: &DatasetHandle) -> Result<()> {
        let schema = dataset.schema()?;
        self.check_levels(config, schema)?;

        self.plot_kinds = match self.kind {
            DiagnosticType::ModelTimeseries => vec![PlotKind::Tseries],
            _ => config
                .plot_sets
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<_>>>()?,
        };

        fs::create_dir_all(&self.plot_dir).map_err(|e| {
            self.unmet(format!("cannot create {}: {e}", self.plot_dir.display()))
        })?;

        self.reference = match self.kind {
            DiagnosticType::ModelVsObs => Some((self.open_observations(config)?, "obs".to_string())),
            DiagnosticType::ModelVsControl => {
                let handle = self.open_control(config)?;
                let label = config.cntrl_case.clone().unwrap_or_else(|| "control".to_string());
                Some((handle, label))
            }
            _ => None,
        };

        let reference_schema = match &self.reference {
            Some((handle, _)) => Some(handle.schema()?),
            None => None,
        };
        self.jobs = plan_jobs(&self.plot_kinds, &config.plots, schema, reference_schema);
        if let Some(reference) = reference_schema {
            check_shapes(self.kind, &self.jobs, schema, reference)?;
        }
        if self.jobs.is_empty() {
            return Err(self.unmet("none of the configured fields are available"));
        }
        Ok(())
    }

    /// The dataset must have the configured number of vertical levels.
    fn check_levels(&self, config: &CaseConfig, schema: &DatasetSchema) -> Result<()> {
        if config.vertical == 0 {
            return Ok(());
        }
        match schema.dimension_len(LEVEL_DIM) {
            Some(levels) if levels as i64 == config.vertical => Ok(()),
            Some(levels) => Err(self.unmet(format!(
                "VERTICAL is {} but the dataset has {levels} '{LEVEL_DIM}' levels",
                config.vertical
            ))),
            None => Err(self.unmet(format!(
                "VERTICAL is {} but the dataset has no '{LEVEL_DIM}' dimension",
                config.vertical
            ))),
        }
    }

    fn open_observations(&self, config: &CaseConfig) -> Result<DatasetHandle> {
        let root = config
            .diag_obs_root
            .as_deref()
            .ok_or_else(|| self.unmet("DIAGOBSROOT is not set"))?;
        let files = observation_files(root, &config.obs_prefix)
            .map_err(|e| self.unmet(format!("cannot list {}: {e}", root.display())))?;
        if files.is_empty() {
            return Err(self.unmet(format!(
                "no '{}*.nc' observation files under {}",
                config.obs_prefix,
                root.display()
            )));
        }
        let mut handle = DatasetHandle::new().with_time_dim(config.time_dim.clone());
        handle
            .open(&files)
            .map_err(|e| self.unmet(format!("observation files: {e}")))?;
        Ok(handle)
    }

    fn open_control(&self, config: &CaseConfig) -> Result<DatasetHandle> {
        let selection = config
            .history_selection(true)
            .map_err(|e| self.unmet(e.to_string()))?;
        let files = file_selector::select(
            &selection.roots,
            &selection.case,
            &config.comp,
            &config.suffix,
            &selection.subdir,
            &selection.start_date,
            &selection.end_date,
            &config.date_pattern,
        )
        .map_err(|e| self.unmet(format!("control case: {e}")))?;
        let mut handle = DatasetHandle::new().with_time_dim(config.time_dim.clone());
        handle
            .open(&files)
            .map_err(|e| self.unmet(format!("control case: {e}")))?;
        Ok(handle)
    }

    /// Render the planned plots and report where they went.
    pub fn run(&self, config: &CaseConfig, dataset: &DatasetHandle) -> Result<DiagnosticOutput> {
        let request = PlotRequest {
            diagnostic: self.kind.as_str(),
            dataset,
            reference: self.reference.as_ref().map(|(handle, label)| Reference {
                dataset: handle,
                label,
            }),
            settings: &config.plots,
            plot_dir: &self.plot_dir,
        };
        let plots = render_all(&request, &self.jobs)?;
        info!(diagnostic = %self.kind, plots = plots.len(), "diagnostic finished");
        Ok(DiagnosticOutput {
            diagnostic: self.kind,
            plot_dir: self.plot_dir.clone(),
            plots,
        })
    }
}

/// Observation files directly under `root` whose names start with `prefix`.
fn observation_files(root: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "nc")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Model and reference must agree on every non-time dimension.
fn check_shapes(
    kind: DiagnosticType,
    jobs: &[PlotJob],
    model: &DatasetSchema,
    reference: &DatasetSchema,
) -> Result<()> {
    let spatial = |schema: &DatasetSchema, field: &str| -> Result<Vec<usize>> {
        let var = schema.variable(field)?;
        Ok(var
            .shape
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != var.time_axis)
            .map(|(_, &len)| len)
            .collect())
    };
    for job in jobs {
        let (a, b) = (spatial(model, &job.field)?, spatial(reference, &job.field)?);
        if a != b {
            return Err(ReplotsError::Prerequisites {
                diagnostic: kind.to_string(),
                reason: format!("'{}' is {a:?} in the model but {b:?} in the reference", job.field),
            });
        }
    }
    Ok(())
}

/// Resolve `requested` names, failing on the first unknown one.
pub fn resolve(requested: &[&str]) -> Result<Vec<DiagnosticType>> {
    if requested.is_empty() {
        return Err(ReplotsError::Config(
            "no diagnostics requested; set MODEL, MODEL_VS_OBS, MODEL_VS_CONTROL or MODEL_TIMESERIES"
                .to_string(),
        ));
    }
    requested.iter().map(|name| name.parse()).collect()
}

/// Run every requested diagnostic over `dataset`, which must be open with a
/// running client.
///
/// Recoverable failures are logged and the diagnostic skipped; fatal ones
/// abort and are returned.
pub fn run_diagnostics(
    config: &CaseConfig,
    dataset: &DatasetHandle,
    requested: &[&str],
) -> Result<Vec<DiagnosticOutput>> {
    let kinds = resolve(requested)?;
    let workdir = config.workdir()?;
    fs::create_dir_all(workdir)?;

    let mut outputs = Vec::new();
    for kind in kinds {
        let mut diagnostic = Diagnostic::new(kind, workdir);
        match diagnostic.check_prerequisites(config, dataset) {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                warn!(diagnostic = %kind, error = %e, "Problem with check_prerequisites for '{kind}' skipping!");
                continue;
            }
            Err(e) => return Err(e),
        }
        match diagnostic.run(config, dataset) {
            Ok(output) => outputs.push(output),
            Err(e) if e.is_recoverable() => {
                warn!(diagnostic = %kind, error = %e, "Skipped '{kind}' and continuing!");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_names_parse() {
        assert_eq!("MODEL_VS_OBS".parse::<DiagnosticType>().unwrap(), DiagnosticType::ModelVsObs);
        assert_eq!(DiagnosticType::ModelTimeseries.dir_name(), "model_timeseries");
        let err = "MODEL_VS_MOON".parse::<DiagnosticType>().unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn zero_requested_is_a_config_error() {
        assert!(matches!(resolve(&[]), Err(ReplotsError::Config(_))));
        assert_eq!(
            resolve(&["MODEL", "MODEL_TIMESERIES"]).unwrap(),
            vec![DiagnosticType::Model, DiagnosticType::ModelTimeseries]
        );
    }

    #[test]
    fn observation_files_match_prefix_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["obs_woa.nc", "obs_sst.nc", "obs_notes.txt", "model.nc"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = observation_files(dir.path(), "obs").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["obs_sst.nc", "obs_woa.nc"]);
    }
}
