//! Centralized error handling for RePlots
//!
//! Every fallible operation in the crate returns [`Result`]. Each error also
//! carries an [`ErrorKind`] so the diagnostics orchestrator can decide whether
//! to skip a diagnostic and continue, or to abort the whole run.

use std::path::PathBuf;

/// Severity of an error as seen by the diagnostics orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Skip the current diagnostic, log, continue with the next one.
    Recoverable,
    /// Abort the run.
    Fatal,
}

/// Main error type for RePlots operations
#[derive(Debug, thiserror::Error)]
pub enum ReplotsError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// A search directory for history files does not exist
    #[error("{} directory is not available", .path.display())]
    DirectoryNotFound { path: PathBuf },

    /// The history-file glob matched nothing
    #[error("no history files found matching {pattern}")]
    NoFilesFound { pattern: String },

    /// A date string or embedded filename date could not be parsed
    #[error("invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    /// The execution client could not be bootstrapped
    #[error("execution client initialization failed: {0}")]
    ClientInitialization(String),

    /// One of the dataset files could not be opened or is malformed
    #[error("failed to open dataset file {}: {reason}", .path.display())]
    DatasetOpen { path: PathBuf, reason: String },

    /// An operation needed an open dataset but none is bound
    #[error("no dataset is open")]
    DatasetNotOpen,

    /// Variable not found in the dataset
    #[error("Variable '{var}' not found in dataset")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// Time coordinate units or calendar could not be decoded
    #[error("invalid time coordinate: {0}")]
    InvalidTime(String),

    /// Unsupported grouping key for a climatology
    #[error("unsupported averaging type '{0}'")]
    UnknownAverageType(String),

    /// Statistics computation errors
    #[error("Statistics computation error: {0}")]
    StatisticsError(String),

    /// A requested diagnostics type symbol is not known
    #[error("Unknown diagnostics type requested: \"{0}\"")]
    UnknownDiagnosticType(String),

    /// A plot set short name is not known
    #[error("Unknown plot type requested: \"{0}\"")]
    UnknownPlotType(String),

    /// A diagnostic's prerequisites are not met; the diagnostic is skipped
    #[error("prerequisites not met for {diagnostic}: {reason}")]
    Prerequisites { diagnostic: String, reason: String },

    /// Invalid or incomplete case configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Case configuration file could not be parsed
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A required external command-line tool is missing
    #[error("{tool} is required to run the ocean diagnostics package: {reason}")]
    ToolMissing { tool: String, reason: String },

    /// Rendering or PNG encoding failed
    #[error("render error: {0}")]
    Render(String),

    /// One or more work units in a batch failed
    #[error("{} of {total} work units failed: {}", .failures.len(), summarize(.failures))]
    BatchFailed {
        total: usize,
        failures: Vec<ReplotsError>,
    },
}

fn summarize(failures: &[ReplotsError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReplotsError {
    /// Severity used by the diagnostics orchestrator.
    ///
    /// A batch is recoverable only when every one of its failures is.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Prerequisites { .. } | Self::UnknownPlotType(_) => ErrorKind::Recoverable,
            Self::BatchFailed { failures, .. }
                if !failures.is_empty() && failures.iter().all(Self::is_recoverable) =>
            {
                ErrorKind::Recoverable
            }
            _ => ErrorKind::Fatal,
        }
    }

    /// Shorthand for `kind() == ErrorKind::Recoverable`.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Recoverable
    }
}

impl From<png::EncodingError> for ReplotsError {
    fn from(error: png::EncodingError) -> Self {
        ReplotsError::Render(error.to_string())
    }
}

/// Result type alias for RePlots operations
pub type Result<T> = std::result::Result<T, ReplotsError>;
