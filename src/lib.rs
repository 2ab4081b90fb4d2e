//! RePlots: ocean model climatologies and diagnostic plots
//!
//! RePlots reads the history files of an ocean model case, averages them into
//! climatology files and renders map-projected diagnostic plots with an HTML
//! index. Heavy work runs as batches of independent units on a rayon-backed
//! execution client.
//!
//! ## Key Features
//!
//! - **File selection**: date-windowed history file discovery across archive roots
//! - **Climatologies**: NaN-skipping time means and calendar-grouped means
//!   (month, season, year, ...) written to NetCDF
//! - **Diagnostics**: surface maps, maps at fixed depths, domain-mean series,
//!   differences against observations or a control case
//! - **Parallel Processing**: one execution client per process, sized locally
//!   or from MPI/LSF job environments
//!
//! ## Module Organization
//!
//! - [`file_selector`]: history file discovery and date windows
//! - [`dataset`]: multi-file dataset handle and execution client binding
//! - [`climatology`]: averaging pipeline
//! - [`diagnostics`]: prerequisite checks and plot orchestration
//! - [`plots`]: field extraction and PNG rendering
//! - [`report`]: HTML index and web-directory marker
//! - [`statistics`]: NaN-skipping reductions and calendar grouping
//! - [`netcdf_io`]: climatology file writing
//! - [`calendar`]: CF time decoding for standard, noleap and 360-day calendars
//! - [`parallel`]: execution client
//! - [`config`], [`logging`], [`tools`], [`errors`]: ambient concerns
//!
//! ## Usage
//!
//! ```rust,no_run
//! use replots::prelude::*;
//! use std::path::PathBuf;
//!
//! let files = replots::file_selector::select(
//!     &[PathBuf::from("/archive")],
//!     "gom9k", "ocn", "hi", "hist",
//!     "2010-01-01", "2010-12-31", "%Y-%m-%d",
//! ).unwrap();
//!
//! let mut dataset = DatasetHandle::new();
//! dataset.open(&files).unwrap();
//! dataset.start_client(ClientMode::Local).unwrap();
//! let path = average(&dataset, std::path::Path::new("/tavg"), "gom9k.ocn.hi", &[], "ocean_time", "month").unwrap();
//! println!("wrote {}", path.display());
//! ```

pub mod calendar;
pub mod cli;
pub mod climatology;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod errors;
pub mod file_selector;
pub mod logging;
pub mod netcdf_io;
pub mod parallel;
pub mod plots;
pub mod report;
pub mod statistics;
pub mod tools;

pub use errors::{ErrorKind, ReplotsError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::climatology::{average, create_clim_files, AvgType};
    pub use crate::config::CaseConfig;
    pub use crate::dataset::DatasetHandle;
    pub use crate::diagnostics::{run_diagnostics, DiagnosticOutput, DiagnosticType};
    pub use crate::errors::{ErrorKind, ReplotsError, Result};
    pub use crate::file_selector::select;
    pub use crate::parallel::{ClientMode, ExecutionClient};
    pub use crate::plots::PlotKind;
}
