//! Defines command-line interface options using `clap` for the RePlots application.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::logging::default_log_file;
use crate::parallel::ClientMode;

/// Ocean model climatologies and diagnostic plots
#[derive(Parser, Debug)]
#[command(
    version,
    name = "RePlots",
    about = "Climatology averaging and diagnostic plots for ocean model history files"
)]
pub struct Args {
    /// Case configuration file (TOML); OCNDIAG_* environment variables override it
    #[arg(short, long, global = true, default_value = "replots.toml")]
    pub config: PathBuf,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of worker threads. Defaults to the execution client's own sizing.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// How the execution client is sized
    #[arg(long, global = true, value_parser = parse_client_mode, default_value = "local")]
    pub client: ClientMode,

    /// Also write log records to a file (`--log-file=PATH`); without a path,
    /// `replots_diag{timestamp}.log` in the current directory
    #[arg(long, global = true, num_args = 0..=1, require_equals = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Print the full error source chain on failure
    #[arg(long, global = true)]
    pub backtrace: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Average the case's history files into climatology files under TAVGDIR
    Climatology(ClimatologyArgs),
    /// Generate diagnostic plots and the HTML index under WORKDIR
    Diagnostics(DiagnosticsArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClimatologyArgs {
    /// Average the control case instead of the model case
    #[arg(long)]
    pub control_run: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DiagnosticsArgs {
    /// Do not check for NCL and NCO before running
    #[arg(long)]
    pub skip_tool_check: bool,

    /// Run only this diagnostic (MODEL, MODEL_VS_OBS, ...); may be repeated
    #[arg(long = "only")]
    pub only: Vec<String>,
}

impl Args {
    /// Log file to mirror console records into, if requested.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(|| default_log_file(Path::new("."))))
    }
}

fn parse_client_mode(s: &str) -> Result<ClientMode, String> {
    s.parse::<ClientMode>().map_err(|e| e.to_string())
}
