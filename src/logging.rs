use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default log file name, `replots_diag{YYYYmmddHHMMSS}.log`.
pub fn default_log_file(dir: &Path) -> PathBuf {
    dir.join(format!(
        "replots_diag{}.log",
        Local::now().format("%Y%m%d%H%M%S")
    ))
}

fn filter_for(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("replots={level}")))
}

/// Initialize tracing based on CLI verbosity level.
///
/// Mapping:
/// - 0 (none) -> warn
/// - 1 (-v)   -> info
/// - 2 (-vv)  -> debug
/// - 3+ (-vvv)-> trace
///
/// `RUST_LOG` env var overrides the CLI flag if set. Records always go to
/// stderr; when `log_file` is given they are mirrored into that file.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> std::io::Result<()> {
    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_for(verbosity))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}
