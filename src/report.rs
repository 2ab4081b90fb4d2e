//! HTML index and web-directory marker
//!
//! The index links every plot written by the diagnostics run, grouped by
//! diagnostic. The marker file tells the post-processing tooling where the
//! diagnostics working directory lives.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local};
use tracing::{info, warn};

use crate::config::CaseConfig;
use crate::diagnostics::DiagnosticOutput;
use crate::errors::Result;
use crate::file_selector::parse_date;

/// Name of the marker file, followed by `.{timestamp}`.
pub const WEBDIR_MARKER: &str = "OCNDIAG_WEBDIR";
const MARKER_TIMESTAMP: &str = "%Y-%m-%d_%H%M%S";

/// Values shown in the index header.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub casename: String,
    pub tagname: String,
    pub username: String,
    pub start_year: String,
    pub stop_year: String,
    pub control: Option<ControlCase>,
    pub today: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlCase {
    pub casename: String,
    pub start_year: String,
    pub stop_year: String,
}

fn year_of(value: &str, pattern: &str) -> String {
    parse_date(value, pattern)
        .map(|d| format!("{:04}", d.year()))
        .unwrap_or_else(|_| value.to_string())
}

impl ReportContext {
    pub fn from_config(config: &CaseConfig, today: DateTime<Local>) -> Self {
        let pattern = &config.date_pattern;
        let control = config.cntrl_case.as_ref().map(|casename| ControlCase {
            casename: casename.clone(),
            start_year: year_of(config.cntrl_start_date.as_deref().unwrap_or(&config.start_date), pattern),
            stop_year: year_of(config.cntrl_end_date.as_deref().unwrap_or(&config.end_date), pattern),
        });
        Self {
            casename: config.case.clone(),
            tagname: config.cesm_tag.clone().unwrap_or_else(|| "unknown".to_string()),
            username: config
                .user_name
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "unknown".to_string()),
            start_year: year_of(&config.start_date, pattern),
            stop_year: year_of(&config.end_date, pattern),
            control,
            today: today.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the index page; plot links are relative to `workdir`.
pub fn render_index(context: &ReportContext, outputs: &[DiagnosticOutput], workdir: &Path) -> String {
    let mut html = String::new();
    let title = format!("Ocean diagnostics: {}", escape(&context.casename));
    let _ = writeln!(html, "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">");
    let _ = writeln!(html, "<title>{title}</title>\n</head>\n<body>");
    let _ = writeln!(html, "<h1>{title}</h1>");
    let _ = writeln!(html, "<table>");
    let mut row = |key: &str, value: &str| {
        let _ = writeln!(html, "<tr><th align=\"left\">{key}</th><td>{}</td></tr>", escape(value));
    };
    row("Case", &context.casename);
    row("Years", &format!("{} - {}", context.start_year, context.stop_year));
    if let Some(control) = &context.control {
        row("Control case", &control.casename);
        row("Control years", &format!("{} - {}", control.start_year, control.stop_year));
    }
    row("Model tag", &context.tagname);
    row("User", &context.username);
    row("Created", &context.today);
    let _ = writeln!(html, "</table>");

    for output in outputs {
        let _ = writeln!(html, "<h2>{}</h2>", escape(output.diagnostic.description()));
        if output.plots.is_empty() {
            let _ = writeln!(html, "<p>No plots.</p>");
            continue;
        }
        let _ = writeln!(html, "<ul>");
        for plot in &output.plots {
            let link = plot.strip_prefix(workdir).unwrap_or(plot);
            let name = plot
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let _ = writeln!(
                html,
                "<li><a href=\"{}\">{}</a></li>",
                escape(&link.to_string_lossy()),
                escape(&name)
            );
        }
        let _ = writeln!(html, "</ul>");
    }
    let _ = writeln!(html, "</body>\n</html>");
    html
}

/// Write `{workdir}/index.html`.
pub fn write_index(context: &ReportContext, outputs: &[DiagnosticOutput], workdir: &Path) -> Result<PathBuf> {
    let path = workdir.join("index.html");
    fs::write(&path, render_index(context, outputs, workdir))?;
    info!(path = %path.display(), "index written");
    Ok(path)
}

/// Append `OCNDIAG_WEBDIR:{workdir}` to `{base}/web_dirs/OCNDIAG_WEBDIR.{timestamp}`.
pub fn write_webdir_marker(base: &Path, workdir: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let dir = base.join("web_dirs");
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{WEBDIR_MARKER}.{}", now.format(MARKER_TIMESTAMP)));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{WEBDIR_MARKER}:{}", workdir.display())?;
    Ok(path)
}

/// Record the web directory for the case; failures are only logged.
pub fn record_webdir(config: &CaseConfig, workdir: &Path, now: DateTime<Local>) -> Option<PathBuf> {
    let base = config.pp_case_path.as_deref().unwrap_or(workdir);
    match write_webdir_marker(base, workdir, now) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(
                base = %base.display(),
                error = %e,
                "unable to write web directory marker; web publishing may need to be done by hand"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticType;
    use chrono::TimeZone;

    fn context() -> ReportContext {
        ReportContext {
            casename: "gom<9k>".to_string(),
            tagname: "cesm2.1".to_string(),
            username: "someone".to_string(),
            start_year: "2010".to_string(),
            stop_year: "2011".to_string(),
            control: None,
            today: "2024-01-01 00:00".to_string(),
        }
    }

    #[test]
    fn index_links_are_relative_and_escaped() {
        let workdir = Path::new("/work/diag");
        let outputs = vec![DiagnosticOutput {
            diagnostic: DiagnosticType::Model,
            plot_dir: workdir.join("model"),
            plots: vec![workdir.join("model/temp_50m.png")],
        }];
        let html = render_index(&context(), &outputs, workdir);
        assert!(html.contains("<a href=\"model/temp_50m.png\">temp_50m</a>"));
        assert!(html.contains("gom&lt;9k&gt;"));
        assert!(html.contains("Model diagnostics"));
        assert!(!html.contains("Control case"));
    }

    #[test]
    fn marker_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let workdir = Path::new("/work/diag");
        let first = write_webdir_marker(dir.path(), workdir, now).unwrap();
        let second = write_webdir_marker(dir.path(), workdir, now).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("web_dirs/OCNDIAG_WEBDIR.2024-03-05_140709"));
        let text = fs::read_to_string(first).unwrap();
        assert_eq!(text, "OCNDIAG_WEBDIR:/work/diag\nOCNDIAG_WEBDIR:/work/diag\n");
    }
}
