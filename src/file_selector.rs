//! History file discovery and date-window filtering
//!
//! History files are named `{case}.{comp}.{suffix}.{date}...nc`, so both the
//! case prefix and the date can be recovered from the file name alone. The
//! selector never opens a file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{self, Parsed, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use crate::errors::{ReplotsError, Result};

/// Format of the date embedded in slice-form history file names.
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Width of the embedded date token.
pub const FILE_DATE_WIDTH: usize = 10;

/// Parse `value` with `pattern` into an instant.
///
/// Fields the pattern leaves out take their earliest value, so `"2010"` with
/// `%Y` is 2010-01-01 00:00 and `"2010-02"` with `%Y-%m` is 2010-02-01 00:00.
pub fn parse_datetime(value: &str, pattern: &str) -> Result<NaiveDateTime> {
    let invalid = |reason: String| ReplotsError::InvalidDate {
        value: value.to_string(),
        reason,
    };
    let fill = |e: format::ParseError| invalid(format!("cannot complete '{pattern}': {e}"));

    let mut parsed = Parsed::new();
    format::parse(&mut parsed, value, StrftimeItems::new(pattern))
        .map_err(|e| invalid(format!("does not match '{pattern}': {e}")))?;

    if parsed.ordinal().is_none() {
        if parsed.month().is_none() {
            parsed.set_month(1).map_err(fill)?;
        }
        if parsed.day().is_none() {
            parsed.set_day(1).map_err(fill)?;
        }
    }
    if parsed.hour_div_12().is_none() && parsed.hour_mod_12().is_none() {
        parsed.set_hour(0).map_err(fill)?;
    }
    if parsed.minute().is_none() {
        parsed.set_minute(0).map_err(fill)?;
    }

    let date = parsed
        .to_naive_date()
        .map_err(|e| invalid(format!("does not name a date with '{pattern}': {e}")))?;
    let time = parsed
        .to_naive_time()
        .map_err(|e| invalid(format!("does not name a time with '{pattern}': {e}")))?;
    Ok(date.and_time(time))
}

/// Calendar date of [`parse_datetime`].
pub fn parse_date(value: &str, pattern: &str) -> Result<NaiveDate> {
    parse_datetime(value, pattern).map(|dt| dt.date())
}

/// Keep the files whose `[start_index, end_index)` window falls in the
/// inclusive range `[start, end]`.
///
/// The window is always read as `%Y-%m-%d` at midnight; `start` and `end` are
/// parsed with `pattern` and keep any time of day they carry.
pub fn filter_dates(
    files: &[PathBuf],
    start_index: usize,
    end_index: usize,
    start: &str,
    end: &str,
    pattern: &str,
) -> Result<Vec<PathBuf>> {
    let start_date = parse_datetime(start, pattern)?;
    let end_date = parse_datetime(end, pattern)?;

    let mut kept = Vec::new();
    for file in files {
        let text = file.to_string_lossy();
        let window = text
            .get(start_index..end_index)
            .ok_or_else(|| ReplotsError::InvalidDate {
                value: text.to_string(),
                reason: format!("no date at characters {start_index}..{end_index}"),
            })?;
        let date = NaiveDate::parse_from_str(window, FILE_DATE_FORMAT)
            .map_err(|e| ReplotsError::InvalidDate {
                value: text.to_string(),
                reason: format!("embedded date '{window}': {e}"),
            })?
            .and_time(NaiveTime::MIN);

        if start_date <= date && date <= end_date {
            kept.push(file.clone());
        }
    }

    Ok(kept)
}

/// Sorted files of `dir` whose name starts with `prefix`.
fn matching_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Select the history files of one case inside a date window.
///
/// Each root is searched in `root/subdir`. Results keep per-root sorted order
/// and are concatenated in root order.
#[allow(clippy::too_many_arguments)]
pub fn select(
    dout_paths: &[PathBuf],
    casename: &str,
    comp: &str,
    suffix: &str,
    subdir: &str,
    start_date: &str,
    end_date: &str,
    date_pattern: &str,
) -> Result<Vec<PathBuf>> {
    let subdir = subdir.strip_suffix('/').unwrap_or(subdir);
    let prefix = format!("{casename}.{comp}.{suffix}");
    let mut selected = Vec::new();

    for root in dout_paths {
        let in_dir = root.join(subdir);
        debug!(dir = %in_dir.display(), "searching for history files");
        if !in_dir.is_dir() {
            return Err(ReplotsError::DirectoryNotFound { path: in_dir });
        }

        let files = matching_files(&in_dir, &prefix)?;
        let Some(first) = files.first() else {
            return Err(ReplotsError::NoFilesFound {
                pattern: format!("{}/{prefix}*", in_dir.display()),
            });
        };

        // path = dirname + "/" + prefix + "." + date
        let dirname_len = first
            .parent()
            .map_or(0, |p| p.to_string_lossy().len());
        let start_index = dirname_len + 2 + prefix.len();
        let end_index = start_index + FILE_DATE_WIDTH;

        let kept = filter_dates(
            &files,
            start_index,
            end_index,
            start_date,
            end_date,
            date_pattern,
        )?;
        info!(
            dir = %in_dir.display(),
            matched = files.len(),
            kept = kept.len(),
            "history files selected"
        );
        selected.extend(kept);
    }

    Ok(selected)
}

/// Layout of the history files of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryType {
    /// One file per time slice, `….YYYY-MM-DD_hh:mm:ss.nc`.
    Slice,
    /// One file per variable spanning many slices, `….YYYYMM-YYYYMM.nc`.
    Series,
}

/// First and last (year, month) covered by a set of history files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySpan {
    pub start_year: i32,
    pub start_month: u32,
    pub stop_year: i32,
    pub stop_month: u32,
    pub history_type: HistoryType,
}

impl HistorySpan {
    /// Number of monthly slices the span names, both ends included.
    pub fn months(&self) -> i64 {
        (i64::from(self.stop_year) - i64::from(self.start_year)) * 12
            + i64::from(self.stop_month)
            - i64::from(self.start_month)
            + 1
    }
}

fn date_token(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    let mut parts = name.rsplit('.');
    parts.next()?;
    parts.next()
}

fn year_month(year: &str, month: &str, path: &Path) -> Result<(i32, u32)> {
    let invalid = || ReplotsError::InvalidDate {
        value: path.display().to_string(),
        reason: format!("cannot read year/month from '{year}'/'{month}'"),
    };
    let y: i32 = year.parse().map_err(|_| invalid())?;
    let m: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&m) {
        return Err(invalid());
    }
    Ok((y, m))
}

fn parse_token(path: &Path) -> Result<((i32, u32), (i32, u32), HistoryType)> {
    let token = date_token(path).ok_or_else(|| ReplotsError::InvalidDate {
        value: path.display().to_string(),
        reason: "file name carries no date token".to_string(),
    })?;

    let pieces: Vec<&str> = token.split('-').collect();
    let is_series = pieces.len() == 2
        && pieces.iter().all(|p| p.len() == 6 && p.bytes().all(|b| b.is_ascii_digit()));

    if is_series {
        let start = year_month(&pieces[0][..4], &pieces[0][4..6], path)?;
        let stop = year_month(&pieces[1][..4], &pieces[1][4..6], path)?;
        Ok((start, stop, HistoryType::Series))
    } else if pieces.len() >= 2 {
        let ym = year_month(pieces[0], pieces[1], path)?;
        Ok((ym, ym, HistoryType::Slice))
    } else {
        Err(ReplotsError::InvalidDate {
            value: path.display().to_string(),
            reason: format!("unrecognised date token '{token}'"),
        })
    }
}

/// Derive the span covered by `files` from the first and last file names.
pub fn history_span(files: &[PathBuf]) -> Result<HistorySpan> {
    let (first, last) = match (files.first(), files.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(ReplotsError::NoFilesFound {
                pattern: "<empty file list>".to_string(),
            })
        }
    };

    let (start, first_stop, history_type) = parse_token(first)?;
    let stop = match history_type {
        HistoryType::Series => first_stop,
        HistoryType::Slice => parse_token(last)?.1,
    };

    Ok(HistorySpan {
        start_year: start.0,
        start_month: start.1,
        stop_year: stop.0,
        stop_month: stop.1,
        history_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_span_uses_first_and_last_file() {
        let files = vec![
            PathBuf::from("/d/gom.ocn.hi.2009-11-01_00:00:00.nc"),
            PathBuf::from("/d/gom.ocn.hi.2011-02-01_00:00:00.nc"),
        ];
        let span = history_span(&files).unwrap();
        assert_eq!(span.history_type, HistoryType::Slice);
        assert_eq!((span.start_year, span.start_month), (2009, 11));
        assert_eq!((span.stop_year, span.stop_month), (2011, 2));
        assert_eq!(span.months(), 16);
    }

    #[test]
    fn series_span_reads_both_ends_from_one_name() {
        let files = vec![PathBuf::from("/d/gom.ocn.hi.salt.200001-200412.nc")];
        let span = history_span(&files).unwrap();
        assert_eq!(span.history_type, HistoryType::Series);
        assert_eq!((span.start_year, span.stop_year), (2000, 2004));
        assert_eq!(span.months(), 60);
    }

    #[test]
    fn parse_date_accepts_datetime_patterns() {
        let d = parse_date("2010-02-01 06:00", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2010, 2, 1).unwrap());
        assert!(parse_date("02/01/2010", "%Y-%m-%d").is_err());
    }

    #[test]
    fn partial_patterns_start_at_the_beginning_of_the_period() {
        let year = parse_datetime("2010", "%Y").unwrap();
        assert_eq!(year, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap().and_time(NaiveTime::MIN));
        let month = parse_date("2010-02", "%Y-%m").unwrap();
        assert_eq!(month, NaiveDate::from_ymd_opt(2010, 2, 1).unwrap());
        let ordinal = parse_date("2010-032", "%Y-%j").unwrap();
        assert_eq!(ordinal, NaiveDate::from_ymd_opt(2010, 2, 1).unwrap());
    }

    #[test]
    fn year_only_bounds_select_files() {
        let dir = tempfile::tempdir().unwrap();
        for date in ["2009-12-01", "2010-01-01", "2010-02-01"] {
            std::fs::write(dir.path().join(format!("gom.ocn.hi.{date}.nc")), b"").unwrap();
        }
        let files = select(&[dir.path().to_path_buf()], "gom", "ocn", "hi", "", "2010", "2010", "%Y").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["gom.ocn.hi.2010-01-01.nc"]);
    }

    #[test]
    fn bound_time_of_day_is_kept() {
        let files = vec![
            PathBuf::from("/d/x.a.b.2010-03-01.nc"),
            PathBuf::from("/d/x.a.b.2010-03-02.nc"),
        ];
        let kept = filter_dates(&files, 9, 19, "2010-03-01 06:00", "2010-12-31 00:00", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(kept, vec![PathBuf::from("/d/x.a.b.2010-03-02.nc")]);
    }

    #[test]
    fn filter_dates_names_the_offending_file() {
        let files = vec![PathBuf::from("/d/x.a.b.notadate__.nc")];
        let err = filter_dates(&files, 9, 19, "2010-01-01", "2010-12-31", "%Y-%m-%d").unwrap_err();
        assert!(err.to_string().contains("notadate"));
    }
}
