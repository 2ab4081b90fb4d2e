//! CF time-coordinate decoding and calendar fields used for grouping.
//!
//! Ocean models write time as an offset from a reference instant, e.g.
//! `ocean_time:units = "seconds since 1900-01-01 00:00:00"`, in one of several
//! calendars. Only the calendar fields (year, month, day, hour) are needed for
//! climatologies, so decoded instants are kept as plain [`CalendarDate`]s
//! instead of chrono types; that keeps `noleap` and `360_day` dates valid.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::errors::{ReplotsError, Result};

const SECONDS_PER_DAY: i64 = 86_400;
/// Largest offset from the reference instant accepted by the decoder, in seconds.
const MAX_OFFSET_SECONDS: f64 = (i64::MAX / 2) as f64;
const NOLEAP_CUMULATIVE: [u32; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];

/// Calendars understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarKind {
    /// `standard`, `gregorian`, `proleptic_gregorian`, `julian`
    Standard,
    /// `noleap`, `365_day`
    NoLeap,
    /// `360_day`
    Day360,
}

impl FromStr for CalendarKind {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "standard" | "gregorian" | "proleptic_gregorian" | "julian" => Ok(Self::Standard),
            "noleap" | "365_day" => Ok(Self::NoLeap),
            "360_day" => Ok(Self::Day360),
            other => Err(ReplotsError::InvalidTime(format!(
                "unsupported calendar '{other}'"
            ))),
        }
    }
}

/// Calendar fields of a decoded time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// 1-based day of year.
    pub day_of_year: u32,
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// Parsed `"<unit> since <reference>"` attribute plus calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    seconds_per_unit: f64,
    reference: (i32, u32, u32, i64),
    calendar: CalendarKind,
}

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "second" | "seconds" | "sec" | "secs" | "s" => Some(1.0),
        "minute" | "minutes" | "min" | "mins" => Some(60.0),
        "hour" | "hours" | "hr" | "hrs" | "h" => Some(3_600.0),
        "day" | "days" | "d" => Some(86_400.0),
        _ => None,
    }
}

fn parse_reference(text: &str) -> Result<(i32, u32, u32, i64)> {
    let invalid = |why: &str| ReplotsError::InvalidTime(format!("reference '{text}': {why}"));

    let mut parts = text.split(|c: char| c == ' ' || c == 'T').filter(|p| !p.is_empty());
    let date = parts.next().ok_or_else(|| invalid("missing date"))?;
    let ymd: Vec<&str> = date.split('-').collect();
    // A leading '-' would denote a negative year; not produced by ocean models.
    if ymd.len() != 3 {
        return Err(invalid("expected Y-M-D"));
    }
    let year: i32 = ymd[0].parse().map_err(|_| invalid("bad year"))?;
    let month: u32 = ymd[1].parse().map_err(|_| invalid("bad month"))?;
    let day: u32 = ymd[2].parse().map_err(|_| invalid("bad day"))?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid("month or day out of range"));
    }

    let seconds = match parts.next() {
        Some(clock) if clock.contains(':') => {
            let hms: Vec<&str> = clock.split(':').collect();
            let h: i64 = hms[0].parse().map_err(|_| invalid("bad hour"))?;
            let m: i64 = hms
                .get(1)
                .map_or(Ok(0), |v| v.parse())
                .map_err(|_| invalid("bad minute"))?;
            let s: f64 = hms
                .get(2)
                .map_or(Ok(0.0), |v| v.parse())
                .map_err(|_| invalid("bad second"))?;
            h * 3_600 + m * 60 + s as i64
        }
        _ => 0,
    };

    Ok((year, month, day, seconds))
}

impl TimeUnits {
    /// Parse a CF `units` string with the given `calendar` attribute value.
    pub fn parse(units: &str, calendar: &str) -> Result<Self> {
        let mut pieces = units.trim().splitn(3, ' ');
        let unit = pieces.next().unwrap_or_default();
        let since = pieces.next().unwrap_or_default();
        let reference = pieces.next().unwrap_or_default();

        if !since.eq_ignore_ascii_case("since") {
            return Err(ReplotsError::InvalidTime(format!(
                "unexpected time units format: '{units}'"
            )));
        }
        let seconds_per_unit = unit_seconds(unit)
            .ok_or_else(|| ReplotsError::InvalidTime(format!("unknown time unit '{unit}'")))?;

        let calendar: CalendarKind = calendar.parse()?;
        let reference = parse_reference(reference)?;
        if calendar == CalendarKind::NoLeap && reference.1 == 2 && reference.2 == 29 {
            return Err(ReplotsError::InvalidTime(
                "Feb 29 reference date in a noleap calendar".to_string(),
            ));
        }

        Ok(Self {
            seconds_per_unit,
            reference,
            calendar,
        })
    }

    pub fn calendar(&self) -> CalendarKind {
        self.calendar
    }

    /// Decode one offset into calendar fields.
    pub fn decode(&self, offset: f64) -> Result<CalendarDate> {
        if !offset.is_finite() {
            return Err(ReplotsError::InvalidTime(format!(
                "non-finite time value {offset}"
            )));
        }
        let seconds = (offset * self.seconds_per_unit).round();
        if seconds.abs() > MAX_OFFSET_SECONDS {
            return Err(ReplotsError::InvalidTime(format!(
                "time value {offset} is out of range"
            )));
        }
        let delta = seconds as i64;
        match self.calendar {
            CalendarKind::Standard => self.decode_standard(delta),
            CalendarKind::NoLeap => self.decode_fixed(delta, 365, noleap_month_day),
            CalendarKind::Day360 => {
                self.decode_fixed(delta, 360, |doy| (doy / 30 + 1, doy % 30 + 1))
            }
        }
    }

    /// Decode a whole coordinate.
    pub fn decode_all(&self, offsets: &[f64]) -> Result<Vec<CalendarDate>> {
        offsets.iter().map(|&o| self.decode(o)).collect()
    }

    fn decode_standard(&self, delta_seconds: i64) -> Result<CalendarDate> {
        let (y, m, d, s) = self.reference;
        let base: NaiveDateTime = NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ReplotsError::InvalidTime(format!("invalid reference date {y}-{m}-{d}")))?;
        let instant = s
            .checked_add(delta_seconds)
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| base.checked_add_signed(delta))
            .ok_or_else(|| ReplotsError::InvalidTime("time offset overflows".to_string()))?;

        Ok(CalendarDate {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            day_of_year: instant.ordinal(),
        })
    }

    fn decode_fixed(
        &self,
        delta_seconds: i64,
        days_per_year: i64,
        month_day: impl Fn(u32) -> (u32, u32),
    ) -> Result<CalendarDate> {
        let (y, m, d, s) = self.reference;
        let ref_doy = if days_per_year == 365 {
            i64::from(NOLEAP_CUMULATIVE[m as usize - 1] + d - 1)
        } else {
            i64::from((m - 1) * 30 + d - 1)
        };
        let overflow = || ReplotsError::InvalidTime("time offset overflows".to_string());
        let total = (i64::from(y) * days_per_year + ref_doy)
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|t| t.checked_add(s))
            .and_then(|t| t.checked_add(delta_seconds))
            .ok_or_else(overflow)?;

        let days = total.div_euclid(SECONDS_PER_DAY);
        let seconds_of_day = total.rem_euclid(SECONDS_PER_DAY);
        let year = i32::try_from(days.div_euclid(days_per_year)).map_err(|_| overflow())?;
        let doy = days.rem_euclid(days_per_year) as u32;
        let (month, day) = month_day(doy);

        Ok(CalendarDate {
            year,
            month,
            day,
            hour: (seconds_of_day / 3_600) as u32,
            day_of_year: doy + 1,
        })
    }
}

/// 0-based day of year to (month, day) in a 365-day calendar.
fn noleap_month_day(doy: u32) -> (u32, u32) {
    let month = NOLEAP_CUMULATIVE
        .iter()
        .rposition(|&start| start <= doy)
        .map_or(1, |idx| idx as u32 + 1)
        .min(12);
    (month, doy - NOLEAP_CUMULATIVE[month as usize - 1] + 1)
}

/// Calendar field a climatology can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Month,
    Season,
    Year,
    Day,
    DayOfYear,
    Hour,
}

/// Season labels in group order.
pub const SEASONS: [&str; 4] = ["DJF", "MAM", "JJA", "SON"];

impl CalendarField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Season => "season",
            Self::Year => "year",
            Self::Day => "day",
            Self::DayOfYear => "dayofyear",
            Self::Hour => "hour",
        }
    }

    /// Group key of `date` for this field. Seasons map to 0..=3 in [`SEASONS`] order.
    pub fn key(self, date: &CalendarDate) -> i64 {
        match self {
            Self::Month => i64::from(date.month),
            Self::Season => match date.month {
                12 | 1 | 2 => 0,
                3..=5 => 1,
                6..=8 => 2,
                _ => 3,
            },
            Self::Year => i64::from(date.year),
            Self::Day => i64::from(date.day),
            Self::DayOfYear => i64::from(date.day_of_year),
            Self::Hour => i64::from(date.hour),
        }
    }
}

impl FromStr for CalendarField {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "month" => Ok(Self::Month),
            "season" => Ok(Self::Season),
            "year" => Ok(Self::Year),
            "day" => Ok(Self::Day),
            "dayofyear" => Ok(Self::DayOfYear),
            "hour" => Ok(Self::Hour),
            other => Err(ReplotsError::UnknownAverageType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_roms_seconds_since_1900() {
        let units = TimeUnits::parse("seconds since 1900-01-01 00:00:00", "gregorian").unwrap();
        // 2010-01-03 03:00:00
        let offset = 3_471_469_200.0;
        let date = units.decode(offset).unwrap();
        assert_eq!((date.year, date.month, date.day, date.hour), (2010, 1, 3, 3));
    }

    #[test]
    fn decodes_noleap_days_since_year_zero() {
        let units = TimeUnits::parse("days since 0000-01-01 00:00:00", "noleap").unwrap();
        // 10 years of 365 days + 59 days lands on March 1st, never Feb 29th.
        let date = units.decode(3_650.0 + 59.0).unwrap();
        assert_eq!((date.year, date.month, date.day), (10, 3, 1));
        assert_eq!(date.day_of_year, 60);

        let last = units.decode(364.0).unwrap();
        assert_eq!((last.year, last.month, last.day), (0, 12, 31));
    }

    #[test]
    fn decodes_360_day_months() {
        let units = TimeUnits::parse("days since 2000-01-01", "360_day").unwrap();
        let date = units.decode(59.0).unwrap();
        assert_eq!((date.year, date.month, date.day), (2000, 2, 30));
    }

    #[test]
    fn default_fill_offsets_are_errors() {
        // NetCDF default f64 fill read back without a _FillValue attribute
        let fill = 9.969_209_968_386_869e36;
        for calendar in ["standard", "noleap", "360_day"] {
            let units = TimeUnits::parse("seconds since 1900-01-01 00:00:00", calendar).unwrap();
            assert!(matches!(units.decode(fill), Err(ReplotsError::InvalidTime(_))), "{calendar}");
            assert!(units.decode(-fill).is_err(), "{calendar}");
        }
        let days = TimeUnits::parse("days since 2000-01-01", "noleap").unwrap();
        assert!(days.decode(1.0e17).is_err());
    }

    #[test]
    fn rejects_malformed_units() {
        assert!(TimeUnits::parse("days after 2000-01-01", "standard").is_err());
        assert!(TimeUnits::parse("fortnights since 2000-01-01", "standard").is_err());
        assert!(TimeUnits::parse("days since 2000-01-01", "julian_ish").is_err());
    }

    #[test]
    fn season_keys_follow_djf_mam_jja_son() {
        let date = |month| CalendarDate {
            year: 2000,
            month,
            day: 1,
            hour: 0,
            day_of_year: 1,
        };
        let keys: Vec<i64> = (1..=12).map(|m| CalendarField::Season.key(&date(m))).collect();
        assert_eq!(keys, vec![0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 0]);
    }

    #[test]
    fn unknown_field_is_unknown_average_type() {
        let err = "decade".parse::<CalendarField>().unwrap_err();
        assert!(matches!(err, ReplotsError::UnknownAverageType(_)));
    }
}
