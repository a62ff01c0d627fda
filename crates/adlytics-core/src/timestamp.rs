//! Calendar timestamps with per-field validation.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};

/// Token written in place of a timestamp that was never recorded
/// (e.g. a visit with no exit).
pub const ABSENT_TOKEN: &str = "n/a";

/// Canonical text layout, `YYYY-MM-DD HH:MM:SS`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A calendar timestamp whose components are validated independently.
///
/// Out-of-range components are stored as `None` and never abort
/// construction, so a partially-invalid value is still displayable. Only a
/// fully valid timestamp converts to [`NaiveDateTime`] for arithmetic and
/// comparison; callers must go through [`Timestamp::to_naive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    exists: bool,
}

/// Leap rule used by campaign logs: every fourth year, no century exception.
pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0
}

pub fn days_in_month(month: u32, year: Option<i32>) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => match year {
            Some(y) if !is_leap_year(y) => 28,
            _ => 29,
        },
        _ => 31,
    }
}

fn in_range(value: i64, min: i64, max: i64) -> Option<u32> {
    if (min..=max).contains(&value) {
        u32::try_from(value).ok()
    } else {
        None
    }
}

impl Timestamp {
    /// Build a timestamp from raw components. Each component is checked on
    /// its own; an invalid one is recorded as missing and logged.
    pub fn from_parts(year: i64, month: i64, day: i64, hour: i64, minute: i64, second: i64) -> Self {
        let year_ok = if (1000..=9999).contains(&year) {
            i32::try_from(year).ok()
        } else {
            None
        };
        let month_ok = in_range(month, 1, 12);
        let max_day = month_ok.map_or(31, |m| days_in_month(m, year_ok));
        let day_ok = in_range(day, 1, i64::from(max_day));
        let hour_ok = in_range(hour, 0, 23);
        let minute_ok = in_range(minute, 0, 59);
        let second_ok = in_range(second, 0, 59);

        let ts = Self {
            year: year_ok,
            month: month_ok,
            day: day_ok,
            hour: hour_ok,
            minute: minute_ok,
            second: second_ok,
            exists: true,
        };
        if !ts.is_valid() {
            tracing::debug!(
                year,
                month,
                day,
                hour,
                minute,
                second,
                "timestamp has out-of-range components"
            );
        }
        ts
    }

    /// The explicitly absent timestamp (`n/a`).
    pub fn absent() -> Self {
        Self {
            year: None,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
            exists: false,
        }
    }

    /// A timestamp that could not be parsed at all. Renders as an empty string.
    pub fn invalid() -> Self {
        Self {
            exists: true,
            ..Self::absent()
        }
    }

    pub fn from_naive(dt: NaiveDateTime) -> Self {
        Self {
            year: Some(dt.year()),
            month: Some(dt.month()),
            day: Some(dt.day()),
            hour: Some(dt.hour()),
            minute: Some(dt.minute()),
            second: Some(dt.second()),
            exists: true,
        }
    }

    /// Parse `YYYY-MM-DD HH:MM:SS` or the absent token.
    ///
    /// Syntax errors give [`Timestamp::invalid`]; well-formed text with
    /// out-of-range numbers gives a partially-valid timestamp.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == ABSENT_TOKEN {
            return Self::absent();
        }
        match split_components(raw) {
            Some([y, mo, d, h, mi, s]) => Self::from_parts(y, mo, d, h, mi, s),
            None => {
                tracing::debug!(raw, "unparseable timestamp");
                Self::invalid()
            }
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// True when the timestamp exists and every component is in range.
    pub fn is_valid(&self) -> bool {
        self.exists
            && self.year.is_some()
            && self.month.is_some()
            && self.day.is_some()
            && self.hour.is_some()
            && self.minute.is_some()
            && self.second.is_some()
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    pub fn hour(&self) -> Option<u32> {
        self.hour
    }

    pub fn minute(&self) -> Option<u32> {
        self.minute
    }

    pub fn second(&self) -> Option<u32> {
        self.second
    }

    /// Convert to a chrono value. `None` unless every component is valid and
    /// the date exists in the proleptic Gregorian calendar (2100-02-29 passes
    /// the log leap rule but has no chrono representation).
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        if !self.is_valid() {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)?.and_hms_opt(
            self.hour?,
            self.minute?,
            self.second?,
        )
    }
}

/// Split `YYYY-MM-DD HH:MM:SS` into six integers, checking only the shape.
fn split_components(raw: &str) -> Option<[i64; 6]> {
    let bytes = raw.as_bytes();
    if bytes.len() != 19 {
        return None;
    }
    let separators = [(4, b'-'), (7, b'-'), (10, b' '), (13, b':'), (16, b':')];
    if separators.iter().any(|&(idx, sep)| bytes[idx] != sep) {
        return None;
    }
    let spans = [(0, 4), (5, 7), (8, 10), (11, 13), (14, 16), (17, 19)];
    let mut out = [0i64; 6];
    for (slot, (from, to)) in out.iter_mut().zip(spans) {
        let part = &raw[from..to];
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    Some(out)
}

impl fmt::Display for Timestamp {
    /// Canonical form. Invalid components print as `-1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists {
            return f.write_str(ABSENT_TOKEN);
        }
        let parts = [
            self.year.map(i64::from),
            self.month.map(i64::from),
            self.day.map(i64::from),
            self.hour.map(i64::from),
            self.minute.map(i64::from),
            self.second.map(i64::from),
        ];
        if parts.iter().all(Option::is_none) {
            return Ok(());
        }
        let [y, mo, d, h, mi, s] = [
            pad(parts[0], 4),
            pad(parts[1], 2),
            pad(parts[2], 2),
            pad(parts[3], 2),
            pad(parts[4], 2),
            pad(parts[5], 2),
        ];
        write!(f, "{y}-{mo}-{d} {h}:{mi}:{s}")
    }
}

fn pad(value: Option<i64>, width: usize) -> String {
    value.map_or_else(|| "-1".to_string(), |v| format!("{v:0width$}"))
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
