//! Date parsing and duration formatting
//!
//! Accepts RFC 3339 timestamps, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (read as
//! UTC) and bare `YYYY-MM-DD` dates (UTC midnight).

use crate::types::Scalar;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse date text in any supported format
pub fn parse_date_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Date view of a value that is already date-like (dates and date text only)
pub fn as_date(value: &Scalar) -> Option<DateTime<Utc>> {
    match value {
        Scalar::Date(d) => Some(*d),
        Scalar::Text(s) => parse_date_str(s),
        _ => None,
    }
}

/// Date coercion used by `Date(...)`, `dateObj(...)` and `daysBetween(...)`:
/// numbers are epoch milliseconds
pub fn coerce_date(value: &Scalar) -> Option<DateTime<Utc>> {
    match value {
        Scalar::Number(ms) if ms.is_finite() => Utc.timestamp_millis_opt(*ms as i64).single(),
        other => as_date(other),
    }
}

/// Whole days between two instants, ignoring order
pub fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (a - b).num_days().abs()
}

/// Coarse human rendering of a seconds count
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{} seconds", seconds.floor() as i64)
    } else if seconds < 3600.0 {
        format!("{} minutes", (seconds / 60.0).floor() as i64)
    } else if seconds < 86400.0 {
        format!("{} hours", (seconds / 3600.0).floor() as i64)
    } else {
        format!("{} days", (seconds / 86400.0).floor() as i64)
    }
}
