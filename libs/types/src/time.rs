//! Timestamp encodings and UTC helpers
//!
//! Per-entity series arrive with timestamps in one of three encodings: epoch
//! milliseconds, epoch seconds or date text. The encoding is made explicit as a
//! [`RawTimestamp`] once, at the wire boundary, and everything downstream works
//! on normalized epoch milliseconds (UTC).

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Numeric wire timestamps below this value are epoch seconds, the rest are
/// epoch milliseconds.
///
/// Constraint: millisecond values before 1973-03-03 and second values after
/// the year 5138 are misclassified.
pub const SECONDS_THRESHOLD: f64 = 1e11;

/// Largest magnitude accepted as epoch milliseconds (±100,000,000 days).
pub const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// Default leaderboard scrub step.
pub const FIVE_MINUTES_MS: i64 = 5 * 60 * 1000;

/// A timestamp with an explicit encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(f64),
    /// Seconds since the Unix epoch.
    EpochSeconds(f64),
    /// Date text (RFC 3339, or naive date/time taken as UTC).
    Text(String),
}

impl RawTimestamp {
    /// Normalize to integer epoch milliseconds.
    ///
    /// Returns `None` for non-finite, out-of-range or unparseable input.
    pub fn normalize(&self) -> Option<i64> {
        match self {
            RawTimestamp::EpochMillis(ms) => finite_millis(*ms),
            RawTimestamp::EpochSeconds(secs) => finite_millis(*secs * 1000.0),
            RawTimestamp::Text(text) => parse_date_text(text),
        }
    }
}

/// A timestamp as it appears in a JSON series: a number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Number(f64),
    Text(String),
}

impl TimestampValue {
    /// Decide the encoding of a wire value.
    pub fn classify(&self) -> RawTimestamp {
        match self {
            TimestampValue::Number(v) if *v < SECONDS_THRESHOLD => RawTimestamp::EpochSeconds(*v),
            TimestampValue::Number(v) => RawTimestamp::EpochMillis(*v),
            TimestampValue::Text(s) => RawTimestamp::Text(s.clone()),
        }
    }

    pub fn normalize(&self) -> Option<i64> {
        self.classify().normalize()
    }
}

impl From<i64> for TimestampValue {
    fn from(v: i64) -> Self {
        TimestampValue::Number(v as f64)
    }
}

impl From<&str> for TimestampValue {
    fn from(s: &str) -> Self {
        TimestampValue::Text(s.to_string())
    }
}

fn finite_millis(ms: f64) -> Option<i64> {
    if ms.is_finite() && ms.abs() <= MAX_EPOCH_MILLIS {
        Some(ms.round() as i64)
    } else {
        None
    }
}

/// Parse date text into epoch milliseconds.
///
/// Accepts RFC 3339 (any offset), `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// `YYYY-MM-DD HH:MM:SS[.fff]` and `YYYY-MM-DD`; naive forms are UTC.
pub fn parse_date_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Round `ms` to the nearest multiple of `step_ms`, halves rounding up.
pub fn quantize(ms: i64, step_ms: i64) -> i64 {
    if step_ms <= 0 {
        return ms;
    }
    (2 * ms + step_ms).div_euclid(2 * step_ms) * step_ms
}

/// Format epoch milliseconds as RFC 3339 UTC, omitting a zero fraction.
pub fn format_utc(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// UTC calendar day of an instant, `YYYY-MM-DD`.
pub fn day_key(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
