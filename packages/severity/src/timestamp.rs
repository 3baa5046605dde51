//! Lenient incident timestamp parsing.
//!
//! Reporting sources disagree on timestamp formats. Accepted inputs:
//!
//! * RFC 3339 / ISO 8601 strings, with `Z`, with an offset, or naive
//!   (naive values are taken as UTC)
//! * date-only strings (`2025-06-15`, midnight UTC)
//! * UNIX seconds, or UNIX milliseconds for values above `1e12`
//!
//! Anything else yields `None`, which the severity model scores with the
//! fallback decay.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Numbers above this are treated as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e12;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses a JSON timestamp value (string or number).
#[must_use]
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_timestamp_str(s),
        serde_json::Value::Number(n) => n.as_f64().and_then(from_unix),
        _ => None,
    }
}

/// Parses a timestamp string.
#[must_use]
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = s.strip_suffix('Z').unwrap_or(s);
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    if let Ok(number) = s.parse::<f64>() {
        return from_unix(number);
    }

    log::debug!("Unparseable incident timestamp '{raw}'");
    None
}

fn from_unix(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let seconds = if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };

    #[allow(clippy::cast_possible_truncation)]
    let whole = seconds.floor() as i64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = ((seconds - seconds.floor()) * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos)
}
