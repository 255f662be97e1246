use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Formats accepted for non-numeric timestamp strings, all read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Convert a WhatsApp timestamp of unknown shape into an absolute time.
///
/// - integer strings and JSON numbers are epoch seconds
/// - any other string is parsed as a date
/// - everything else, or anything unparsable, is `None`
pub fn normalize_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => normalize_timestamp_str(s),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                from_epoch_seconds(secs)
            } else {
                n.as_f64().and_then(from_fractional_seconds)
            }
        }
        _ => None,
    }
}

pub fn normalize_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(secs) => from_epoch_seconds(secs),
        Err(_) => parse_date_string(trimmed),
    }
}

/// Epoch seconds to a millisecond-resolution time.
pub fn from_epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    let millis = secs.checked_mul(1000)?;
    Utc.timestamp_millis_opt(millis).single()
}

fn from_fractional_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
