//! Lenient epoch-millisecond timestamps.
//!
//! Emission dates arrive from many devices and app versions. A date is
//! accepted as an integer or float number of milliseconds, or as an
//! RFC 3339 string. Anything else reads as `None`, which places the value
//! outside every filter interval instead of failing the whole record.

use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Interpret a JSON value as epoch milliseconds.
pub fn millis_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_millis)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_millis(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < 9.0e15 {
        Some(value.round() as i64)
    } else {
        None
    }
}

/// Serde adapter for optional lenient timestamps.
///
/// Use with `#[serde(default, deserialize_with = "...")]`.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(millis_from_value(&value))
}
