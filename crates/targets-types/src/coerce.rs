//! Lenient coercions for loosely typed emission fields.
//!
//! Flags and grouping keys are written by configurable task and target
//! scripts, so `pass: 1` and `groupBy: 42` both occur in practice. Flags
//! follow JavaScript truthiness; grouping keys keep scalars in their string
//! form.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// JavaScript truthiness of an optional JSON value.
///
/// Absent, `null`, `false`, `0`, and `""` are falsy. Every array and object
/// is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n
            .as_f64()
            .is_some_and(|f| f.is_normal() || f.is_subnormal()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// A grouping key: strings as-is, numbers and booleans in string form.
pub fn group_key_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Serde adapter reading any value as a truthy flag.
pub fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(Some(&value)))
}

/// [`deserialize_truthy`] for optional flags. A present field always reads
/// as `Some`.
///
/// Use with `#[serde(default, deserialize_with = "...")]`.
pub fn deserialize_optional_truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_truthy(deserializer).map(Some)
}

/// Serde adapter for optional grouping keys.
///
/// Use with `#[serde(default, deserialize_with = "...")]`.
pub fn deserialize_group_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(group_key_from_value(&value))
}
