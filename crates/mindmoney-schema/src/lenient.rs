//! Field decoders for the free-form parts of a chat response.
//!
//! The backend types `action_plan` as an arbitrary dict, so these accept any
//! JSON and keep what can be used instead of rejecting the whole response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ActionPlanPayload;

/// Any number (or numeric string) rounded and clamped to `0..=100`.
pub(crate) fn health_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let score = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score
        .filter(|score| score.is_finite())
        .map(|score| score.round().clamp(0.0, 100.0) as u8))
}

/// Strings are kept, numbers and booleans are rendered as text, anything else
/// is dropped.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(text) => Some(text),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                _ => None,
            })
            .collect(),
    ))
}

/// Entries that fail to decode as `T` are skipped.
pub(crate) fn list_of<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
    ))
}

/// `None` unless the value decodes as `T`.
pub(crate) fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

pub(crate) fn action_plan<'de, D>(
    deserializer: D,
) -> Result<Option<ActionPlanPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(plan) => Ok(Some(plan)),
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable action plan");
            Ok(None)
        }
    }
}
