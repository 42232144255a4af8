use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;

use crate::error::CelastrinaError;

use super::PropertyManager;

/// Parse a raw property value as a number.
pub fn parse_number(key: &str, raw: &str) -> Result<f64, CelastrinaError> {
    raw.trim().parse::<f64>().map_err(|_| {
        CelastrinaError::configuration(format!("property '{key}' is not a number: '{raw}'"))
    })
}

/// Parse a raw property value as a boolean (`true`/`1`/`yes` and
/// `false`/`0`/`no`).
pub fn parse_boolean(key: &str, raw: &str) -> Result<bool, CelastrinaError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CelastrinaError::configuration(format!(
            "property '{key}' is not a boolean: '{raw}'"
        ))),
    }
}

/// Parse a raw property value as an RFC 3339 date.
pub fn parse_date(key: &str, raw: &str) -> Result<DateTime<FixedOffset>, CelastrinaError> {
    DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
        CelastrinaError::configuration(format!("property '{key}' is not a date: '{raw}'"))
            .with_cause(e)
    })
}

/// Compile a raw property value as a regular expression.
pub fn parse_regexp(key: &str, raw: &str) -> Result<regex::Regex, CelastrinaError> {
    regex::Regex::new(raw).map_err(|e| {
        CelastrinaError::configuration(format!(
            "property '{key}' is not a valid regular expression: '{raw}'"
        ))
        .with_cause(e)
    })
}

/// Parse a raw property value as a JSON object/value.
pub fn parse_object(key: &str, raw: &str) -> Result<serde_json::Value, CelastrinaError> {
    serde_json::from_str(raw).map_err(|e| {
        CelastrinaError::configuration(format!("property '{key}' is not valid JSON"))
            .with_cause(e)
    })
}

/// Fetch a JSON property and deserialize it into a concrete type.
///
/// This is the typed companion to
/// [`PropertyManager::get_object`]: the raw string is parsed
/// as JSON and then mapped through serde.
pub async fn get_object_as<T: DeserializeOwned>(
    manager: &dyn PropertyManager,
    key: &str,
) -> Result<Option<T>, CelastrinaError> {
    match manager.get_property(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| {
                CelastrinaError::configuration(format!(
                    "property '{key}' could not be deserialized"
                ))
                .with_cause(e)
            }),
        None => Ok(None),
    }
}
