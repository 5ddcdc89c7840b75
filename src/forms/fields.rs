//! Field deserializers for submitted forms
//!
//! Use them with `#[serde(default, deserialize_with = "...")]`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Checkbox: absent, empty, `off`, `false`, `0` and `no` are false
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(value) => Ok(value),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().map_or(false, |n| n != 0.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "off" | "false" | "0" | "no" => Ok(false),
            "on" | "true" | "1" | "yes" => Ok(true),
            other => Err(D::Error::custom(format!("invalid checkbox value '{}'", other))),
        },
        other => Err(D::Error::custom(format!("invalid checkbox value {}", other))),
    }
}

fn parse_number<T, E>(value: Value) -> Result<Option<T>, E>
where
    T: FromStr + DeserializeOwned,
    E: Error,
{
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| E::custom(format!("'{}' is not a valid number", s))),
        other => serde_json::from_value(other).map(Some).map_err(E::custom),
    }
}

/// Number sent as text or as a JSON number; empty means the default
pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + DeserializeOwned + Default,
{
    Ok(parse_number::<T, D::Error>(Value::deserialize(deserializer)?)?.unwrap_or_default())
}

/// Number sent as text or as a JSON number; empty means none
pub fn optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + DeserializeOwned,
{
    parse_number(Value::deserialize(deserializer)?)
}

/// Text where empty means none
pub fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// Date and time as RFC 3339, `datetime-local` input value or plain date
pub fn optional_datetime<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    let Some(value) = value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    parse_datetime(&value)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("'{}' is not a valid date", value)))
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(value, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// List sent as a JSON array, repeated `name[]` fields or comma separated text
pub fn list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(D::Error::custom(format!("invalid list entry {}", other))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(D::Error::custom(format!("invalid list {}", other))),
    };

    Ok(values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
