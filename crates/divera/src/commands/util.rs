//! Shared helpers for command handlers.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use divera_core::{CoreError, EntityKey, Hub, UnitId};

use crate::error::CliError;

/// Pick the unit a command applies to.
///
/// An explicit `--unit` wins; otherwise the unit holding `target`; otherwise
/// the only configured unit.
pub fn resolve_unit(
    hub: &Hub,
    explicit: Option<u64>,
    target: Option<EntityKey>,
) -> Result<UnitId, CoreError> {
    if let Some(unit) = explicit {
        return Ok(UnitId(unit));
    }
    if let Some(unit) = target.and_then(|key| hub.locate(key.kind, key.id)) {
        return Ok(unit);
    }
    match hub.units().as_slice() {
        [only] => Ok(*only),
        units => Err(CoreError::invalid(format!(
            "{} units are configured; choose one with --unit",
            units.len()
        ))),
    }
}

/// Read and parse a JSON object for `--file` / `--data` flags.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::Validation {
            field: "data".into(),
            reason: "expected a JSON object".into(),
        }),
    }
}

pub fn read_object_file(path: &Path) -> Result<Map<String, Value>, CliError> {
    parse_object(&std::fs::read_to_string(path)?)
}

/// Split `key=value`; numbers and booleans become JSON scalars, anything
/// else a string.
pub fn parse_property(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .ok_or_else(|| CliError::Validation {
            field: "property".into(),
            reason: format!("expected key=value, got '{raw}'"),
        })?;
    let value = if let Ok(b) = value.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(n) = value.parse::<i64>() {
        Value::from(n)
    } else if let Some(n) = value.parse::<f64>().ok().filter(|f| f.is_finite()) {
        Value::from(n)
    } else {
        Value::String(value.to_owned())
    };
    Ok((key.trim().to_owned(), value))
}

/// "3m 12s ago" style age of a timestamp.
pub fn age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0).unsigned_abs();
    format!("{} ago", humantime::format_duration(Duration::from_secs(secs)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_detect_scalars() {
        assert_eq!(parse_property("water=1200").unwrap(), ("water".into(), json!(1200)));
        assert_eq!(parse_property("ready=true").unwrap(), ("ready".into(), json!(true)));
        assert_eq!(parse_property("fuel=0.75").unwrap(), ("fuel".into(), json!(0.75)));
        assert_eq!(
            parse_property("note=a=b").unwrap(),
            ("note".into(), json!("a=b"))
        );
        assert!(parse_property("=5").is_err());
        assert!(parse_property("novalue").is_err());
    }

    #[test]
    fn data_must_be_an_object() {
        assert!(parse_object(r#"{"vehicle_id": 1}"#).is_ok());
        assert!(matches!(
            parse_object("[1, 2]"),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(parse_object("{"), Err(CliError::Json(_))));
    }
}
