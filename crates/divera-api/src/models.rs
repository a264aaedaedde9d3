// Wire types for the Divera v2 REST API.
//
// Read payloads stay as `serde_json::Value` (the pull/all tree is large and
// mostly optional); only envelopes, login data and write bodies are typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

// ── Envelope ────────────────────────────────────────────────────────

/// Standard `{ success, data, errors, message }` response wrapper.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    /// Absent on a few bare endpoints; treated as success.
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub errors: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl Envelope {
    /// Best human-readable failure text the envelope carries.
    pub fn error_message(&self) -> String {
        self.errors
            .as_ref()
            .and_then(flatten_errors)
            .or_else(|| self.message.as_ref().and_then(flatten_errors))
            .unwrap_or_else(|| "request was not successful".into())
    }
}

/// Flatten Divera's `errors` field into a single line.
///
/// The API returns a list of strings, a map of field to string (or list of
/// strings), or a bare string depending on the endpoint.
pub(crate) fn flatten_errors(value: &Value) -> Option<String> {
    let parts: Vec<String> = match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().filter_map(flatten_errors).collect(),
        Value::Object(map) => map.values().filter_map(flatten_errors).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    };
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Read an integer that Divera may encode as a number or a numeric string.
pub(crate) fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Units ───────────────────────────────────────────────────────────

/// One unit (user-cluster relation) the authenticated account can access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAccess {
    /// The user-cluster-relation id; selects the unit in `pull/all?ucr=`.
    pub ucr_id: u64,
    pub name: String,
    /// Account kind within the unit (4 user, 5 monitor, 8 system, 19 vehicle).
    pub usergroup_id: Option<u64>,
}

impl UnitAccess {
    /// Parse the `ucr` list returned by `auth/login`.
    pub(crate) fn from_login_list(value: &Value) -> Vec<Self> {
        let Some(items) = value.as_array() else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let ucr_id = item.get("id").and_then(lenient_u64)?;
                Some(Self {
                    ucr_id,
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    usergroup_id: item.get("usergroup_id").and_then(lenient_u64),
                })
            })
            .collect()
    }

    /// Parse the `ucr` map (`id -> {name, usergroup_id}`) of a pull/all payload.
    pub(crate) fn from_pull_map(value: &Value) -> Vec<Self> {
        let Some(map) = value.as_object() else {
            return Vec::new();
        };
        let mut units: Vec<Self> = map
            .iter()
            .filter_map(|(key, item)| {
                let ucr_id = key.parse().ok()?;
                Some(Self {
                    ucr_id,
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    usergroup_id: item.get("usergroup_id").and_then(lenient_u64),
                })
            })
            .collect();
        units.sort_by_key(|u| u.ucr_id);
        units
    }
}

// ── Vehicles ────────────────────────────────────────────────────────

/// Body of `POST using-vehicles/set-status/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleStatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Crew operation on a vehicle (`using-vehicle-crew/{mode}/{id}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CrewMode {
    Add,
    Remove,
    Reset,
}

#[derive(Debug, Serialize)]
pub(crate) struct CrewChange<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<&'a [u64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove: Option<&'a [u64]>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CrewBody<'a> {
    #[serde(rename = "Crew", skip_serializing_if = "Option::is_none")]
    pub crew: Option<CrewChange<'a>>,
}

// ── Alarms, messages, news ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct AlarmBody<'a, T: Serialize> {
    #[serde(rename = "Alarm")]
    pub alarm: &'a T,
}

/// Body fields of `POST alarms/close/{id}`.
#[derive(Debug, Serialize)]
pub(crate) struct CloseAlarm<'a> {
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub message_channel_id: u64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageBody<'a> {
    #[serde(rename = "Message")]
    pub message: Message<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewsBody<'a, T: Serialize> {
    #[serde(rename = "News")]
    pub news: &'a T,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub jwt: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginBody<'a> {
    #[serde(rename = "Login")]
    pub login: LoginForm<'a>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_errors_handles_every_shape() {
        assert_eq!(
            flatten_errors(&json!(["Bad password", "Locked"])).as_deref(),
            Some("Bad password; Locked")
        );
        assert_eq!(
            flatten_errors(&json!({"username": ["unknown"], "password": "wrong"})).as_deref(),
            Some("unknown; wrong")
        );
        assert_eq!(flatten_errors(&json!("nope")).as_deref(), Some("nope"));
        assert_eq!(flatten_errors(&json!([])), None);
    }

    #[test]
    fn pull_map_units_are_sorted_and_lenient() {
        let units = UnitAccess::from_pull_map(&json!({
            "200": {"name": "Wache Nord", "usergroup_id": "8"},
            "100": {"name": "Wache Süd", "usergroup_id": 4},
            "bogus": {"name": "ignored"}
        }));
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].ucr_id, 100);
        assert_eq!(units[0].usergroup_id, Some(4));
        assert_eq!(units[1].usergroup_id, Some(8));
    }

    #[test]
    fn crew_body_reset_is_empty_object() {
        let body = CrewBody { crew: None };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({}));
    }

    #[test]
    fn crew_mode_parses() {
        assert_eq!("remove".parse::<CrewMode>().unwrap(), CrewMode::Remove);
        assert!("swap".parse::<CrewMode>().is_err());
    }

    #[test]
    fn crew_mode_display_matches_wire_name() {
        for mode in [CrewMode::Add, CrewMode::Remove, CrewMode::Reset] {
            assert_eq!(json!(mode.to_string()), serde_json::to_value(mode).unwrap());
        }
        assert_eq!(CrewMode::Reset.to_string(), "reset");
    }
}
