// ── Action field schemas ──
//
// Required and optional call fields per action, checked before the call is
// deserialized into a typed request. Unknown fields are rejected unless the
// action accepts free-form extras.

use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::CoreError;

const SEND_FLAGS: &[&str] = &["send_push", "send_sms", "send_call", "send_mail", "send_pager"];

const ALARM_TARGETING: &[&str] = &[
    "notification_filter_access",
    "group",
    "user_cluster_relation",
    "notification_filter_vehicle",
    "vehicle",
    "notification_filter_status",
    "status",
];

/// Every action a unit accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    SetVehicleStatus,
    SetVehicleCrew,
    SetVehicleProperties,
    CreateAlarm,
    ModifyAlarm,
    CloseAlarm,
    SendMessage,
    CreateNews,
}

/// Declared fields of one action.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub kind: ActionKind,
    pub required: Vec<&'static str>,
    pub optional: Vec<&'static str>,
    /// Whether undeclared fields pass through (vehicle properties).
    pub extra: bool,
}

impl ActionKind {
    /// Whether the action creates a record the next poll will pick up.
    pub fn creates_record(self) -> bool {
        matches!(self, Self::CreateAlarm | Self::SendMessage | Self::CreateNews)
    }

    /// Send flags are one-shot delivery switches, never record state.
    pub fn is_send_flag(field: &str) -> bool {
        SEND_FLAGS.contains(&field)
    }

    pub fn schema(self) -> ActionSchema {
        let (required, optional, extra): (Vec<&str>, Vec<&str>, bool) = match self {
            Self::SetVehicleStatus => (
                vec!["vehicle_id"],
                vec!["status", "status_id", "status_note", "lat", "lng"],
                false,
            ),
            Self::SetVehicleCrew => (vec!["vehicle_id", "mode"], vec!["crew"], false),
            Self::SetVehicleProperties => (vec!["vehicle_id"], Vec::new(), true),
            Self::CreateAlarm => (
                vec!["cluster_id", "title", "notification_type"],
                [
                    &[
                        "foreign_id",
                        "priority",
                        "text",
                        "address",
                        "lat",
                        "lng",
                        "response_time",
                        "closed",
                    ][..],
                    SEND_FLAGS,
                    ALARM_TARGETING,
                ]
                .concat(),
                false,
            ),
            Self::ModifyAlarm => (
                vec!["alarm_id", "title", "notification_type"],
                [
                    &[
                        "foreign_id",
                        "alarmcode_id",
                        "priority",
                        "text",
                        "address",
                        "lat",
                        "lng",
                        "report",
                        "private_mode",
                        "response_time",
                        "closed",
                        "ts_publish",
                    ][..],
                    SEND_FLAGS,
                    ALARM_TARGETING,
                ]
                .concat(),
                false,
            ),
            Self::CloseAlarm => (vec!["alarm_id"], vec!["closed", "report"], false),
            Self::SendMessage => (vec!["text"], vec!["message_channel_id", "alarm_id"], false),
            Self::CreateNews => (
                vec!["cluster_id", "title", "notification_type"],
                [
                    &[
                        "text",
                        "address",
                        "group",
                        "user_cluster_relation",
                        "survey",
                        "private_mode",
                        "archive",
                        "ts_archive",
                        "newssurvey_title",
                        "newssurvey_show_result_count",
                        "newssurvey_show_result_names",
                        "newssurvey_multiple_answers",
                        "newssurvey_custom_answers",
                        "newssurvey_response_until",
                        "newssurvey_ts_response",
                        "newssurvey_answers",
                        "newssurvey_sorting",
                    ][..],
                    SEND_FLAGS,
                ]
                .concat(),
                false,
            ),
        };
        ActionSchema {
            kind: self,
            required,
            optional,
            extra,
        }
    }
}

impl ActionSchema {
    /// Check presence of every required field and reject undeclared ones.
    ///
    /// `null` and empty strings count as missing. All missing fields are
    /// reported at once.
    pub fn validate(&self, data: &Map<String, Value>) -> Result<(), CoreError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|field| is_blank(data.get(**field)))
            .map(|field| (*field).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::missing_fields(missing));
        }

        if !self.extra {
            let unknown: Vec<&str> = data
                .keys()
                .map(String::as_str)
                .filter(|key| !self.required.contains(key) && !self.optional.contains(key))
                .collect();
            if !unknown.is_empty() {
                return Err(CoreError::invalid(format!(
                    "{}: unknown field(s) {}",
                    self.kind,
                    unknown.join(", ")
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lists_every_missing_field() {
        let err = ActionKind::CreateAlarm
            .schema()
            .validate(&map(json!({ "title": "" })))
            .unwrap_err();
        match err {
            CoreError::Validation { missing, .. } => {
                assert_eq!(missing, vec!["cluster_id", "title", "notification_type"]);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_fields_unless_extras_allowed() {
        let data = map(json!({ "vehicle_id": 1, "colour": "red" }));
        assert!(ActionKind::SetVehicleStatus.schema().validate(&data).is_err());
        assert!(ActionKind::SetVehicleProperties.schema().validate(&data).is_ok());
    }

    #[test]
    fn names_round_trip() {
        for kind in ActionKind::iter() {
            let name: &'static str = kind.into();
            assert_eq!(name.parse::<ActionKind>().unwrap(), kind);
            assert!(!kind.schema().required.is_empty());
        }
    }

    #[test]
    fn create_actions() {
        assert!(ActionKind::SendMessage.creates_record());
        assert!(!ActionKind::CloseAlarm.creates_record());
        assert!(ActionKind::is_send_flag("send_sms"));
        assert!(!ActionKind::is_send_flag("title"));
    }
}
