// ── Typed action requests ──
//
// Call data deserialized after schema validation. Ids are accepted as
// numbers or numeric strings; id lists additionally as comma-separated
// strings, the way the vendor's own forms submit them.

use divera_api::{CrewMode, VehicleStatusUpdate};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::model::RecordId;

// ── Vehicles ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleStatusRequest {
    #[serde(deserialize_with = "record_id")]
    pub vehicle_id: RecordId,
    #[serde(default)]
    pub status: Option<u32>,
    #[serde(default)]
    pub status_id: Option<u32>,
    #[serde(default)]
    pub status_note: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl VehicleStatusRequest {
    pub fn to_update(&self) -> VehicleStatusUpdate {
        VehicleStatusUpdate {
            status: self.status,
            status_id: self.status_id,
            status_note: self.status_note.clone(),
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// FMS status to record locally; `status_id` wins over `status`.
    pub fn fms_status(&self) -> Option<u32> {
        self.status_id.or(self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleCrewRequest {
    #[serde(deserialize_with = "record_id")]
    pub vehicle_id: RecordId,
    pub mode: CrewMode,
    #[serde(default, deserialize_with = "id_list")]
    pub crew: Vec<u64>,
}

impl VehicleCrewRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.mode, self.crew.is_empty()) {
            (CrewMode::Add | CrewMode::Remove, true) => Err(CoreError::invalid(format!(
                "crew mode '{}' needs at least one crew member",
                self.mode
            ))),
            (CrewMode::Reset, false) => Err(CoreError::invalid(
                "crew mode 'reset' takes no crew members",
            )),
            _ => Ok(()),
        }
    }

    /// Crew list after applying this change to `current`.
    pub fn apply_to(&self, current: &[u64]) -> Vec<u64> {
        match self.mode {
            CrewMode::Add => {
                let mut crew = current.to_vec();
                for id in &self.crew {
                    if !crew.contains(id) {
                        crew.push(*id);
                    }
                }
                crew
            }
            CrewMode::Remove => current
                .iter()
                .copied()
                .filter(|id| !self.crew.contains(id))
                .collect(),
            CrewMode::Reset => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehiclePropertiesRequest {
    #[serde(deserialize_with = "record_id")]
    pub vehicle_id: RecordId,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl VehiclePropertiesRequest {
    /// Properties are flat scalars; at least one must be given.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.properties.is_empty() {
            return Err(CoreError::invalid("no vehicle properties given"));
        }
        let nested: Vec<&str> = self
            .properties
            .iter()
            .filter(|(_, v)| v.is_array() || v.is_object())
            .map(|(k, _)| k.as_str())
            .collect();
        if nested.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid(format!(
                "vehicle properties must be text or numbers: {}",
                nested.join(", ")
            )))
        }
    }
}

// ── Alarms ──────────────────────────────────────────────────────────

/// Alarm body shared by create and modify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmFields {
    pub title: String,
    pub notification_type: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub group: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub user_cluster_relation: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub vehicle: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub status: Vec<u64>,
    /// Remaining declared optional fields, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AlarmFields {
    pub(crate) fn normalize(&mut self) {
        self.notification_type =
            notification_type(self.notification_type, &self.group, &self.user_cluster_relation);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateAlarmRequest {
    #[serde(deserialize_with = "plain_id")]
    pub cluster_id: u64,
    #[serde(flatten)]
    pub alarm: AlarmFields,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModifyAlarmRequest {
    #[serde(deserialize_with = "record_id")]
    pub alarm_id: RecordId,
    #[serde(flatten)]
    pub alarm: AlarmFields,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CloseAlarmRequest {
    #[serde(deserialize_with = "record_id")]
    pub alarm_id: RecordId,
    /// `false` reopens the alarm.
    #[serde(default = "closed_default")]
    pub closed: bool,
    #[serde(default)]
    pub report: Option<String>,
}

fn closed_default() -> bool {
    true
}

// ── Messages and news ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageRequest {
    #[serde(default, deserialize_with = "opt_record_id")]
    pub message_channel_id: Option<RecordId>,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub alarm_id: Option<RecordId>,
    pub text: String,
}

impl MessageRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.message_channel_id.is_none() && self.alarm_id.is_none() {
            return Err(CoreError::invalid(
                "either message_channel_id or alarm_id must be given",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsFields {
    pub title: String,
    pub notification_type: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub group: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "id_list")]
    pub user_cluster_relation: Vec<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewsFields {
    pub(crate) fn normalize(&mut self) {
        self.notification_type =
            notification_type(self.notification_type, &self.group, &self.user_cluster_relation);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewsRequest {
    #[serde(deserialize_with = "plain_id")]
    pub cluster_id: u64,
    #[serde(flatten)]
    pub news: NewsFields,
}

/// Explicit recipients decide the notification type: 4 for selected
/// users, 3 for groups, otherwise whatever the caller asked for.
fn notification_type(requested: u8, group: &[u64], users: &[u64]) -> u8 {
    if !users.is_empty() {
        4
    } else if !group.is_empty() {
        3
    } else {
        requested
    }
}

// ── Lenient id deserializers ────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

impl IdRepr {
    fn into_ids<E: de::Error>(self) -> Result<Vec<u64>, E> {
        match self {
            Self::Number(n) => Ok(vec![n]),
            Self::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse()
                        .map_err(|_| E::custom(format!("invalid id '{part}'")))
                })
                .collect(),
        }
    }

    fn into_id<E: de::Error>(self) -> Result<u64, E> {
        let ids = self.into_ids::<E>()?;
        match ids.as_slice() {
            [id] => Ok(*id),
            _ => Err(E::custom("expected exactly one id")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdListRepr {
    One(IdRepr),
    Many(Vec<IdRepr>),
}

fn plain_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    IdRepr::deserialize(deserializer)?.into_id()
}

fn record_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RecordId, D::Error> {
    plain_id(deserializer).map(RecordId)
}

fn opt_record_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RecordId>, D::Error> {
    Option::<IdRepr>::deserialize(deserializer)?
        .map(|repr| repr.into_id().map(RecordId))
        .transpose()
}

fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
    match IdListRepr::deserialize(deserializer)? {
        IdListRepr::One(repr) => repr.into_ids(),
        IdListRepr::Many(reprs) => reprs.into_iter().map(IdRepr::into_id).collect(),
    }
}
