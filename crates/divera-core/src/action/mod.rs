// ── Action handlers ──
//
// Outbound writes against one unit. Every action is validated, checked
// against the polled permission table, sent, and, when it changes an
// existing record, patched into the published snapshot right away. Create
// actions leave local state alone; the next poll brings the new record.

mod requests;
mod schema;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{EntityKey, Permission, RecordId, RecordKind, Snapshot, as_u64, crew_ids};
use crate::session::UnitSession;
use crate::store::ChangeSet;

pub use requests::{
    AlarmFields, CloseAlarmRequest, CreateAlarmRequest, MessageRequest, ModifyAlarmRequest,
    NewsFields, NewsRequest, VehicleCrewRequest, VehiclePropertiesRequest, VehicleStatusRequest,
};
pub use schema::{ActionKind, ActionSchema};

/// A validated action call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetVehicleStatus(VehicleStatusRequest),
    SetVehicleCrew(VehicleCrewRequest),
    SetVehicleProperties(VehiclePropertiesRequest),
    CreateAlarm(CreateAlarmRequest),
    ModifyAlarm(ModifyAlarmRequest),
    CloseAlarm(CloseAlarmRequest),
    SendMessage(MessageRequest),
    CreateNews(NewsRequest),
}

/// What an accepted action did to local state.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The target record was patched in place.
    Patched {
        key: EntityKey,
        changes: Arc<ChangeSet>,
    },
    /// A new record was created server-side; it appears after the next poll.
    AwaitingPoll { response: Value },
}

impl Action {
    /// Build an action from a named call with free-form data.
    ///
    /// `null` values are dropped first, then the schema is checked, then
    /// the data is deserialized and semantic rules are applied.
    pub fn from_call(name: &str, data: Value) -> Result<Self, CoreError> {
        let kind: ActionKind = name
            .parse()
            .map_err(|_| CoreError::invalid(format!("unknown action '{name}'")))?;
        let Value::Object(mut data) = data else {
            return Err(CoreError::invalid(format!("{kind}: call data must be an object")));
        };
        data.retain(|_, v| !v.is_null());
        kind.schema().validate(&data)?;

        let data = Value::Object(data);
        let action = match kind {
            ActionKind::SetVehicleStatus => Self::SetVehicleStatus(decode(kind, data)?),
            ActionKind::SetVehicleCrew => Self::SetVehicleCrew(decode(kind, data)?),
            ActionKind::SetVehicleProperties => Self::SetVehicleProperties(decode(kind, data)?),
            ActionKind::CreateAlarm => Self::CreateAlarm(decode(kind, data)?),
            ActionKind::ModifyAlarm => Self::ModifyAlarm(decode(kind, data)?),
            ActionKind::CloseAlarm => Self::CloseAlarm(decode(kind, data)?),
            ActionKind::SendMessage => Self::SendMessage(decode(kind, data)?),
            ActionKind::CreateNews => Self::CreateNews(decode(kind, data)?),
        };
        action.validate()?;
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SetVehicleStatus(_) => ActionKind::SetVehicleStatus,
            Self::SetVehicleCrew(_) => ActionKind::SetVehicleCrew,
            Self::SetVehicleProperties(_) => ActionKind::SetVehicleProperties,
            Self::CreateAlarm(_) => ActionKind::CreateAlarm,
            Self::ModifyAlarm(_) => ActionKind::ModifyAlarm,
            Self::CloseAlarm(_) => ActionKind::CloseAlarm,
            Self::SendMessage(_) => ActionKind::SendMessage,
            Self::CreateNews(_) => ActionKind::CreateNews,
        }
    }

    pub fn required_permission(&self) -> Permission {
        match self {
            Self::SetVehicleStatus(_)
            | Self::SetVehicleCrew(_)
            | Self::SetVehicleProperties(_) => Permission::StatusVehicle,
            Self::CreateAlarm(_) | Self::ModifyAlarm(_) | Self::CloseAlarm(_) => Permission::Alarm,
            Self::SendMessage(_) => Permission::Messages,
            Self::CreateNews(_) => Permission::News,
        }
    }

    /// The existing record this action modifies, if any.
    pub fn target(&self) -> Option<EntityKey> {
        match self {
            Self::SetVehicleStatus(r) => Some(EntityKey::new(RecordKind::Vehicle, r.vehicle_id)),
            Self::SetVehicleCrew(r) => Some(EntityKey::new(RecordKind::Vehicle, r.vehicle_id)),
            Self::SetVehicleProperties(r) => {
                Some(EntityKey::new(RecordKind::Vehicle, r.vehicle_id))
            }
            Self::ModifyAlarm(r) => Some(EntityKey::new(RecordKind::Alarm, r.alarm_id)),
            Self::CloseAlarm(r) => Some(EntityKey::new(RecordKind::Alarm, r.alarm_id)),
            Self::CreateAlarm(_) | Self::SendMessage(_) | Self::CreateNews(_) => None,
        }
    }

    /// Rules the field schema cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::SetVehicleCrew(r) => r.validate(),
            Self::SetVehicleProperties(r) => r.validate(),
            Self::SendMessage(r) => r.validate(),
            _ => Ok(()),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: ActionKind, data: Value) -> Result<T, CoreError> {
    serde_json::from_value(data).map_err(|e| CoreError::invalid(format!("{kind}: {e}")))
}

// ── Execution ───────────────────────────────────────────────────────

/// Run `action` against `session`.
///
/// Validation, permission and existence checks happen before any request
/// is sent. Errors never change unit health; only polling does that.
pub async fn execute(session: &UnitSession, mut action: Action) -> Result<ActionOutcome, CoreError> {
    let unit = session.unit_id();
    action.validate()?;

    let snapshot = session
        .snapshot()
        .ok_or_else(|| CoreError::invalid(format!("unit {unit} has not been polled yet")))?;

    let permission = action.required_permission();
    if !snapshot.permissions().allows(permission) {
        return Err(CoreError::PermissionDenied {
            permission: permission.to_string(),
            unit,
        });
    }
    if let Some(key) = action.target() {
        if snapshot.record(key.kind, key.id).is_none() {
            return Err(CoreError::RecordNotFound {
                kind: key.kind,
                id: key.id,
                unit,
            });
        }
    }

    let client = session.client();
    let kind = action.kind();
    debug!(unit = %unit, action = %kind, "executing action");

    match &mut action {
        Action::SetVehicleStatus(r) => {
            client.set_vehicle_status(r.vehicle_id.get(), &r.to_update()).await?;
        }
        Action::SetVehicleCrew(r) => {
            client
                .update_vehicle_crew(r.vehicle_id.get(), r.mode, &r.crew)
                .await?;
        }
        Action::SetVehicleProperties(r) => {
            client
                .set_vehicle_properties(r.vehicle_id.get(), &r.properties)
                .await?;
        }
        Action::ModifyAlarm(r) => {
            r.alarm.normalize();
            client.update_alarm(r.alarm_id.get(), &r.alarm).await?;
        }
        Action::CloseAlarm(r) => {
            client
                .close_alarm(r.alarm_id.get(), r.closed, r.report.as_deref())
                .await?;
        }
        Action::CreateAlarm(r) => {
            check_cluster(&snapshot, r.cluster_id)?;
            r.alarm.normalize();
            let response = client.create_alarm(&r.alarm).await?;
            info!(unit = %unit, title = %r.alarm.title, "alarm created");
            return Ok(ActionOutcome::AwaitingPoll { response });
        }
        Action::SendMessage(r) => {
            let channel = resolve_channel(&snapshot, r)?;
            let response = client.send_message(channel.get(), &r.text).await?;
            return Ok(ActionOutcome::AwaitingPoll { response });
        }
        Action::CreateNews(r) => {
            check_cluster(&snapshot, r.cluster_id)?;
            r.news.normalize();
            let response = client.create_news(&r.news).await?;
            info!(unit = %unit, title = %r.news.title, "news created");
            return Ok(ActionOutcome::AwaitingPoll { response });
        }
    }

    let key = action
        .target()
        .ok_or_else(|| CoreError::invalid(format!("{kind} has no target record")))?;
    let changes = session.patch(|snapshot| patch_snapshot(snapshot, &action)).await?;
    debug!(unit = %unit, action = %kind, target = %key, "snapshot patched");
    Ok(ActionOutcome::Patched { key, changes })
}

/// `cluster_id` may name the unit by its cluster id or by the UCR id.
fn check_cluster(snapshot: &Snapshot, cluster_id: u64) -> Result<(), CoreError> {
    let unit = snapshot.unit();
    if cluster_id == unit.id.get() || unit.cluster_id.is_none_or(|c| c == cluster_id) {
        Ok(())
    } else {
        Err(CoreError::invalid(format!(
            "cluster_id {cluster_id} does not belong to unit {}",
            unit.id
        )))
    }
}

/// Explicit channel id, else the channel of the given alarm. The channel
/// must be visible to this account.
fn resolve_channel(snapshot: &Snapshot, request: &MessageRequest) -> Result<RecordId, CoreError> {
    let channel = match (request.message_channel_id, request.alarm_id) {
        (Some(channel), _) => channel,
        (None, Some(alarm)) => snapshot
            .record(RecordKind::Alarm, alarm)
            .and_then(|a| a.get("message_channel_id"))
            .and_then(as_u64)
            .filter(|id| *id != 0)
            .map(RecordId)
            .ok_or_else(|| CoreError::invalid(format!("no message channel found for alarm {alarm}")))?,
        (None, None) => {
            return Err(CoreError::invalid(
                "either message_channel_id or alarm_id must be given",
            ));
        }
    };
    if snapshot.record(RecordKind::MessageChannel, channel).is_none() {
        return Err(CoreError::RecordNotFound {
            kind: RecordKind::MessageChannel,
            id: channel,
            unit: snapshot.unit_id(),
        });
    }
    Ok(channel)
}

// ── Patches ─────────────────────────────────────────────────────────

/// Apply an accepted action to a snapshot copy.
fn patch_snapshot(snapshot: &mut Snapshot, action: &Action) -> Result<(), CoreError> {
    let Some(key) = action.target() else {
        return Ok(());
    };
    let unit = snapshot.unit_id();
    let record = snapshot
        .records_mut(key.kind)
        .and_then(|set| set.get_mut(&key.id))
        .ok_or(CoreError::RecordNotFound {
            kind: key.kind,
            id: key.id,
            unit,
        })?;

    match action {
        Action::SetVehicleStatus(r) => {
            if let Some(status) = r.fms_status() {
                record.insert("fmsstatus_id".into(), status.into());
            }
            if let Some(note) = &r.status_note {
                record.insert("fmsstatus_note".into(), note.clone().into());
            }
            if let Some(lat) = r.lat {
                record.insert("lat".into(), lat.into());
            }
            if let Some(lng) = r.lng {
                record.insert("lng".into(), lng.into());
            }
        }
        Action::SetVehicleCrew(r) => {
            let crew = r.apply_to(&crew_ids(record.get("crew")));
            record.insert("crew".into(), crew.into());
        }
        Action::SetVehicleProperties(r) => {
            let slot = record
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(properties) = slot {
                for (k, v) in &r.properties {
                    properties.insert(k.clone(), v.clone());
                }
            }
        }
        Action::ModifyAlarm(r) => {
            let fields = serde_json::to_value(&r.alarm)
                .map_err(|e| CoreError::invalid(format!("{}: {e}", action.kind())))?;
            if let Value::Object(fields) = fields {
                for (k, v) in fields {
                    if record.contains_key(&k) && !ActionKind::is_send_flag(&k) {
                        record.insert(k, v);
                    }
                }
            }
        }
        Action::CloseAlarm(r) => {
            record.insert("closed".into(), r.closed.into());
            if let Some(report) = &r.report {
                record.insert("report".into(), report.clone().into());
            }
        }
        Action::CreateAlarm(_) | Action::SendMessage(_) | Action::CreateNews(_) => {}
    }
    Ok(())
}
