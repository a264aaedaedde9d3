//! Alarm, vehicle, message, news and generic action handlers.
//!
//! Every command is turned into an action name plus JSON data and runs
//! through the same validation as any other host's calls.

use serde::Serialize;
use serde_json::{Map, Value};

use divera_core::{Action, ActionKind, ActionOutcome, CoreError, EntityKey, Hub, UnitId};

use crate::cli::{
    AlarmArgs, AlarmCommand, AlarmFieldArgs, CallArgs, GlobalOpts, MessageArgs, NewsArgs,
    VehicleArgs, VehicleCommand,
};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Request building ────────────────────────────────────────────────

/// An action call waiting for a hub.
struct Call {
    unit: Option<u64>,
    kind: ActionKind,
    data: Map<String, Value>,
}

impl Call {
    fn new(unit: Option<u64>, kind: ActionKind) -> Self {
        Self {
            unit,
            kind,
            data: Map::new(),
        }
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    /// Omits empty id lists so optional targeting stays unset.
    fn set_ids(self, key: &str, ids: Vec<u64>) -> Self {
        if ids.is_empty() { self } else { self.set(key, ids) }
    }
}

fn alarm_fields(call: Call, fields: AlarmFieldArgs) -> Call {
    let call = call
        .set("title", fields.title)
        .set("notification_type", fields.notification_type)
        .set("text", fields.text)
        .set("address", fields.address)
        .set_ids("group", fields.group)
        .set_ids("user_cluster_relation", fields.user_cluster_relation)
        .set_ids("vehicle", fields.vehicle);
    if fields.priority {
        call.set("priority", true)
    } else {
        call
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn alarm(args: AlarmArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call = match args.command {
        AlarmCommand::Create {
            unit,
            cluster_id,
            fields,
        } => alarm_fields(
            Call::new(unit.unit, ActionKind::CreateAlarm).set("cluster_id", cluster_id),
            fields,
        ),
        AlarmCommand::Modify { unit, id, fields } => alarm_fields(
            Call::new(unit.unit, ActionKind::ModifyAlarm).set("alarm_id", id),
            fields,
        ),
        AlarmCommand::Close {
            unit,
            id,
            reopen,
            report,
        } => Call::new(unit.unit, ActionKind::CloseAlarm)
            .set("alarm_id", id)
            .set("closed", !reopen)
            .set("report", report),
    };
    run(call, global).await
}

pub async fn vehicle(args: VehicleArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call = match args.command {
        VehicleCommand::Status {
            unit,
            id,
            status,
            status_id,
            note,
            lat,
            lng,
        } => Call::new(unit.unit, ActionKind::SetVehicleStatus)
            .set("vehicle_id", id)
            .set("status", status)
            .set("status_id", status_id)
            .set("status_note", note)
            .set("lat", lat)
            .set("lng", lng),
        VehicleCommand::Crew {
            unit,
            id,
            mode,
            crew,
        } => Call::new(unit.unit, ActionKind::SetVehicleCrew)
            .set("vehicle_id", id)
            .set("mode", mode.to_string())
            .set("crew", crew),
        VehicleCommand::Property {
            unit,
            id,
            properties,
        } => {
            let mut call = Call::new(unit.unit, ActionKind::SetVehicleProperties).set("vehicle_id", id);
            for raw in &properties {
                let (key, value) = util::parse_property(raw)?;
                call = call.set(&key, value);
            }
            call
        }
    };
    run(call, global).await
}

pub async fn message(args: MessageArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call = Call::new(args.unit.unit, ActionKind::SendMessage)
        .set("text", args.text)
        .set("message_channel_id", args.channel)
        .set("alarm_id", args.alarm);
    run(call, global).await
}

pub async fn news(args: NewsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let call = Call::new(args.unit.unit, ActionKind::CreateNews)
        .set("cluster_id", args.cluster_id)
        .set("title", args.title)
        .set("text", args.text)
        .set("notification_type", args.notification_type)
        .set_ids("group", args.group);
    run(call, global).await
}

pub async fn call(args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let data = match (args.data, args.file) {
        (Some(raw), _) => util::parse_object(&raw)?,
        (None, Some(path)) => util::read_object_file(&path)?,
        (None, None) => Map::new(),
    };
    let call = Call {
        unit: args.unit.unit,
        kind: args.action,
        data,
    };
    run(call, global).await
}

// ── Execution ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OutcomeView {
    unit_id: UnitId,
    action: &'static str,
    result: &'static str,
    entity: Option<EntityKey>,
    response: Option<Value>,
}

impl OutcomeView {
    fn new(unit_id: UnitId, action: &'static str, outcome: ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Patched { key, .. } => Self {
                unit_id,
                action,
                result: "patched",
                entity: Some(key),
                response: None,
            },
            ActionOutcome::AwaitingPoll { response } => Self {
                unit_id,
                action,
                result: "awaiting_poll",
                entity: None,
                response: Some(response),
            },
        }
    }

    fn describe(&self) -> String {
        match self.entity {
            Some(key) => format!("{} applied to unit {}; {key} updated", self.action, self.unit_id),
            None => format!(
                "{} sent to unit {}; it appears with the next poll",
                self.action, self.unit_id
            ),
        }
    }
}

/// Validate locally, then set the profile's units up and execute.
async fn run(call: Call, global: &GlobalOpts) -> Result<(), CliError> {
    let Call {
        unit: explicit,
        kind,
        data,
    } = call;
    let name: &'static str = kind.into();

    // Catch field errors before any request is made; creates without a
    // cluster are completed from the unit's snapshot first.
    let ready = if needs_cluster(kind, &data) {
        None
    } else {
        Some(Action::from_call(name, Value::Object(data.clone()))?)
    };

    let (_, configs) = config::unit_configs(global)?;
    let (unit, outcome) = Hub::oneshot(configs, |hub| async move {
        let (unit, action) = match ready {
            Some(action) => (util::resolve_unit(&hub, explicit, action.target())?, action),
            None => {
                let unit = util::resolve_unit(&hub, explicit, None)?;
                (unit, with_cluster(&hub, unit, name, data)?)
            }
        };
        let outcome = hub.execute(unit, action).await?;
        Ok::<_, CoreError>((unit, outcome))
    })
    .await?;

    let view = OutcomeView::new(unit, name, outcome);
    let out = output::render_single(
        &global.output,
        &view,
        OutcomeView::describe,
        |v| v.entity.map(|k| k.to_string()).unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn needs_cluster(kind: ActionKind, data: &Map<String, Value>) -> bool {
    matches!(kind, ActionKind::CreateAlarm | ActionKind::CreateNews)
        && data.get("cluster_id").is_none_or(Value::is_null)
}

/// Fill `cluster_id` from the unit's snapshot.
fn with_cluster(
    hub: &Hub,
    unit: UnitId,
    name: &str,
    mut data: Map<String, Value>,
) -> Result<Action, CoreError> {
    let snapshot = hub
        .session(unit)?
        .snapshot()
        .ok_or_else(|| CoreError::invalid(format!("unit {unit} has not been polled yet")))?;
    let cluster = snapshot.unit().cluster_id.unwrap_or_else(|| unit.get());
    data.insert("cluster_id".into(), Value::from(cluster));
    Action::from_call(name, Value::Object(data))
}
