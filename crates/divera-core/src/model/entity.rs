// ── Entities ──
//
// Local materialization of one record. An entity exists for every valid
// record of the latest snapshot, plus one per per-unit record, and carries a
// stable unique id so hosts can keep their own registries in sync.

use std::fmt;

use serde::Serialize;

use super::attrs::Attributes;
use super::id::{RecordId, UnitId};
use super::record::{Record, RecordKind};

const ICON_OPEN_ALARM: &str = "mdi:alarm-light-outline";
const ICON_OPEN_ALARM_NOPRIO: &str = "mdi:alarm-light-off-outline";
const ICON_CLOSED_ALARM: &str = "mdi:check-circle-outline";
const ICON_VEHICLE: &str = "mdi:fire-truck";
const ICON_MESSAGE_CHANNEL: &str = "mdi:message-text-outline";
const ICON_STATUS: &str = "mdi:run-fast";
const ICON_EVENT: &str = "mdi:calendar-clock";
const ICON_COUNTER: &str = "mdi:counter";
const ICON_STATION: &str = "mdi:fire-station";
const ICON_CALENDAR: &str = "mdi:calendar";

/// Identity of an entity within its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub kind: RecordKind,
    pub id: RecordId,
}

impl EntityKey {
    pub fn new(kind: RecordKind, id: RecordId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// `"{unit}_{kind}_{id}"` for collection records, `"{unit}_{suffix}"`
    /// for per-unit records. Stable across restarts.
    pub unique_id: String,
    pub unit_id: UnitId,
    pub record: Record,
}

impl Entity {
    pub fn new(unit_id: UnitId, record: Record) -> Self {
        let unique_id = match record.kind().unit_suffix() {
            Some(suffix) => format!("{unit_id}_{suffix}"),
            None => format!("{unit_id}_{}_{}", record.kind(), record.id()),
        };
        Self {
            unique_id,
            unit_id,
            record,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.record.kind(), self.record.id())
    }

    pub fn name(&self) -> String {
        match &self.record {
            Record::Alarm(a) => format!("Alarm {}", a.id),
            Record::Vehicle(v) => v.display_name(),
            Record::MessageChannel(c) => c
                .title
                .clone()
                .unwrap_or_else(|| format!("Message channel {}", c.id)),
            Record::Status(s) => s.name.clone(),
            Record::Event(e) => e.title.clone(),
            Record::OpenAlarms(c) => format!("Open Alarms {}", c.unit_id),
            Record::Unit(s) => s.name.clone(),
            Record::CurrentStatus(s) => format!("Status {}", s.unit_name),
            Record::Calendar(c) => c.name.clone(),
        }
    }

    /// Primary state value shown by hosts.
    pub fn state(&self) -> String {
        match &self.record {
            Record::Alarm(a) => a.title.clone(),
            Record::Vehicle(v) => v.status_id.to_string(),
            Record::MessageChannel(c) => c.title.clone().unwrap_or_default(),
            Record::Status(s) => s.name.clone(),
            Record::Event(e) => e.start.to_rfc3339(),
            Record::OpenAlarms(c) => c.count.to_string(),
            Record::Unit(s) => s.unit_id.to_string(),
            Record::CurrentStatus(s) => s.display_name().to_owned(),
            Record::Calendar(c) => String::from(if c.is_active() { "on" } else { "off" }),
        }
    }

    pub fn icon(&self) -> &'static str {
        match &self.record {
            Record::Alarm(a) if a.closed => ICON_CLOSED_ALARM,
            Record::Alarm(a) if a.priority => ICON_OPEN_ALARM,
            Record::Alarm(_) => ICON_OPEN_ALARM_NOPRIO,
            Record::Vehicle(_) => ICON_VEHICLE,
            Record::MessageChannel(_) => ICON_MESSAGE_CHANNEL,
            Record::Status(_) | Record::CurrentStatus(_) => ICON_STATUS,
            Record::Event(_) => ICON_EVENT,
            Record::OpenAlarms(_) => ICON_COUNTER,
            Record::Unit(_) => ICON_STATION,
            Record::Calendar(_) => ICON_CALENDAR,
        }
    }

    /// Position for tracker-capable entities (alarms, vehicles, the station).
    pub fn location(&self) -> Option<(f64, f64)> {
        match &self.record {
            Record::Alarm(a) => a.location,
            Record::Vehicle(v) => v.location,
            Record::Unit(s) => s.location,
            Record::MessageChannel(_)
            | Record::Status(_)
            | Record::Event(_)
            | Record::OpenAlarms(_)
            | Record::CurrentStatus(_)
            | Record::Calendar(_) => None,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        self.record.attributes()
    }
}
