// ── Per-unit records ──
//
// Records that describe a unit as a whole rather than one vendor item: the
// open-alarm counter, the station, the account's own status and the event
// calendar. They are recomputed from every published snapshot, so a local
// patch (closing an alarm) moves the counter without waiting for a poll.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use super::attrs::Attributes;
use super::id::{RecordId, UnitId};
use super::record::{Event, Record, RecordKind, StatusValue};
use super::snapshot::Snapshot;

const UNKNOWN_STATUS: &str = "Unknown";

/// Number of open alarms of the unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmCounter {
    pub unit_id: UnitId,
    pub count: usize,
    pub attributes: Attributes,
}

/// The unit's station (firehouse) with its address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub unit_id: UnitId,
    pub name: String,
    pub shortname: Option<String>,
    pub address: Option<String>,
    pub location: Option<(f64, f64)>,
    pub attributes: Attributes,
}

/// The polling account's own availability status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentStatus {
    pub unit_id: UnitId,
    pub unit_name: String,
    pub status_id: Option<RecordId>,
    /// Name of `status_id` in the unit's status list.
    pub name: Option<String>,
    /// `"name (id)"` for every status the unit defines.
    pub options: Vec<String>,
    pub attributes: Attributes,
}

/// All valid events of the unit, ordered by start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calendar {
    pub unit_id: UnitId,
    pub name: String,
    pub events: Vec<Event>,
    /// Snapshot time the calendar state refers to.
    pub as_of: DateTime<Utc>,
    pub attributes: Attributes,
}

impl Calendar {
    /// The running or next upcoming event at `now`. Finished events never
    /// qualify.
    pub fn next_event(&self, now: DateTime<Utc>) -> Option<&Event> {
        self.events.iter().find(|e| e.end > now)
    }

    /// Events intersecting `[from, to)`.
    pub fn events_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<&Event> {
        self.events.iter().filter(|e| e.overlaps(from, to)).collect()
    }

    /// Whether an event is running at the snapshot time.
    pub fn is_active(&self) -> bool {
        self.next_event(self.as_of).is_some_and(|e| e.start <= self.as_of)
    }
}

/// Every per-unit record `snapshot` yields. The current status is left out
/// for account kinds that never receive status data.
pub fn derive_unit_records(snapshot: &Snapshot) -> Vec<Record> {
    let mut records = vec![
        Record::OpenAlarms(alarm_counter(snapshot)),
        Record::Unit(station(snapshot)),
    ];
    if snapshot.account().receives_status() {
        records.push(Record::CurrentStatus(current_status(snapshot)));
    }
    records.push(Record::Calendar(calendar(snapshot)));
    records
}

fn alarm_counter(snapshot: &Snapshot) -> AlarmCounter {
    AlarmCounter {
        unit_id: snapshot.unit_id(),
        count: snapshot.open_alarm_count(),
        attributes: Attributes::new(),
    }
}

fn station(snapshot: &Snapshot) -> Station {
    let unit = snapshot.unit();
    let (latitude, longitude) = unit.location.unzip();
    Station {
        unit_id: unit.id,
        name: unit.name.clone(),
        shortname: unit.shortname.clone(),
        address: unit.address.clone(),
        location: unit.location,
        attributes: object(json!({
            "ucr_id": unit.id,
            "cluster_id": unit.cluster_id,
            "shortname": unit.shortname,
            "address": unit.address,
            "latitude": latitude,
            "longitude": longitude,
        })),
    }
}

fn current_status(snapshot: &Snapshot) -> CurrentStatus {
    let statuses: Vec<StatusValue> = snapshot
        .records(RecordKind::Status)
        .iter()
        .filter_map(|(&id, attrs)| match Record::parse(RecordKind::Status, id, attrs) {
            Ok(Record::Status(s)) => Some(s),
            _ => None,
        })
        .collect();
    let status_id = snapshot.current_status();
    let name = status_id.and_then(|id| statuses.iter().find(|s| s.id == id).map(|s| s.name.clone()));
    let options: Vec<String> = statuses.iter().map(|s| format!("{} ({})", s.name, s.id)).collect();

    CurrentStatus {
        unit_id: snapshot.unit_id(),
        unit_name: snapshot.unit().name.clone(),
        status_id,
        attributes: object(json!({
            "status_id": status_id,
            "options": options,
        })),
        name,
        options,
    }
}

fn calendar(snapshot: &Snapshot) -> Calendar {
    let mut events: Vec<Event> = snapshot
        .records(RecordKind::Event)
        .iter()
        .filter_map(|(&id, attrs)| match Record::parse(RecordKind::Event, id, attrs) {
            Ok(Record::Event(e)) => Some(e),
            _ => None,
        })
        .collect();
    events.sort_by_key(|e| (e.start, e.id));

    let as_of = snapshot.fetched_at();
    let attributes = match events.iter().find(|e| e.end > as_of) {
        Some(next) => object(json!({
            "message": next.title,
            "description": next.text,
            "location": next.address,
            "start_time": next.start.to_rfc3339(),
            "end_time": next.end.to_rfc3339(),
            "all_day": next.all_day,
        })),
        None => Attributes::new(),
    };

    Calendar {
        unit_id: snapshot.unit_id(),
        name: snapshot.unit().name.clone(),
        events,
        as_of,
        attributes,
    }
}

impl CurrentStatus {
    /// The status name, or `"Unknown"` when the account has none set.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_STATUS)
    }
}

fn object(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}
