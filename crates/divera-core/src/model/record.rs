// ── Typed records ──
//
// Vendor records arrive as loose attribute bags. At the reconciliation
// boundary each one is checked for its required fields and lifted into a
// tagged variant; failures become `MalformedRecord` warnings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::attrs::{self, Attributes};
use super::derived::{AlarmCounter, Calendar, CurrentStatus, Station};
use super::id::RecordId;

// ── RecordKind ──────────────────────────────────────────────────────

/// Kinds of entity-backing records.
///
/// The first five are collections mirrored from a unit snapshot; the rest
/// are single per-unit records derived from the snapshot as a whole.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    Alarm,
    Vehicle,
    MessageChannel,
    Status,
    Event,
    OpenAlarms,
    Unit,
    CurrentStatus,
    Calendar,
}

impl RecordKind {
    pub const COLLECTIONS: [Self; 5] = [
        Self::Alarm,
        Self::Vehicle,
        Self::MessageChannel,
        Self::Status,
        Self::Event,
    ];

    pub const UNIT_SCOPED: [Self; 4] = [Self::OpenAlarms, Self::Unit, Self::CurrentStatus, Self::Calendar];

    /// Fields a record of this kind must carry to be materialized.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Alarm => &["id", "title"],
            Self::Vehicle => &["id", "fmsstatus_id"],
            Self::MessageChannel => &["id"],
            Self::Status => &["id", "name"],
            Self::Event => &["id", "start", "end"],
            Self::OpenAlarms | Self::Unit | Self::CurrentStatus | Self::Calendar => &[],
        }
    }

    /// Unique-id suffix of a per-unit record; `None` for collections.
    pub fn unit_suffix(self) -> Option<&'static str> {
        match self {
            Self::OpenAlarms => Some("open_alarms"),
            Self::Unit => Some("cluster_address"),
            Self::CurrentStatus => Some("status"),
            Self::Calendar => Some("calendar"),
            Self::Alarm | Self::Vehicle | Self::MessageChannel | Self::Status | Self::Event => None,
        }
    }

    pub fn is_unit_scoped(self) -> bool {
        self.unit_suffix().is_some()
    }
}

// ── Variants ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alarm {
    pub id: RecordId,
    pub title: String,
    pub text: Option<String>,
    pub address: Option<String>,
    pub location: Option<(f64, f64)>,
    pub closed: bool,
    pub priority: bool,
    pub message_channel_id: Option<RecordId>,
    pub report: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: RecordId,
    pub name: Option<String>,
    pub shortname: Option<String>,
    /// FMS status (1–9).
    pub status_id: u64,
    pub status_note: Option<String>,
    pub location: Option<(f64, f64)>,
    pub crew: Vec<u64>,
    /// Custom vehicle properties merged in from the property endpoint.
    pub properties: Attributes,
    pub attributes: Attributes,
}

impl Vehicle {
    /// `"shortname / name"`, falling back to whichever part exists.
    pub fn display_name(&self) -> String {
        match (&self.shortname, &self.name) {
            (Some(short), Some(name)) => format!("{short} / {name}"),
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => format!("Vehicle {}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageChannel {
    pub id: RecordId,
    pub title: Option<String>,
    pub alarm_id: Option<RecordId>,
    pub attributes: Attributes,
}

/// One availability status defined by the unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusValue {
    pub id: RecordId,
    pub name: String,
    pub color: Option<String>,
    pub attributes: Attributes,
}

/// A scheduled unit event (drill, meeting). Events with a zero start or end
/// timestamp are malformed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: RecordId,
    pub title: String,
    pub text: Option<String>,
    pub address: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub attributes: Attributes,
}

impl Event {
    /// Whether the event intersects the half-open range `[from, to)`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }
}

/// A validated record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Alarm(Alarm),
    Vehicle(Vehicle),
    MessageChannel(MessageChannel),
    Status(StatusValue),
    Event(Event),
    OpenAlarms(AlarmCounter),
    Unit(Station),
    CurrentStatus(CurrentStatus),
    Calendar(Calendar),
}

impl Record {
    /// Validate required fields and lift an attribute bag into a variant.
    ///
    /// `id` is the collection key; an inner `id` attribute that disagrees
    /// with it counts as missing. Per-unit kinds have no attribute bag of
    /// their own and always fail here; they come from [`derive_unit_records`].
    ///
    /// [`derive_unit_records`]: super::derived::derive_unit_records
    pub fn parse(kind: RecordKind, id: RecordId, attributes: &Attributes) -> Result<Self, MalformedRecord> {
        let missing: Vec<&'static str> = kind
            .required_fields()
            .iter()
            .copied()
            .filter(|field| !has_required(attributes, field, id))
            .collect();
        if !missing.is_empty() {
            return Err(MalformedRecord { kind, id, missing });
        }

        let record = match kind {
            RecordKind::Alarm => Self::Alarm(Alarm {
                id,
                title: attributes
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                text: attrs::text_field(attributes, "text"),
                address: attrs::text_field(attributes, "address"),
                location: attrs::coordinates(attributes),
                // Divera omits `closed` on some archived entries; treat as closed.
                closed: attrs::bool_field(attributes, "closed").unwrap_or(true),
                priority: attrs::bool_field(attributes, "priority").unwrap_or(false),
                message_channel_id: attrs::u64_field(attributes, "message_channel_id")
                    .filter(|v| *v != 0)
                    .map(RecordId),
                report: attrs::text_field(attributes, "report"),
                date: timestamp_field(attributes, "date"),
                attributes: attributes.clone(),
            }),
            RecordKind::Vehicle => Self::Vehicle(Vehicle {
                id,
                name: attrs::text_field(attributes, "name"),
                shortname: attrs::text_field(attributes, "shortname"),
                status_id: attrs::u64_field(attributes, "fmsstatus_id").unwrap_or_default(),
                status_note: attrs::text_field(attributes, "fmsstatus_note"),
                location: attrs::coordinates(attributes),
                crew: crew_ids(attributes.get("crew")),
                properties: attributes
                    .get("properties")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                attributes: attributes.clone(),
            }),
            RecordKind::MessageChannel => Self::MessageChannel(MessageChannel {
                id,
                title: attrs::text_field(attributes, "title")
                    .or_else(|| attrs::text_field(attributes, "name")),
                alarm_id: attrs::u64_field(attributes, "alarm_id")
                    .filter(|v| *v != 0)
                    .map(RecordId),
                attributes: attributes.clone(),
            }),
            RecordKind::Status => Self::Status(StatusValue {
                id,
                name: attributes
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                color: attrs::text_field(attributes, "color_hex")
                    .or_else(|| attrs::text_field(attributes, "color")),
                attributes: attributes.clone(),
            }),
            RecordKind::Event => {
                let (Some(start), Some(end)) =
                    (timestamp_field(attributes, "start"), timestamp_field(attributes, "end"))
                else {
                    return Err(MalformedRecord { kind, id, missing: vec!["start", "end"] });
                };
                Self::Event(Event {
                    id,
                    title: attrs::text_field(attributes, "title")
                        .unwrap_or_else(|| UNTITLED_EVENT.to_owned()),
                    text: attrs::text_field(attributes, "text"),
                    address: attrs::text_field(attributes, "address"),
                    start,
                    end,
                    all_day: attrs::bool_field(attributes, "fullday").unwrap_or(false),
                    attributes: attributes.clone(),
                })
            }
            RecordKind::OpenAlarms | RecordKind::Unit | RecordKind::CurrentStatus | RecordKind::Calendar => {
                return Err(MalformedRecord { kind, id, missing: Vec::new() });
            }
        };
        Ok(record)
    }

    pub fn id(&self) -> RecordId {
        match self {
            Self::Alarm(r) => r.id,
            Self::Vehicle(r) => r.id,
            Self::MessageChannel(r) => r.id,
            Self::Status(r) => r.id,
            Self::Event(r) => r.id,
            Self::OpenAlarms(r) => RecordId(r.unit_id.get()),
            Self::Unit(r) => RecordId(r.unit_id.get()),
            Self::CurrentStatus(r) => RecordId(r.unit_id.get()),
            Self::Calendar(r) => RecordId(r.unit_id.get()),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Alarm(_) => RecordKind::Alarm,
            Self::Vehicle(_) => RecordKind::Vehicle,
            Self::MessageChannel(_) => RecordKind::MessageChannel,
            Self::Status(_) => RecordKind::Status,
            Self::Event(_) => RecordKind::Event,
            Self::OpenAlarms(_) => RecordKind::OpenAlarms,
            Self::Unit(_) => RecordKind::Unit,
            Self::CurrentStatus(_) => RecordKind::CurrentStatus,
            Self::Calendar(_) => RecordKind::Calendar,
        }
    }

    /// The full vendor attribute bag, or the derived attributes of a
    /// per-unit record.
    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Alarm(r) => &r.attributes,
            Self::Vehicle(r) => &r.attributes,
            Self::MessageChannel(r) => &r.attributes,
            Self::Status(r) => &r.attributes,
            Self::Event(r) => &r.attributes,
            Self::OpenAlarms(r) => &r.attributes,
            Self::Unit(r) => &r.attributes,
            Self::CurrentStatus(r) => &r.attributes,
            Self::Calendar(r) => &r.attributes,
        }
    }
}

fn has_required(attributes: &Attributes, field: &str, id: RecordId) -> bool {
    match field {
        "id" => attrs::u64_field(attributes, "id") == Some(id.get()),
        "fmsstatus_id" => attrs::u64_field(attributes, field).is_some(),
        "start" | "end" => timestamp_field(attributes, field).is_some(),
        _ => attributes.get(field).is_some_and(Value::is_string),
    }
}

const UNTITLED_EVENT: &str = "Kein Titel";

/// Unix seconds; zero means unset.
fn timestamp_field(attributes: &Attributes, key: &str) -> Option<DateTime<Utc>> {
    attrs::u64_field(attributes, key)
        .filter(|secs| *secs != 0)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Crew entries are either bare user ids or objects with an `id`.
pub(crate) fn crew_ids(value: Option<&Value>) -> Vec<u64> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => map.get("id").and_then(attrs::as_u64),
            other => attrs::as_u64(other),
        })
        .collect()
}

// ── MalformedRecord ─────────────────────────────────────────────────

/// Data-quality warning: a record lacked required fields and was skipped.
///
/// Not an error; the record still counts as present in its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    pub kind: RecordKind,
    pub id: RecordId,
    pub missing: Vec<&'static str>,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is missing required field(s): {}",
            self.kind,
            self.id,
            self.missing.join(", ")
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn vehicle_parses_status_and_crew() {
        let attrs = bag(json!({
            "id": 123456, "name": "HLF 20", "shortname": "HLF",
            "fmsstatus_id": "2", "lat": 52.0, "lng": 13.0,
            "crew": [{"id": 5}, 6]
        }));
        let Record::Vehicle(v) = Record::parse(RecordKind::Vehicle, RecordId(123_456), &attrs).unwrap() else {
            panic!("expected vehicle");
        };
        assert_eq!(v.status_id, 2);
        assert_eq!(v.crew, vec![5, 6]);
        assert_eq!(v.display_name(), "HLF / HLF 20");
        assert_eq!(v.location, Some((52.0, 13.0)));
    }

    #[test]
    fn vehicle_without_status_is_malformed() {
        let attrs = bag(json!({"id": 9, "name": "MTW"}));
        let err = Record::parse(RecordKind::Vehicle, RecordId(9), &attrs).unwrap_err();
        assert_eq!(err.missing, vec!["fmsstatus_id"]);
        assert_eq!(err.to_string(), "vehicle 9 is missing required field(s): fmsstatus_id");
    }

    #[test]
    fn mismatched_inner_id_counts_as_missing() {
        let attrs = bag(json!({"id": 2, "title": "Brand"}));
        let err = Record::parse(RecordKind::Alarm, RecordId(1), &attrs).unwrap_err();
        assert_eq!(err.missing, vec!["id"]);
    }

    #[test]
    fn alarm_defaults() {
        let attrs = bag(json!({"id": 1, "title": "Brand", "priority": 1, "message_channel_id": 0}));
        let Record::Alarm(a) = Record::parse(RecordKind::Alarm, RecordId(1), &attrs).unwrap() else {
            panic!("expected alarm");
        };
        assert!(a.closed);
        assert!(a.priority);
        assert_eq!(a.message_channel_id, None);
    }

    #[test]
    fn record_kind_round_trips_through_strings() {
        assert_eq!(RecordKind::MessageChannel.to_string(), "message_channel");
        assert_eq!("status".parse::<RecordKind>().unwrap(), RecordKind::Status);
        assert_eq!("open_alarms".parse::<RecordKind>().unwrap(), RecordKind::OpenAlarms);
    }

    #[test]
    fn event_parses_times_and_defaults_title() {
        let attrs = bag(json!({
            "id": 4, "start": 1_700_000_000, "end": 1_700_007_200,
            "address": "Gerätehaus", "fullday": true
        }));
        let Record::Event(e) = Record::parse(RecordKind::Event, RecordId(4), &attrs).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(e.title, "Kein Titel");
        assert_eq!(e.start.timestamp(), 1_700_000_000);
        assert_eq!((e.end - e.start).num_hours(), 2);
        assert!(e.all_day);
        assert_eq!(e.address.as_deref(), Some("Gerätehaus"));
    }

    #[test]
    fn event_with_zero_timestamp_is_malformed() {
        let attrs = bag(json!({"id": 4, "title": "Übung", "start": 0, "end": 1_700_007_200}));
        let err = Record::parse(RecordKind::Event, RecordId(4), &attrs).unwrap_err();
        assert_eq!(err.missing, vec!["start"]);
    }

    #[test]
    fn per_unit_kinds_are_never_parsed() {
        let attrs = bag(json!({"id": 1}));
        for kind in RecordKind::UNIT_SCOPED {
            assert!(Record::parse(kind, RecordId(1), &attrs).is_err());
            assert!(kind.required_fields().is_empty());
        }
    }
}
