// ── Unit snapshots ──
//
// One `pull/all` payload, split into the record collections plus the
// unit-level facts the reconciler and the action handlers need. A
// published snapshot is never mutated; patches clone it first.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tracing::warn;

use super::attrs::{self, Attributes};
use super::id::{RecordId, UnitId};
use super::record::RecordKind;
use crate::error::CoreError;

/// Records of one kind, keyed by vendor id.
pub type RecordSet = BTreeMap<RecordId, Attributes>;

/// What per-unit kinds hold as a collection.
static NO_RECORDS: RecordSet = BTreeMap::new();

// ── Account kind ────────────────────────────────────────────────────

/// What kind of Divera account polls this unit (`ucr.{id}.usergroup_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// 4: personal user account.
    Standard,
    /// 5: alarm monitor.
    Monitor,
    /// 8: unit system user (shared API key).
    System,
    /// 19: vehicle account.
    Vehicle,
    Other(u64),
    Unknown,
}

impl AccountKind {
    pub fn from_usergroup(usergroup_id: Option<u64>) -> Self {
        match usergroup_id {
            Some(4) => Self::Standard,
            Some(5) => Self::Monitor,
            Some(8) => Self::System,
            Some(19) => Self::Vehicle,
            Some(other) => Self::Other(other),
            None => Self::Unknown,
        }
    }

    /// Personal availability statuses only exist for person accounts.
    pub fn receives_status(self) -> bool {
        !matches!(self, Self::Monitor | Self::System | Self::Vehicle)
    }
}

// ── Permissions ─────────────────────────────────────────────────────

/// Permissions checked before outbound actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    Alarm,
    Messages,
    News,
    StatusVehicle,
    Management,
}

/// `user.access` table of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, bool>);

impl Permissions {
    pub fn from_access(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };
        Self(
            map.iter()
                .filter_map(|(k, v)| attrs::as_bool(v).map(|b| (k.clone(), b)))
                .collect(),
        )
    }

    /// `management` grants everything. An empty table (system users carry
    /// none) defers the decision to the server.
    pub fn allows(&self, permission: Permission) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let granted = |name: &str| self.0.get(name).copied().unwrap_or(false);
        granted(Permission::Management.as_ref()) || granted(permission.as_ref())
    }
}

// ── Unit ────────────────────────────────────────────────────────────

/// The unit (cluster) a snapshot belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub cluster_id: Option<u64>,
    pub name: String,
    pub shortname: Option<String>,
    pub address: Option<String>,
    pub location: Option<(f64, f64)>,
    pub vehicle_ids: Vec<RecordId>,
    pub alarm_ids: Vec<RecordId>,
}

// ── Snapshot ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    unit: Unit,
    fetched_at: DateTime<Utc>,
    account: AccountKind,
    permissions: Permissions,
    current_status: Option<RecordId>,
    alarms: RecordSet,
    vehicles: RecordSet,
    message_channels: RecordSet,
    statuses: RecordSet,
    events: RecordSet,
    #[serde(skip)]
    raw: Arc<Value>,
}

impl Snapshot {
    /// Split a `pull/all` `data` object into collections.
    pub fn from_payload(unit_id: UnitId, data: Value, fetched_at: DateTime<Utc>) -> Result<Self, CoreError> {
        if !data.is_object() {
            return Err(CoreError::MalformedPayload {
                message: format!("unit {unit_id}: pull/all data is not an object"),
            });
        }

        let alarms = parse_collection(RecordKind::Alarm, data.pointer("/alarm/items"));
        let vehicles = parse_collection(RecordKind::Vehicle, data.pointer("/cluster/vehicle"));
        let message_channels =
            parse_collection(RecordKind::MessageChannel, data.pointer("/message_channel/items"));
        let statuses = parse_collection(RecordKind::Status, data.pointer("/cluster/status"));
        let events = parse_collection(RecordKind::Event, data.pointer("/events/items"));

        let ucr = data.get("ucr").and_then(|u| u.get(unit_id.to_string()));
        let account = AccountKind::from_usergroup(
            ucr.and_then(|u| u.get("usergroup_id")).and_then(attrs::as_u64),
        );
        let permissions = Permissions::from_access(data.pointer("/user/access"));
        let current_status = data
            .pointer("/status/status_id")
            .and_then(attrs::as_u64)
            .filter(|v| *v != 0)
            .map(RecordId);

        let unit = parse_unit(unit_id, &data, ucr, &alarms, &vehicles);

        Ok(Self {
            unit,
            fetched_at,
            account,
            permissions,
            current_status,
            alarms,
            vehicles,
            message_channels,
            statuses,
            events,
            raw: Arc::new(data),
        })
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit.id
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn account(&self) -> AccountKind {
        self.account
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// The polling account's own availability status, if it has one.
    pub fn current_status(&self) -> Option<RecordId> {
        self.current_status
    }

    /// The payload as fetched, before any local patch.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The collection of `kind`; always empty for per-unit kinds.
    pub fn records(&self, kind: RecordKind) -> &RecordSet {
        match kind {
            RecordKind::Alarm => &self.alarms,
            RecordKind::Vehicle => &self.vehicles,
            RecordKind::MessageChannel => &self.message_channels,
            RecordKind::Status => &self.statuses,
            RecordKind::Event => &self.events,
            RecordKind::OpenAlarms | RecordKind::Unit | RecordKind::CurrentStatus | RecordKind::Calendar => {
                &NO_RECORDS
            }
        }
    }

    pub(crate) fn records_mut(&mut self, kind: RecordKind) -> Option<&mut RecordSet> {
        match kind {
            RecordKind::Alarm => Some(&mut self.alarms),
            RecordKind::Vehicle => Some(&mut self.vehicles),
            RecordKind::MessageChannel => Some(&mut self.message_channels),
            RecordKind::Status => Some(&mut self.statuses),
            RecordKind::Event => Some(&mut self.events),
            RecordKind::OpenAlarms | RecordKind::Unit | RecordKind::CurrentStatus | RecordKind::Calendar => None,
        }
    }

    pub fn record(&self, kind: RecordKind, id: RecordId) -> Option<&Attributes> {
        self.records(kind).get(&id)
    }

    /// Alarms whose `closed` flag is false. A missing flag counts as closed.
    pub fn open_alarm_count(&self) -> usize {
        self.alarms
            .values()
            .filter(|a| attrs::bool_field(a, "closed") == Some(false))
            .count()
    }

    /// Attach custom properties fetched separately to a vehicle record.
    pub(crate) fn merge_vehicle_properties(&mut self, id: RecordId, properties: Attributes) {
        if let Some(vehicle) = self.vehicles.get_mut(&id) {
            vehicle.insert("properties".into(), Value::Object(properties));
        }
    }
}

/// Collections arrive as `{id: {...}}` maps, or as `[]` when empty.
fn parse_collection(kind: RecordKind, value: Option<&Value>) -> RecordSet {
    let mut set = RecordSet::new();
    match value {
        Some(Value::Object(map)) => {
            for (key, item) in map {
                match key.parse::<RecordId>() {
                    Ok(id) => {
                        set.insert(id, item.as_object().cloned().unwrap_or_default());
                    }
                    Err(_) => warn!(%kind, key, "dropping record with non-numeric key"),
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                match item.get("id").and_then(attrs::as_u64) {
                    Some(id) => {
                        set.insert(RecordId(id), item.as_object().cloned().unwrap_or_default());
                    }
                    None => warn!(%kind, "dropping list record without id"),
                }
            }
        }
        _ => {}
    }
    set
}

fn parse_unit(
    unit_id: UnitId,
    data: &Value,
    ucr: Option<&Value>,
    alarms: &RecordSet,
    vehicles: &RecordSet,
) -> Unit {
    let empty = Attributes::new();
    let cluster = data
        .get("cluster")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let name = attrs::text_field(cluster, "name")
        .or_else(|| ucr.and_then(|u| u.get("name")).and_then(attrs::as_text))
        .unwrap_or_else(|| format!("Unit {unit_id}"));

    let (address, location) = match cluster.get("address") {
        Some(Value::Object(addr)) => (format_address(addr), attrs::coordinates(addr)),
        Some(other) => (attrs::as_text(other), attrs::coordinates(cluster)),
        None => (None, attrs::coordinates(cluster)),
    };

    Unit {
        id: unit_id,
        cluster_id: attrs::u64_field(cluster, "id"),
        name,
        shortname: attrs::text_field(cluster, "shortname"),
        address,
        location,
        vehicle_ids: vehicles.keys().copied().collect(),
        alarm_ids: alarms.keys().copied().collect(),
    }
}

/// `"street, zip city"` from whichever parts exist.
fn format_address(addr: &Attributes) -> Option<String> {
    let street = attrs::text_field(addr, "street");
    let locality: Vec<String> = ["zip", "city"]
        .iter()
        .filter_map(|k| attrs::text_field(addr, k))
        .collect();
    let locality = (!locality.is_empty()).then(|| locality.join(" "));
    match (street, locality) {
        (Some(s), Some(l)) => Some(format!("{s}, {l}")),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "ucr": { "100": { "name": "FF Musterstadt", "usergroup_id": 4 } },
            "user": { "access": { "alarm": true, "news": false } },
            "status": { "status_id": 3 },
            "cluster": {
                "id": 77,
                "name": "Freiwillige Feuerwehr Musterstadt",
                "shortname": "FFM",
                "address": { "street": "Hauptstraße 1", "zip": "12345", "city": "Musterstadt", "lat": 52.0, "lng": 13.0 },
                "vehicle": { "10": { "id": 10, "fmsstatus_id": 2 } },
                "status": { "3": { "id": 3, "name": "Verfügbar" } }
            },
            "alarm": { "items": {
                "1": { "id": 1, "title": "Brand", "closed": false },
                "2": { "id": 2, "title": "THL", "closed": true },
                "3": { "id": 3, "title": "Alt" }
            } },
            "message_channel": { "items": [] },
            "events": { "items": { "8": { "id": 8, "title": "Übung", "start": 1_700_000_000, "end": 1_700_003_600 } } }
        })
    }

    #[test]
    fn splits_collections_and_unit() {
        let snap = Snapshot::from_payload(UnitId(100), payload(), Utc::now()).unwrap();
        assert_eq!(snap.records(RecordKind::Alarm).len(), 3);
        assert_eq!(snap.records(RecordKind::Vehicle).len(), 1);
        assert!(snap.records(RecordKind::MessageChannel).is_empty());
        assert_eq!(snap.records(RecordKind::Status).len(), 1);
        assert_eq!(snap.records(RecordKind::Event).len(), 1);
        assert!(snap.records(RecordKind::Calendar).is_empty());
        assert_eq!(snap.account(), AccountKind::Standard);
        assert_eq!(snap.current_status(), Some(RecordId(3)));

        let unit = snap.unit();
        assert_eq!(unit.cluster_id, Some(77));
        assert_eq!(unit.address.as_deref(), Some("Hauptstraße 1, 12345 Musterstadt"));
        assert_eq!(unit.location, Some((52.0, 13.0)));
        assert_eq!(unit.vehicle_ids, vec![RecordId(10)]);
    }

    #[test]
    fn open_alarms_ignore_missing_closed_flag() {
        let snap = Snapshot::from_payload(UnitId(100), payload(), Utc::now()).unwrap();
        assert_eq!(snap.open_alarm_count(), 1);
    }

    #[test]
    fn permissions_respect_management() {
        let snap = Snapshot::from_payload(UnitId(100), payload(), Utc::now()).unwrap();
        assert!(snap.permissions().allows(Permission::Alarm));
        assert!(!snap.permissions().allows(Permission::News));

        let mgmt = Permissions::from_access(Some(&json!({"management": 1, "news": 0})));
        assert!(mgmt.allows(Permission::News));
        assert!(Permissions::default().allows(Permission::Messages));
    }

    #[test]
    fn restricted_accounts_do_not_receive_status() {
        for group in [5, 8, 19] {
            assert!(!AccountKind::from_usergroup(Some(group)).receives_status());
        }
        assert!(AccountKind::from_usergroup(Some(4)).receives_status());
        assert!(AccountKind::from_usergroup(None).receives_status());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = Snapshot::from_payload(UnitId(1), json!([]), Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload { .. }));
    }

    #[test]
    fn non_numeric_keys_are_dropped() {
        let data = json!({ "alarm": { "items": { "abc": { "title": "x" }, "5": "garbage" } } });
        let snap = Snapshot::from_payload(UnitId(1), data, Utc::now()).unwrap();
        let alarms = snap.records(RecordKind::Alarm);
        assert_eq!(alarms.len(), 1);
        assert!(alarms[&RecordId(5)].is_empty());
    }
}
