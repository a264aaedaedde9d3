// ── Domain model ──
//
// Identity types, snapshots, typed records and the entities built from them.

mod attrs;
pub mod derived;
pub mod entity;
pub mod id;
pub mod record;
pub mod snapshot;

pub use attrs::Attributes;
pub(crate) use attrs::as_u64;
pub(crate) use record::crew_ids;
pub use derived::{AlarmCounter, Calendar, CurrentStatus, Station, derive_unit_records};
pub use entity::{Entity, EntityKey};
pub use id::{RecordId, UnitId};
pub use record::{Alarm, Event, MalformedRecord, MessageChannel, Record, RecordKind, StatusValue, Vehicle};
pub use snapshot::{AccountKind, Permission, Permissions, RecordSet, Snapshot, Unit};
