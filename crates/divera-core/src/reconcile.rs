// ── Entity reconciliation ──
//
// Pure diff between two snapshots of one unit. Record ids present only in
// the new snapshot are created, ids in both are updated with the full new
// record, ids only in the old snapshot are removed. Malformed records are
// skipped but still count as present, so a transient data glitch never
// deletes an entity. Per-unit records follow the same algebra, keyed by kind.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::warn;

use crate::model::{EntityKey, MalformedRecord, Record, RecordId, RecordKind, Snapshot, derive_unit_records};

/// What a reconciliation pass will do to the entity set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub created: Vec<Record>,
    pub updated: Vec<Record>,
    pub removed: Vec<EntityKey>,
    pub skipped: Vec<MalformedRecord>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Diff `old` (if any) against `new`.
///
/// The status collection is left untouched entirely when the account kind
/// never receives status data.
pub fn reconcile(old: Option<&Snapshot>, new: &Snapshot) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for kind in RecordKind::COLLECTIONS {
        if kind == RecordKind::Status && !new.account().receives_status() {
            continue;
        }

        let previous: BTreeSet<RecordId> = old
            .map(|s| s.records(kind).keys().copied().collect())
            .unwrap_or_default();
        let current = new.records(kind);

        for (&id, attributes) in current {
            match Record::parse(kind, id, attributes) {
                Ok(record) if previous.contains(&id) => plan.updated.push(record),
                Ok(record) => plan.created.push(record),
                Err(malformed) => {
                    warn!(unit = %new.unit_id(), "{malformed}");
                    plan.skipped.push(malformed);
                }
            }
        }

        plan.removed.extend(
            previous
                .iter()
                .filter(|id| !current.contains_key(*id))
                .map(|&id| EntityKey::new(kind, id)),
        );
    }

    let previous: BTreeSet<RecordKind> = old
        .map(|s| derive_unit_records(s).iter().map(Record::kind).collect())
        .unwrap_or_default();
    let current = derive_unit_records(new);
    plan.removed.extend(
        previous
            .iter()
            .filter(|kind| current.iter().all(|r| r.kind() != **kind))
            .map(|&kind| EntityKey::new(kind, RecordId(new.unit_id().get()))),
    );
    for record in current {
        if previous.contains(&record.kind()) {
            plan.updated.push(record);
        } else {
            plan.created.push(record);
        }
    }

    plan
}
