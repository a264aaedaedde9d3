// ── Entity store ──
//
// Per-unit reactive entity storage. Reconciliation plans and action
// patches are applied here; hosts read snapshots or subscribe to changes.

mod collection;
mod stream;

use std::sync::Arc;

use serde::Serialize;

use crate::model::{Entity, EntityKey, UnitId};
use crate::reconcile::ReconcilePlan;

use collection::EntityCollection;
pub use stream::{EntityList, EntityListStream, EntityStream};

/// What one applied plan changed, as broadcast to hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub unit_id: UnitId,
    pub created: Vec<EntityKey>,
    pub updated: Vec<EntityKey>,
    pub removed: Vec<EntityKey>,
    /// Malformed records left untouched.
    pub skipped: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

pub struct EntityStore {
    unit_id: UnitId,
    entities: EntityCollection<Entity>,
}

impl EntityStore {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            entities: EntityCollection::new(),
        }
    }

    /// Materialize a reconciliation plan.
    ///
    /// An update for a key with no entity yet (the record was malformed
    /// last time) creates it.
    pub fn apply(&self, plan: ReconcilePlan) -> ChangeSet {
        let skipped = plan.skipped.len();
        let upserts: Vec<(EntityKey, Entity)> = plan
            .created
            .into_iter()
            .chain(plan.updated)
            .map(|record| {
                let entity = Entity::new(self.unit_id, record);
                (entity.key(), entity)
            })
            .collect();
        let outcome = self.entities.apply(upserts, &plan.removed);
        ChangeSet {
            unit_id: self.unit_id,
            created: outcome.created,
            updated: outcome.updated,
            removed: outcome.removed,
            skipped,
        }
    }

    pub fn get(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.entities.get(key)
    }

    /// All entities, ordered by key.
    pub fn entities(&self) -> EntityList {
        self.entities.snapshot()
    }

    pub fn keys(&self) -> Vec<EntityKey> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Mutation counter; bumps once per applied plan.
    pub fn version(&self) -> u64 {
        self.entities.version()
    }

    pub fn subscribe(&self) -> EntityStream {
        EntityStream::new(self.entities.subscribe())
    }

    /// Drop every entity (unit removed).
    pub fn clear(&self) {
        self.entities.clear();
    }
}
