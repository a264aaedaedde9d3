// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based
// change notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::EntityKey;

/// Keys touched by one batch mutation.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub created: Vec<EntityKey>,
    pub updated: Vec<EntityKey>,
    pub removed: Vec<EntityKey>,
}

/// A lock-free, reactive collection of entities keyed by `EntityKey`.
///
/// Uses `DashMap` for O(1) concurrent lookups and `watch` channels
/// for push-based change notification. Every mutation bumps a version
/// counter and rebuilds the key-ordered snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<EntityKey, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Apply upserts and removals, then publish a single new snapshot.
    pub(crate) fn apply(&self, upserts: Vec<(EntityKey, T)>, removals: &[EntityKey]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (key, entity) in upserts {
            if self.by_key.insert(key, Arc::new(entity)).is_none() {
                outcome.created.push(key);
            } else {
                outcome.updated.push(key);
            }
        }
        for key in removals {
            if self.by_key.remove(key).is_some() {
                outcome.removed.push(*key);
            }
        }
        self.publish();
        outcome
    }

    pub(crate) fn get(&self, key: &EntityKey) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// Remove all entities.
    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.publish();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// All current keys, sorted.
    pub(crate) fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.by_key.iter().map(|r| *r.key()).collect();
        keys.sort();
        keys
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the ordered snapshot, broadcast it, bump the version.
    fn publish(&self) {
        let mut entries: Vec<(EntityKey, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{RecordId, RecordKind};

    fn key(id: u64) -> EntityKey {
        EntityKey::new(RecordKind::Vehicle, RecordId(id))
    }

    #[test]
    fn apply_distinguishes_new_and_existing_keys() {
        let col: EntityCollection<String> = EntityCollection::new();
        let first = col.apply(vec![(key(1), "a".into())], &[]);
        let second = col.apply(vec![(key(1), "b".into())], &[]);
        assert_eq!(first.created, vec![key(1)]);
        assert_eq!(second.updated, vec![key(1)]);
        assert_eq!(*col.get(&key(1)).unwrap(), "b");
    }

    #[test]
    fn apply_publishes_once_in_key_order() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.apply(vec![(key(5), "old".into())], &[]);
        let before = col.version();

        let outcome = col.apply(
            vec![(key(3), "c".into()), (key(1), "a".into())],
            &[key(5), key(9)],
        );

        assert_eq!(outcome.created, vec![key(3), key(1)]);
        assert_eq!(outcome.removed, vec![key(5)]);
        assert_eq!(col.version(), before + 1);
        let snap = col.snapshot();
        assert_eq!(snap.iter().map(|s| s.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn removal_of_unknown_key_is_ignored_and_clear_empties() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.apply(vec![(key(1), "a".into()), (key(2), "b".into())], &[]);
        let outcome = col.apply(Vec::new(), &[key(1), key(1), key(7)]);
        assert_eq!(outcome.removed, vec![key(1)]);
        assert_eq!(col.keys(), vec![key(2)]);

        col.clear();
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
    }
}
