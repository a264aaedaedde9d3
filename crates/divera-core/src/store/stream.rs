// Subscription handle over one unit's entity list.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Entity;

/// Key-ordered entity list as published by the store.
pub type EntityList = Arc<Vec<Arc<Entity>>>;

/// A subscription to a unit's entities.
///
/// Holds the list seen last; [`changed()`](Self::changed) waits for the
/// next applied plan. Convert with [`into_stream()`](Self::into_stream)
/// to consume it as a `Stream`.
pub struct EntityStream {
    seen: EntityList,
    receiver: watch::Receiver<EntityList>,
}

impl EntityStream {
    pub(crate) fn new(receiver: watch::Receiver<EntityList>) -> Self {
        let seen = receiver.borrow().clone();
        Self { seen, receiver }
    }

    pub fn current(&self) -> &EntityList {
        &self.seen
    }

    /// May be newer than [`current()`](Self::current).
    pub fn latest(&self) -> EntityList {
        self.receiver.borrow().clone()
    }

    /// `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<EntityList> {
        self.receiver.changed().await.ok()?;
        self.seen = self.receiver.borrow_and_update().clone();
        Some(Arc::clone(&self.seen))
    }

    /// Yields the current list first, then every later one.
    pub fn into_stream(self) -> EntityListStream {
        EntityListStream(WatchStream::new(self.receiver))
    }
}

pub struct EntityListStream(WatchStream<EntityList>);

impl Stream for EntityListStream {
    type Item = EntityList;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use serde_json::{Value, json};
    use tokio_test::{assert_pending, assert_ready, task};

    use crate::model::{RecordKind, Snapshot, UnitId};
    use crate::reconcile::reconcile;
    use crate::store::EntityStore;

    fn snapshot(data: Value) -> Snapshot {
        Snapshot::from_payload(UnitId(100), data, Utc::now()).unwrap()
    }

    fn vehicle(id: u64) -> Value {
        json!({ "cluster": { "vehicle": [{ "id": id, "fmsstatus_id": 2 }] } })
    }

    fn vehicles_in(list: &super::EntityList) -> usize {
        list.iter().filter(|e| e.record.kind() == RecordKind::Vehicle).count()
    }

    #[test]
    fn stream_yields_current_then_waits_for_changes() {
        let store = EntityStore::new(UnitId(100));
        let first = snapshot(vehicle(1));
        store.apply(reconcile(None, &first));
        let mut stream = task::spawn(store.subscribe().into_stream());

        let initial = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(vehicles_in(&initial), 1);
        assert_pending!(stream.poll_next());

        store.apply(reconcile(Some(&first), &snapshot(json!({}))));
        assert!(stream.is_woken());
        let next = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(vehicles_in(&next), 0);

        drop(store);
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[test]
    fn changed_advances_current() {
        let store = EntityStore::new(UnitId(100));
        let mut entities = store.subscribe();
        store.apply(reconcile(None, &snapshot(vehicle(7))));
        assert!(entities.current().is_empty());
        assert_eq!(vehicles_in(&entities.latest()), 1);

        let mut changed = task::spawn(entities.changed());
        let list = assert_ready!(changed.poll()).unwrap();
        assert_eq!(vehicles_in(&list), 1);
        drop(changed);
        assert_eq!(entities.current().len(), list.len());
    }
}
