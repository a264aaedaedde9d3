// ── Unit sessions ──
//
// One `UnitSession` per configured unit: credentials, client, last
// published snapshot, entity store and health. The `SessionRegistry` maps
// unit ids to sessions and is owned by the hub; there is no global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use divera_api::DiveraClient;
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tracing::{debug, info};

use crate::config::{PollIntervals, UnitConfig};
use crate::error::CoreError;
use crate::model::{Snapshot, UnitId};
use crate::reconcile::reconcile;
use crate::store::{ChangeSet, EntityStore};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Reachability of a unit as seen by its poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitHealth {
    /// Configured, first refresh not finished yet.
    Pending,
    Online,
    /// Last refresh failed; the last good snapshot is still published.
    Unavailable { reason: String },
    /// Credentials rejected; polling is suspended until reconfigured.
    ReauthRequired { reason: String },
}

impl UnitHealth {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Online)
    }
}

pub struct UnitSession {
    unit_id: UnitId,
    config: ArcSwap<UnitConfig>,
    client: ArcSwap<DiveraClient>,
    snapshot: ArcSwapOption<Snapshot>,
    store: EntityStore,
    health: watch::Sender<UnitHealth>,
    changes: broadcast::Sender<Arc<ChangeSet>>,
    /// Held for the whole fetch; `try_lock` failure means "skip this tick".
    refresh_lock: Mutex<()>,
    /// Serializes snapshot publication between polls and action patches.
    write_lock: Mutex<()>,
    last_interval_secs: AtomicU64,
}

impl UnitSession {
    pub fn new(config: UnitConfig) -> Result<Self, CoreError> {
        let client = config.build_client()?;
        let (health, _) = watch::channel(UnitHealth::Pending);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            unit_id: config.unit_id,
            store: EntityStore::new(config.unit_id),
            config: ArcSwap::from_pointee(config),
            client: ArcSwap::from_pointee(client),
            snapshot: ArcSwapOption::empty(),
            health,
            changes,
            refresh_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            last_interval_secs: AtomicU64::new(0),
        })
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn config(&self) -> Arc<UnitConfig> {
        self.config.load_full()
    }

    pub fn name(&self) -> String {
        self.config.load().name.clone()
    }

    pub(crate) fn client(&self) -> Arc<DiveraClient> {
        self.client.load_full()
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn health(&self) -> UnitHealth {
        self.health.borrow().clone()
    }

    /// Entities are available only while the unit is online.
    pub fn is_available(&self) -> bool {
        self.health.borrow().is_available()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<UnitHealth> {
        self.health.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<Arc<ChangeSet>> {
        self.changes.subscribe()
    }

    pub fn open_alarm_count(&self) -> usize {
        self.snapshot
            .load_full()
            .map_or(0, |snap| snap.open_alarm_count())
    }

    /// Delay until the next poll, read fresh from the current snapshot.
    pub fn next_interval(&self) -> Duration {
        let interval = self.config.load().intervals.select(self.open_alarm_count());
        let secs = interval.as_secs();
        let previous = self.last_interval_secs.swap(secs, Ordering::Relaxed);
        if previous != secs {
            debug!(unit = %self.unit_id, interval_secs = secs, "poll interval changed");
        }
        interval
    }

    pub(crate) fn set_health(&self, health: UnitHealth) {
        self.health.send_if_modified(|current| {
            if *current == health {
                false
            } else {
                *current = health;
                true
            }
        });
    }

    /// Replace API key and/or intervals in place.
    ///
    /// A new key rebuilds the client and lifts a re-auth suspension.
    pub fn reconfigure(
        &self,
        api_key: Option<SecretString>,
        intervals: Option<PollIntervals>,
    ) -> Result<(), CoreError> {
        let mut config = UnitConfig::clone(&self.config.load());
        let key_changed = api_key.is_some();
        if let Some(key) = api_key {
            config.api_key = key;
        }
        if let Some(intervals) = intervals {
            config.intervals = intervals;
        }

        if key_changed {
            let client = config.build_client()?;
            self.client.store(Arc::new(client));
        }
        self.config.store(Arc::new(config));

        if key_changed && matches!(self.health(), UnitHealth::ReauthRequired { .. }) {
            info!(unit = %self.unit_id, "credentials replaced, resuming polling");
            self.set_health(UnitHealth::Pending);
        }
        Ok(())
    }

    pub(crate) fn try_begin_refresh(&self) -> Option<MutexGuard<'_, ()>> {
        self.refresh_lock.try_lock().ok()
    }

    /// Reconcile `new` against the current snapshot and publish it.
    pub(crate) async fn publish(&self, new: Snapshot) -> (Arc<Snapshot>, Arc<ChangeSet>) {
        let _guard = self.write_lock.lock().await;
        self.publish_locked(new)
    }

    /// Derive a new snapshot from the current one and publish it.
    ///
    /// `patch` runs under the write lock, so it cannot interleave with a
    /// poll's publication.
    pub(crate) async fn patch<F>(&self, patch: F) -> Result<Arc<ChangeSet>, CoreError>
    where
        F: FnOnce(&mut Snapshot) -> Result<(), CoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full().ok_or_else(|| CoreError::invalid(format!(
            "unit {} has no data yet",
            self.unit_id
        )))?;
        let mut next = Snapshot::clone(&current);
        patch(&mut next)?;
        let (_, changes) = self.publish_locked(next);
        Ok(changes)
    }

    fn publish_locked(&self, new: Snapshot) -> (Arc<Snapshot>, Arc<ChangeSet>) {
        let old = self.snapshot.load_full();
        let plan = reconcile(old.as_deref(), &new);
        let changes = Arc::new(self.store.apply(plan));
        let new = Arc::new(new);
        self.snapshot.store(Some(Arc::clone(&new)));
        if !changes.is_empty() {
            debug!(
                unit = %self.unit_id,
                created = changes.created.len(),
                updated = changes.updated.len(),
                removed = changes.removed.len(),
                "entities reconciled"
            );
        }
        // No receivers is fine.
        let _ = self.changes.send(Arc::clone(&changes));
        (new, changes)
    }
}

/// Unit id → session map owned by the hub.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<UnitId, Arc<UnitSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, returning the one it replaced.
    pub fn insert(&self, session: Arc<UnitSession>) -> Option<Arc<UnitSession>> {
        self.sessions.insert(session.unit_id(), session)
    }

    pub fn get(&self, unit: UnitId) -> Option<Arc<UnitSession>> {
        self.sessions.get(&unit).map(|r| Arc::clone(r.value()))
    }

    pub fn require(&self, unit: UnitId) -> Result<Arc<UnitSession>, CoreError> {
        self.get(unit).ok_or(CoreError::UnitNotFound { unit })
    }

    pub fn remove(&self, unit: UnitId) -> Option<Arc<UnitSession>> {
        self.sessions.remove(&unit).map(|(_, s)| s)
    }

    /// All sessions, ordered by unit id.
    pub fn sessions(&self) -> Vec<Arc<UnitSession>> {
        let mut all: Vec<Arc<UnitSession>> =
            self.sessions.iter().map(|r| Arc::clone(r.value())).collect();
        all.sort_by_key(|s| s.unit_id());
        all
    }

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.sessions().iter().map(|s| s.unit_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
