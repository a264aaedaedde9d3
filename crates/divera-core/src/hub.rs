// ── Hub ──
//
// Facade over every configured unit: owns the session registry, registers
// one poll job per unit with the scheduler, routes actions and builds
// diagnostics. Cheaply cloneable.

use std::sync::Arc;

use dashmap::DashMap;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::{self, Action, ActionOutcome};
use crate::config::{PollIntervals, UnitConfig};
use crate::coordinator::{PollCoordinator, RefreshOutcome};
use crate::diagnostics::{self, RecentLogs};
use crate::error::CoreError;
use crate::model::{Entity, RecordId, RecordKind, UnitId};
use crate::scheduler::{ManualScheduler, PeriodicJob, ScheduledTask, Scheduler, TokioScheduler};
use crate::session::{SessionRegistry, UnitSession};
use crate::store::EntityStream;

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: SessionRegistry,
    scheduler: Arc<dyn Scheduler>,
    tasks: DashMap<UnitId, ScheduledTask>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(Arc::new(TokioScheduler::new()))
    }
}

impl Hub {
    /// Create a hub that registers poll jobs with `scheduler`.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: SessionRegistry::new(),
                scheduler,
                tasks: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    // ── Unit lifecycle ───────────────────────────────────────────

    /// Add every unit and run their first refresh.
    ///
    /// Fails with `NoReachableUnit` (and removes everything again) when no
    /// unit could be polled. Returns the units that came online.
    pub async fn setup(&self, configs: Vec<UnitConfig>) -> Result<Vec<UnitId>, CoreError> {
        let mut online = Vec::new();
        for config in configs {
            let unit = config.unit_id;
            match self.add_unit(config).await {
                Ok(outcome) if outcome.is_applied() => online.push(unit),
                Ok(_) => {}
                Err(e) => warn!(unit = %unit, error = %e, "unit unreachable during setup"),
            }
        }
        if online.is_empty() {
            self.shutdown().await;
            return Err(CoreError::NoReachableUnit);
        }
        info!(units = online.len(), "setup complete");
        Ok(online)
    }

    /// Register a unit, refresh it once and schedule its poll job.
    ///
    /// The job is scheduled even when the first refresh fails; the error is
    /// returned so callers can report it. Replaces an existing unit with
    /// the same id.
    pub async fn add_unit(&self, config: UnitConfig) -> Result<RefreshOutcome, CoreError> {
        let unit = config.unit_id;
        let session = Arc::new(UnitSession::new(config)?);
        if let Some(previous) = self.inner.registry.insert(Arc::clone(&session)) {
            debug!(unit = %previous.unit_id(), "replacing existing unit");
            self.cancel_task(unit).await;
        }

        let coordinator = Arc::new(PollCoordinator::new(Arc::clone(&session)));
        let first = coordinator.refresh().await;
        let task = self
            .inner
            .scheduler
            .register(coordinator as Arc<dyn PeriodicJob>);
        self.inner.tasks.insert(unit, task);
        info!(unit = %unit, name = %session.name(), "unit added");
        first
    }

    /// Stop polling a unit and drop its entities.
    pub async fn remove_unit(&self, unit: UnitId) -> Result<(), CoreError> {
        let session = self
            .inner
            .registry
            .remove(unit)
            .ok_or(CoreError::UnitNotFound { unit })?;
        self.cancel_task(unit).await;
        session.store().clear();
        info!(unit = %unit, "unit removed");
        Ok(())
    }

    /// Tear a unit down and set it up again from its current config.
    pub async fn reload(&self, unit: UnitId) -> Result<RefreshOutcome, CoreError> {
        let config = UnitConfig::clone(&self.inner.registry.require(unit)?.config());
        self.remove_unit(unit).await?;
        self.add_unit(config).await
    }

    /// Change API key and/or intervals in place, then refresh.
    ///
    /// Entities and the poll job survive; a new key lifts a re-auth
    /// suspension.
    pub async fn reconfigure(
        &self,
        unit: UnitId,
        api_key: Option<SecretString>,
        intervals: Option<PollIntervals>,
    ) -> Result<RefreshOutcome, CoreError> {
        let session = self.inner.registry.require(unit)?;
        session.reconfigure(api_key, intervals)?;
        PollCoordinator::new(session).refresh().await
    }

    /// Poll a unit now, outside its schedule.
    pub async fn refresh(&self, unit: UnitId) -> Result<RefreshOutcome, CoreError> {
        let session = self.inner.registry.require(unit)?;
        PollCoordinator::new(session).refresh().await
    }

    /// Cancel every poll job and drop all units.
    pub async fn shutdown(&self) {
        let units: Vec<UnitId> = self.inner.tasks.iter().map(|t| *t.key()).collect();
        for unit in units {
            self.cancel_task(unit).await;
        }
        for session in self.inner.registry.sessions() {
            self.inner.registry.remove(session.unit_id());
            session.store().clear();
        }
        debug!("hub shut down");
    }

    async fn cancel_task(&self, unit: UnitId) {
        if let Some((_, task)) = self.inner.tasks.remove(&unit) {
            task.shutdown().await;
        }
    }

    // ── Actions ──────────────────────────────────────────────────

    pub async fn execute(&self, unit: UnitId, action: Action) -> Result<ActionOutcome, CoreError> {
        let session = self.inner.registry.require(unit)?;
        action::execute(&session, action).await
    }

    /// Build an action from a named call and execute it.
    pub async fn call(
        &self,
        unit: UnitId,
        name: &str,
        data: Value,
    ) -> Result<ActionOutcome, CoreError> {
        let action = Action::from_call(name, data)?;
        self.execute(unit, action).await
    }

    /// The unit whose latest snapshot holds the given record.
    pub fn locate(&self, kind: RecordKind, id: RecordId) -> Option<UnitId> {
        self.inner.registry.sessions().into_iter().find_map(|s| {
            s.snapshot()
                .filter(|snap| snap.record(kind, id).is_some())
                .map(|_| s.unit_id())
        })
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn session(&self, unit: UnitId) -> Result<Arc<UnitSession>, CoreError> {
        self.inner.registry.require(unit)
    }

    pub fn sessions(&self) -> Vec<Arc<UnitSession>> {
        self.inner.registry.sessions()
    }

    pub fn units(&self) -> Vec<UnitId> {
        self.inner.registry.unit_ids()
    }

    pub fn entities(&self, unit: UnitId) -> Result<Arc<Vec<Arc<Entity>>>, CoreError> {
        Ok(self.session(unit)?.store().entities())
    }

    pub fn subscribe(&self, unit: UnitId) -> Result<EntityStream, CoreError> {
        Ok(self.session(unit)?.store().subscribe())
    }

    /// Diagnostics of every unit, credentials redacted.
    pub fn diagnostics(&self, logs: Option<&RecentLogs>) -> Result<Value, CoreError> {
        diagnostics::dump(&self.sessions(), logs)
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: set up the units, run the closure, shut down.
    ///
    /// Poll jobs are registered with a manual scheduler that is never
    /// ticked, so nothing polls in the background.
    pub async fn oneshot<F, Fut, T>(configs: Vec<UnitConfig>, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Hub) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let hub = Hub::new(Arc::new(ManualScheduler::new()));
        hub.setup(configs).await?;
        let result = f(hub.clone()).await;
        hub.shutdown().await;
        result
    }
}
