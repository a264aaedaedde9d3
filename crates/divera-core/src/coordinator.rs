// ── Poll coordinator ──
//
// One coordinator per unit. A refresh pulls the full unit payload, fetches
// vehicle properties, reconciles against the previous snapshot and
// publishes. Failures change health but never clear published data.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{Permission, RecordId, RecordKind, Snapshot};
use crate::scheduler::PeriodicJob;
use crate::session::{UnitHealth, UnitSession};
use crate::store::ChangeSet;

/// Result of one refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Applied {
        snapshot: Arc<Snapshot>,
        changes: Arc<ChangeSet>,
    },
    /// Another refresh of the same unit was still running.
    Skipped,
    /// The unit waits for new credentials.
    Suspended,
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

pub struct PollCoordinator {
    session: Arc<UnitSession>,
}

impl PollCoordinator {
    pub fn new(session: Arc<UnitSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<UnitSession> {
        &self.session
    }

    /// Fetch, reconcile and publish once.
    ///
    /// Returns `Skipped` instead of queueing when a refresh is in flight.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        if matches!(self.session.health(), UnitHealth::ReauthRequired { .. }) {
            debug!(unit = %self.session.unit_id(), "refresh suspended until reauth");
            return Ok(RefreshOutcome::Suspended);
        }
        let Some(_guard) = self.session.try_begin_refresh() else {
            debug!(unit = %self.session.unit_id(), "refresh already running, skipping tick");
            return Ok(RefreshOutcome::Skipped);
        };

        match self.fetch().await {
            Ok(snapshot) => {
                let (snapshot, changes) = self.session.publish(snapshot).await;
                if !self.session.is_available() {
                    info!(unit = %self.session.unit_id(), "unit online");
                }
                self.session.set_health(UnitHealth::Online);
                Ok(RefreshOutcome::Applied { snapshot, changes })
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Snapshot, CoreError> {
        let unit = self.session.unit_id();
        let client = self.session.client();
        let data = client.pull_all(unit.get()).await?;
        let mut snapshot = Snapshot::from_payload(unit, data, Utc::now())?;

        if snapshot.permissions().allows(Permission::StatusVehicle) {
            let ids: Vec<RecordId> = snapshot
                .records(RecordKind::Vehicle)
                .keys()
                .copied()
                .collect();
            let fetches = ids.iter().map(|id| client.vehicle_properties(id.get()));
            let results = join_all(fetches).await;
            for (id, result) in ids.into_iter().zip(results) {
                match result {
                    Ok(properties) => snapshot.merge_vehicle_properties(id, properties),
                    Err(e) => {
                        warn!(unit = %unit, vehicle = %id, error = %e, "vehicle properties unavailable");
                    }
                }
            }
        }
        Ok(snapshot)
    }

    fn record_failure(&self, err: &CoreError) {
        let unit = self.session.unit_id();
        let reason = err.to_string();
        if err.is_auth() {
            warn!(unit = %unit, error = %reason, "credentials rejected, suspending polling");
            self.session.set_health(UnitHealth::ReauthRequired { reason });
        } else {
            warn!(unit = %unit, error = %reason, "refresh failed, keeping last data");
            self.session.set_health(UnitHealth::Unavailable { reason });
        }
    }
}

impl PeriodicJob for PollCoordinator {
    fn name(&self) -> String {
        format!("poll:{}", self.session.unit_id())
    }

    fn run(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // Failures are already logged and reflected in health.
            let _ = self.refresh().await;
        })
    }

    fn next_delay(&self) -> Duration {
        self.session.next_interval()
    }
}
