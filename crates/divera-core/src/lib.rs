//! Polling, reconciliation and actions for Divera 24/7 units on top of
//! `divera-api`.
//!
//! - **[`Hub`]** — Facade over every configured unit.
//!   [`setup()`](Hub::setup) runs the first refresh of each unit and
//!   registers one poll job per unit with a [`Scheduler`];
//!   [`Hub::oneshot()`](Hub::oneshot) serves single CLI invocations.
//!
//! - **[`PollCoordinator`]** — Fetches `pull/all` plus vehicle properties,
//!   reconciles against the previous [`Snapshot`] and publishes. The next
//!   delay switches between idle and active-alarm intervals.
//!
//! - **[`reconcile()`]** — Pure diff of two snapshots into created, updated
//!   and removed records. Malformed records are skipped with a warning.
//!
//! - **[`EntityStore`]** / **[`EntityStream`]** — Lock-free reactive
//!   entity storage (`DashMap` + `tokio::sync::watch`) per unit.
//!
//! - **[`Action`]** — Validated outbound writes. Changes to existing
//!   records are patched into the published snapshot right away; created
//!   records wait for the next poll.
//!
//! - **[`diagnostics`]** — State dump with credentials redacted, plus the
//!   [`RecentLogs`] tracing layer.

pub mod action;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod hub;
pub mod model;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{Action, ActionKind, ActionOutcome};
pub use config::{PollIntervals, UnitConfig};
pub use coordinator::{PollCoordinator, RefreshOutcome};
pub use diagnostics::RecentLogs;
pub use error::CoreError;
pub use hub::Hub;
pub use reconcile::{ReconcilePlan, reconcile};
pub use scheduler::{ManualScheduler, PeriodicJob, ScheduledTask, Scheduler, TokioScheduler};
pub use session::{SessionRegistry, UnitHealth, UnitSession};
pub use store::{ChangeSet, EntityList, EntityStore, EntityStream};

pub use model::{
    AccountKind, Alarm, AlarmCounter, Attributes, Calendar, CurrentStatus, Entity, EntityKey, Event,
    MalformedRecord, MessageChannel, Permission, Permissions, Record, RecordId, RecordKind,
    Snapshot, Station, StatusValue, Unit, UnitId, Vehicle,
};
