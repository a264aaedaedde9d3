//! Long-running watch: poll on schedule and print every change.
//!
//! SIGHUP re-reads the config: new units are added, removed units dropped,
//! and key or interval changes applied in place.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use secrecy::ExposeSecret;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use divera_core::{ChangeSet, EntityKey, Hub, UnitConfig, UnitId, UnitSession};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Printing ────────────────────────────────────────────────────────

#[derive(Clone)]
struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn structured(&self) -> bool {
        !matches!(self.format, OutputFormat::Table | OutputFormat::Plain)
    }

    fn change(&self, session: &UnitSession, changes: &ChangeSet) {
        if self.quiet || changes.is_empty() {
            return;
        }
        if self.structured() {
            if let Ok(line) = serde_json::to_string(changes) {
                println!("{line}");
            }
            return;
        }
        let now = Local::now().format("%H:%M:%S");
        let describe = |key: &EntityKey| {
            session
                .store()
                .get(key)
                .map(|e| format!("{} ({})", e.name(), e.state()))
                .unwrap_or_default()
        };
        for key in &changes.created {
            println!("{now} {} + {key} {}", changes.unit_id, describe(key));
        }
        for key in &changes.updated {
            println!("{now} {} ~ {key} {}", changes.unit_id, describe(key));
        }
        for key in &changes.removed {
            println!("{now} {} - {key}", changes.unit_id);
        }
    }

    /// Everything the first refresh produced, printed as created.
    fn initial(&self, session: &UnitSession) {
        self.change(
            session,
            &ChangeSet {
                unit_id: session.unit_id(),
                created: session.store().keys(),
                updated: Vec::new(),
                removed: Vec::new(),
                skipped: 0,
            },
        );
    }

    fn health(&self, session: &UnitSession) {
        if self.quiet || self.structured() {
            return;
        }
        let health = session.health();
        eprintln!(
            "{} {} {}",
            Local::now().format("%H:%M:%S"),
            session.unit_id(),
            output::health_label(&health, self.color)
        );
    }

    /// Forward one unit's changes and health transitions to stdout.
    fn spawn(&self, session: Arc<UnitSession>) -> JoinHandle<()> {
        let printer = self.clone();
        let mut changes = session.subscribe_changes();
        let mut health = session.subscribe_health();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Ok(set) => printer.change(&session, &set),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(unit = %session.unit_id(), skipped, "watch output fell behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = health.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        printer.health(&session);
                    }
                }
            }
        })
    }
}

// ── Hangup signal ───────────────────────────────────────────────────

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    #[allow(clippy::unnecessary_wraps)]
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

// ── Handler ─────────────────────────────────────────────────────────

struct Watch {
    hub: Hub,
    printer: Printer,
    tasks: HashMap<UnitId, JoinHandle<()>>,
}

impl Watch {
    fn follow(&mut self, session: Arc<UnitSession>) {
        let unit = session.unit_id();
        if let Some(old) = self.tasks.insert(unit, self.printer.spawn(session)) {
            old.abort();
        }
    }

    /// Apply a freshly loaded unit list to the running hub.
    async fn apply(&mut self, configs: Vec<UnitConfig>) {
        let wanted: Vec<UnitId> = configs.iter().map(|c| c.unit_id).collect();
        for unit in self.hub.units() {
            if !wanted.contains(&unit) {
                if let Err(e) = self.hub.remove_unit(unit).await {
                    warn!(unit = %unit, error = %e, "remove failed");
                }
                if let Some(task) = self.tasks.remove(&unit) {
                    task.abort();
                }
            }
        }

        for config in configs {
            let unit = config.unit_id;
            match self.hub.session(unit) {
                Ok(session) => {
                    let current = session.config();
                    let key_changed =
                        current.api_key.expose_secret() != config.api_key.expose_secret();
                    let intervals_changed = current.intervals != config.intervals;
                    if !key_changed && !intervals_changed {
                        continue;
                    }
                    let result = self
                        .hub
                        .reconfigure(
                            unit,
                            key_changed.then(|| config.api_key.clone()),
                            intervals_changed.then_some(config.intervals),
                        )
                        .await;
                    if let Err(e) = result {
                        warn!(unit = %unit, error = %e, "refresh after reconfigure failed");
                    }
                }
                Err(_) => {
                    if let Err(e) = self.hub.add_unit(config).await {
                        warn!(unit = %unit, error = %e, "first refresh failed");
                    }
                    if let Ok(session) = self.hub.session(unit) {
                        self.follow(session);
                    }
                }
            }
        }
    }

    async fn reload(&mut self, global: &GlobalOpts) {
        match config::unit_configs(global) {
            Ok((profile, configs)) => {
                info!(profile = %profile, units = configs.len(), "reloading configuration");
                self.apply(configs).await;
            }
            Err(e) => warn!(error = %e, "reload failed; keeping current units"),
        }
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (profile, configs) = config::unit_configs(global)?;
    let hub = Hub::default();
    hub.setup(configs).await?;
    info!(profile = %profile, units = hub.units().len(), "watching");

    let mut watch = Watch {
        hub: hub.clone(),
        printer: Printer {
            format: global.output.clone(),
            color: output::should_color(&global.color),
            quiet: global.quiet,
        },
        tasks: HashMap::new(),
    };
    for session in hub.sessions() {
        watch.printer.health(&session);
        if args.initial {
            watch.printer.initial(&session);
        }
        watch.follow(session);
    }

    let mut hangup = Hangup::new()?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                break;
            }
            () = hangup.recv() => watch.reload(global).await,
        }
    }

    for (_, task) in watch.tasks.drain() {
        task.abort();
    }
    hub.shutdown().await;
    Ok(())
}
