//! Unit status and entity listing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use divera_core::{CoreError, Entity, Hub, UnitHealth, UnitId, UnitSession};

use crate::cli::{EntitiesArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Unit status ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct UnitStatus {
    unit_id: UnitId,
    name: String,
    health: UnitHealth,
    open_alarms: usize,
    entities: usize,
    fetched_at: Option<DateTime<Utc>>,
    /// Seconds until the next scheduled poll.
    next_poll: u64,
}

impl From<&Arc<UnitSession>> for UnitStatus {
    fn from(session: &Arc<UnitSession>) -> Self {
        Self {
            unit_id: session.unit_id(),
            name: session.name(),
            health: session.health(),
            open_alarms: session.open_alarm_count(),
            entities: session.store().len(),
            fetched_at: session.snapshot().map(|s| s.fetched_at()),
            next_poll: session.next_interval().as_secs(),
        }
    }
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Open alarms")]
    open_alarms: String,
    #[tabled(rename = "Entities")]
    entities: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl UnitRow {
    fn new(s: &UnitStatus, color: bool) -> Self {
        Self {
            unit: s.unit_id.to_string(),
            name: s.name.clone(),
            health: output::health_label(&s.health, color),
            open_alarms: s.open_alarms.to_string(),
            entities: s.entities.to_string(),
            updated: s.fetched_at.map(util::age).unwrap_or_default(),
        }
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (_, configs) = config::unit_configs(global)?;
    let statuses = Hub::oneshot(configs, |hub| async move {
        Ok(hub.sessions().iter().map(UnitStatus::from).collect::<Vec<_>>())
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &statuses,
        |s| UnitRow::new(s, color),
        |s| s.unit_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Entities ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&Arc<Entity>> for EntityRow {
    fn from(e: &Arc<Entity>) -> Self {
        Self {
            unit: e.unit_id.to_string(),
            kind: e.record.kind().to_string(),
            id: e.record.id().to_string(),
            name: e.name(),
            state: e.state(),
        }
    }
}

pub async fn entities(args: EntitiesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (_, configs) = config::unit_configs(global)?;
    let filter_unit = args.unit.unit.map(UnitId);
    let filter_kind = args.kind;
    let entities = Hub::oneshot(configs, |hub| async move {
        let units = match filter_unit {
            Some(unit) => vec![hub.session(unit)?.unit_id()],
            None => hub.units(),
        };
        let mut all = Vec::new();
        for unit in units {
            all.extend(
                hub.entities(unit)?
                    .iter()
                    .filter(|e| filter_kind.is_none_or(|k| e.record.kind() == k))
                    .cloned(),
            );
        }
        all.sort_by_key(|e| (e.unit_id, e.key()));
        Ok::<_, CoreError>(all)
    })
    .await?;

    let out = output::render_list(
        &global.output,
        &entities,
        |e| EntityRow::from(e),
        |e| e.unique_id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
