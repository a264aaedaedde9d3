//! Diagnostics export.
//!
//! Unlike the other commands this one also runs when no unit is reachable;
//! failed first refreshes show up as unit health in the dump.

use std::sync::Arc;

use divera_core::{Hub, ManualScheduler, RecentLogs};
use tracing::warn;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(global: &GlobalOpts, logs: &RecentLogs) -> Result<(), CliError> {
    let (_, configs) = config::unit_configs(global)?;

    let hub = Hub::new(Arc::new(ManualScheduler::new()));
    for config in configs {
        let unit = config.unit_id;
        if let Err(e) = hub.add_unit(config).await {
            warn!(unit = %unit, error = %e, "first refresh failed");
        }
    }
    let dump = hub.diagnostics(Some(logs));
    hub.shutdown().await;
    let dump = dump?;

    // The dump is structured data; tables fall back to JSON.
    let format = match global.output {
        OutputFormat::Table | OutputFormat::Plain => OutputFormat::Json,
        ref other => other.clone(),
    };
    let out = output::render_single(&format, &dump, |_| String::new(), |_| String::new())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
