// ── Diagnostics export ──
//
// Full in-memory state per unit plus recent log lines. Only credential
// keys are redacted; personal data in the payload passes through as is.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::error::CoreError;
use crate::model::{Entity, Snapshot, UnitId};
use crate::session::{UnitHealth, UnitSession};

/// Keys whose values never leave the process.
pub const REDACTED_KEYS: &[&str] = &["api_key", "accesskey", "access_token"];
pub const REDACTED: &str = "**REDACTED**";

const DEFAULT_LOG_CAPACITY: usize = 500;

// ── Recent log capture ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// `tracing` layer keeping the last log lines of the `divera*` targets.
#[derive(Clone)]
pub struct RecentLogs {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl Default for RecentLogs {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl RecentLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Captured lines, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl<S: Subscriber> Layer<S> for RecentLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.target().starts_with("divera") {
            return;
        }
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.push(LogLine {
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

// ── Dump ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    unit_id: UnitId,
    name: &'a str,
    api_key: &'static str,
    base_url: &'a str,
    update_interval_data: u64,
    update_interval_alarm: u64,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct UnitDump<'a> {
    config: ConfigView<'a>,
    health: UnitHealth,
    open_alarms: usize,
    snapshot: Option<&'a Snapshot>,
    raw: Option<&'a Value>,
    entities: Vec<&'a Entity>,
}

/// Diagnostics of one unit as JSON, credentials redacted.
pub fn unit_diagnostics(session: &UnitSession) -> Result<Value, CoreError> {
    let config = session.config();
    let snapshot = session.snapshot();
    let entities = session.store().entities();

    let dump = UnitDump {
        config: ConfigView {
            unit_id: config.unit_id,
            name: &config.name,
            api_key: REDACTED,
            base_url: config.base_url.as_str(),
            update_interval_data: config.intervals.idle().as_secs(),
            update_interval_alarm: config.intervals.active_alarm().as_secs(),
            timeout_secs: config.timeout.as_secs(),
        },
        health: session.health(),
        open_alarms: session.open_alarm_count(),
        snapshot: snapshot.as_deref(),
        raw: snapshot.as_deref().map(Snapshot::raw),
        entities: entities.iter().map(Arc::as_ref).collect(),
    };
    let mut value = to_json(&dump)?;
    redact(&mut value);
    Ok(value)
}

#[derive(Debug, Serialize)]
struct FullDump {
    generated_at: DateTime<Utc>,
    units: Vec<Value>,
    logs: Vec<LogLine>,
}

/// Diagnostics of every given unit plus captured log lines.
pub fn dump(sessions: &[Arc<UnitSession>], logs: Option<&RecentLogs>) -> Result<Value, CoreError> {
    let units = sessions
        .iter()
        .map(|s| unit_diagnostics(s))
        .collect::<Result<Vec<_>, _>>()?;
    let mut value = to_json(&FullDump {
        generated_at: Utc::now(),
        units,
        logs: logs.map(RecentLogs::lines).unwrap_or_default(),
    })?;
    redact(&mut value);
    Ok(value)
}

fn to_json(value: &impl Serialize) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::MalformedPayload {
        message: format!("diagnostics serialization failed: {e}"),
    })
}

/// Replace credential values anywhere in `value`, including `accesskey`
/// query parameters embedded in URLs.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if REDACTED_KEYS.contains(&key.as_str()) {
                    *v = Value::String(REDACTED.into());
                } else {
                    redact(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        Value::String(s) => {
            if let Some(masked) = redact_query(s) {
                *s = masked;
            }
        }
        _ => {}
    }
}

fn redact_query(s: &str) -> Option<String> {
    let start = s.find("accesskey=")? + "accesskey=".len();
    let end = s[start..].find('&').map_or(s.len(), |i| start + i);
    Some(format!("{}{REDACTED}{}", &s[..start], &s[end..]))
}
