// ── Runtime unit configuration ──
//
// These types describe how to poll one Divera unit. They carry the API
// key and polling tuning but never touch disk; the config crate or CLI
// builds a `UnitConfig` and hands it to the hub.

use std::path::PathBuf;
use std::time::Duration;

use divera_api::{DiveraClient, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;
use crate::model::UnitId;

pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ALARM_INTERVAL: Duration = Duration::from_secs(30);
pub const MIN_IDLE_INTERVAL: Duration = Duration::from_secs(30);
pub const MIN_ALARM_INTERVAL: Duration = Duration::from_secs(10);

/// The two polling periods of a unit.
///
/// Floors are enforced on construction, so a value of this type is always
/// within the vendor's acceptable request rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    idle: Duration,
    active_alarm: Duration,
}

impl PollIntervals {
    pub fn new(idle: Duration, active_alarm: Duration) -> Result<Self, CoreError> {
        if idle < MIN_IDLE_INTERVAL {
            return Err(CoreError::invalid(format!(
                "update_interval_data must be at least {}s, got {}s",
                MIN_IDLE_INTERVAL.as_secs(),
                idle.as_secs()
            )));
        }
        if active_alarm < MIN_ALARM_INTERVAL {
            return Err(CoreError::invalid(format!(
                "update_interval_alarm must be at least {}s, got {}s",
                MIN_ALARM_INTERVAL.as_secs(),
                active_alarm.as_secs()
            )));
        }
        Ok(Self { idle, active_alarm })
    }

    pub fn from_secs(idle: u64, active_alarm: u64) -> Result<Self, CoreError> {
        Self::new(Duration::from_secs(idle), Duration::from_secs(active_alarm))
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    pub fn active_alarm(&self) -> Duration {
        self.active_alarm
    }

    /// Period for the next tick given the current open-alarm count.
    pub fn select(&self, open_alarms: usize) -> Duration {
        if open_alarms > 0 {
            self.active_alarm
        } else {
            self.idle
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            idle: DEFAULT_IDLE_INTERVAL,
            active_alarm: DEFAULT_ALARM_INTERVAL,
        }
    }
}

/// Everything needed to poll one unit.
///
/// Built by the config crate or CLI, passed to the hub. Core never reads
/// config files.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub unit_id: UnitId,
    /// Display name chosen at setup (usually the unit name).
    pub name: String,
    pub api_key: SecretString,
    pub intervals: PollIntervals,
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra CA certificate for self-hosted instances.
    pub ca_cert: Option<PathBuf>,
}

impl UnitConfig {
    pub fn new(unit_id: UnitId, name: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            unit_id,
            name: name.into(),
            api_key,
            intervals: PollIntervals::default(),
            base_url: default_base_url(),
            timeout: Duration::from_secs(10),
            ca_cert: None,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self
                .ca_cert
                .clone()
                .map_or(TlsMode::System, TlsMode::CustomCa),
            timeout: self.timeout,
        }
    }

    pub(crate) fn build_client(&self) -> Result<DiveraClient, CoreError> {
        Ok(DiveraClient::new(
            self.base_url.clone(),
            self.api_key.clone(),
            &self.transport(),
        )?)
    }
}

/// The public Divera instance.
///
/// # Panics
///
/// Never: `DEFAULT_BASE_URL` is a constant absolute URL.
pub fn default_base_url() -> Url {
    Url::parse(divera_api::DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid absolute URL")
}
