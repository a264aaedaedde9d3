//! Shared configuration for the Divera CLI and other hosts.
//!
//! TOML profiles (one per Divera account, each listing the units it polls),
//! credential resolution (env + keyring + plaintext), interval validation,
//! and translation to `divera_core::UnitConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use divera_core::{PollIntervals, UnitConfig, UnitId};

const KEYRING_SERVICE: &str = "divera";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' does not exist")]
    UnknownProfile { profile: String },

    #[error("profile '{profile}' has no units configured")]
    NoUnits { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Idle polling interval in seconds.
    #[serde(default = "default_interval_data")]
    pub update_interval_data: u64,

    /// Polling interval while an alarm is open, in seconds.
    #[serde(default = "default_interval_alarm")]
    pub update_interval_alarm: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            update_interval_data: default_interval_data(),
            update_interval_alarm: default_interval_alarm(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_interval_data() -> u64 {
    divera_core::config::DEFAULT_IDLE_INTERVAL.as_secs()
}
fn default_interval_alarm() -> u64 {
    divera_core::config::DEFAULT_ALARM_INTERVAL.as_secs()
}

/// One Divera account and the units it polls.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Divera instance; the public cloud when absent.
    pub base_url: Option<String>,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Username the key was obtained with, for display only.
    pub username: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override request timeout.
    pub timeout: Option<u64>,

    #[serde(default)]
    pub units: Vec<UnitProfile>,
}

/// A unit selected during setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnitProfile {
    pub ucr_id: u64,

    pub name: String,

    /// Overrides `defaults.update_interval_data`.
    pub update_interval_data: Option<u64>,

    /// Overrides `defaults.update_interval_alarm`.
    pub update_interval_alarm: Option<u64>,
}

impl UnitProfile {
    pub fn new(ucr_id: u64, name: impl Into<String>) -> Self {
        Self {
            ucr_id,
            name: name.into(),
            update_interval_data: None,
            update_interval_alarm: None,
        }
    }

    /// Effective intervals, validated against the polling floors.
    pub fn intervals(&self, defaults: &Defaults) -> Result<PollIntervals, ConfigError> {
        let idle = self
            .update_interval_data
            .unwrap_or(defaults.update_interval_data);
        let alarm = self
            .update_interval_alarm
            .unwrap_or(defaults.update_interval_alarm);
        validate_intervals(idle, alarm).map_err(|reason| ConfigError::Validation {
            field: format!("intervals of unit {}", self.ucr_id),
            reason,
        })
    }
}

/// Check both intervals against the polling floors.
pub fn validate_intervals(idle: u64, alarm: u64) -> Result<PollIntervals, String> {
    PollIntervals::from_secs(idle, alarm).map_err(|e| match e {
        divera_core::CoreError::Validation { message, .. } => message,
        other => other.to_string(),
    })
}

impl Config {
    /// Name of the profile to use: explicit choice, else `default_profile`,
    /// else `"default"`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }

    /// Reject intervals below the floors anywhere in the file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_intervals(
            self.defaults.update_interval_data,
            self.defaults.update_interval_alarm,
        )
        .map_err(|reason| ConfigError::Validation {
            field: "defaults".into(),
            reason,
        })?;
        for profile in self.profiles.values() {
            for unit in &profile.units {
                unit.intervals(&self.defaults)?;
            }
        }
        Ok(())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "divera", "divera").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("divera");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from defaults, the TOML file at `path`, then
/// `DIVERA_` environment variables (`__` separates nested keys).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DIVERA_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or invalid.
pub fn load_config_or_default(path: &Path) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve an API key: `api_key_env` variable, then system keyring, then
/// plaintext in the profile.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store an API key in the system keyring.
pub fn store_api_key(profile_name: &str, api_key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?
        .set_password(api_key)
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to runtime config ───────────────────────────────────

/// Build one `UnitConfig` per unit of a profile.
pub fn profile_to_unit_configs(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<Vec<UnitConfig>, ConfigError> {
    if profile.units.is_empty() {
        return Err(ConfigError::NoUnits {
            profile: profile_name.into(),
        });
    }
    let api_key = resolve_api_key(profile, profile_name)?;
    let base_url = match profile.base_url.as_deref() {
        Some(raw) => Some(raw.parse::<url::Url>().map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {raw}"),
        })?),
        None => None,
    };
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    profile
        .units
        .iter()
        .map(|unit| {
            let mut config = UnitConfig::new(UnitId(unit.ucr_id), unit.name.clone(), api_key.clone());
            config.intervals = unit.intervals(defaults)?;
            config.timeout = timeout;
            config.ca_cert.clone_from(&profile.ca_cert);
            if let Some(ref url) = base_url {
                config.base_url = url.clone();
            }
            Ok(config)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "wache"

[defaults]
update_interval_data = 120

[profiles.wache]
api_key = "plain-key"
timeout = 5

[[profiles.wache.units]]
ucr_id = 100
name = "FF Musterstadt"

[[profiles.wache.units]]
ucr_id = 200
name = "JF Musterstadt"
update_interval_alarm = 15
"#;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_with_defaults() {
        let (_dir, path) = write(SAMPLE);
        let config = load_config(&path).unwrap();
        assert_eq!(config.active_profile_name(None), "wache");
        assert_eq!(config.defaults.update_interval_alarm, 30);

        let profile = config.profile("wache").unwrap();
        let units = profile_to_unit_configs(profile, "wache-test", &config.defaults).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].unit_id, UnitId(100));
        assert_eq!(units[0].intervals.idle(), Duration::from_secs(120));
        assert_eq!(units[1].intervals.active_alarm(), Duration::from_secs(15));
        assert_eq!(units[1].timeout, Duration::from_secs(5));
        assert_eq!(units[0].api_key.expose_secret(), "plain-key");
    }

    #[test]
    fn rejects_intervals_below_floor() {
        let (_dir, path) = write("[defaults]\nupdate_interval_data = 29\n");
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation { .. })
        ));

        let unit = UnitProfile {
            update_interval_alarm: Some(9),
            ..UnitProfile::new(1, "x")
        };
        assert!(unit.intervals(&Defaults::default()).is_err());
        let unit = UnitProfile {
            update_interval_alarm: Some(10),
            update_interval_data: Some(30),
            ..UnitProfile::new(1, "x")
        };
        assert!(unit.intervals(&Defaults::default()).is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                api_key_env: Some("DIVERA_TEST_KEY_UNSET".into()),
                units: vec![UnitProfile::new(7, "FF Test")],
                ..Profile::default()
            },
        );
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn profile_without_units_is_rejected() {
        let profile = Profile {
            api_key: Some("k".into()),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_unit_configs(&profile, "empty", &Defaults::default()),
            Err(ConfigError::NoUnits { .. })
        ));
    }
}
