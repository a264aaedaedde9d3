//! CLI configuration: thin wrapper around `divera_config` shared types.
//!
//! Adds resolution that respects the `--config` and `--profile` flags.

use std::path::PathBuf;

use divera_core::UnitConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use divera_config::{Config, Profile, UnitProfile};

/// Config file in effect: `--config` / `DIVERA_CONFIG`, else the platform
/// default.
pub fn path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(divera_config::config_path)
}

/// Load the config file; a missing file yields the defaults.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = path(global);
    if path.exists() {
        Ok(divera_config::load_config(&path)?)
    } else {
        Ok(Config::default())
    }
}

pub fn save(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    divera_config::save_config(cfg, &path(global))?;
    Ok(())
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    cfg.active_profile_name(global.profile.as_deref())
}

/// Runtime configs of every unit in the active profile.
pub fn unit_configs(global: &GlobalOpts) -> Result<(String, Vec<UnitConfig>), CliError> {
    let cfg = load(global)?;
    let name = active_profile_name(global, &cfg);
    let profile = cfg.profiles.get(&name).ok_or_else(|| CliError::ProfileNotFound {
        name: name.clone(),
        available: available_profiles(&cfg),
    })?;
    let units = divera_config::profile_to_unit_configs(profile, &name, &cfg.defaults)?;
    Ok((name, units))
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
