//! Config subcommand handlers.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext keys masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some("****".into());
        }
    }
    cfg
}

/// Prompt for a secret unless one was passed.
pub(crate) fn api_key_or_prompt(given: Option<String>) -> Result<SecretString, CliError> {
    let key = match given {
        Some(key) => key,
        None => rpassword::prompt_password("API key: ").map_err(CliError::prompt)?,
    };
    let key = key.trim().to_owned();
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "api_key".into(),
            reason: "API key cannot be empty".into(),
        });
    }
    Ok(SecretString::from(key))
}

/// Keep `key` in the keyring, or in the profile when `plaintext`.
pub(crate) fn store_key(
    cfg: &mut Config,
    profile_name: &str,
    key: &SecretString,
    plaintext: bool,
) -> Result<(), CliError> {
    let profile = cfg.profiles.entry(profile_name.to_owned()).or_default();
    if plaintext {
        profile.api_key = Some(key.expose_secret().to_owned());
    } else {
        divera_config::store_api_key(profile_name, key.expose_secret())?;
        profile.api_key = None;
    }
    Ok(())
}

#[derive(Serialize)]
struct ProfileEntry {
    name: String,
    default: bool,
    base_url: Option<String>,
    units: Vec<u64>,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Instance")]
    base_url: String,
    #[tabled(rename = "Units")]
    units: String,
}

impl From<&ProfileEntry> for ProfileRow {
    fn from(p: &ProfileEntry) -> Self {
        Self {
            marker: if p.default { "*" } else { "" },
            name: p.name.clone(),
            base_url: p
                .base_url
                .clone()
                .unwrap_or_else(|| divera_api::DEFAULT_BASE_URL.into()),
            units: p
                .units
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;

    match args.command {
        ConfigCommand::Show => {
            let out = output::render_single(
                &global.output,
                &redacted(&cfg),
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |_| config::path(global).display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let active = config::active_profile_name(global, &cfg);
            let entries: Vec<ProfileEntry> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileEntry {
                    name: name.clone(),
                    default: *name == active,
                    base_url: p.base_url.clone(),
                    units: p.units.iter().map(|u| u.ucr_id).collect(),
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &entries,
                |p| ProfileRow::from(p),
                |p| p.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save(global, &cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetIntervals { unit, data, alarm } => {
            if data.is_none() && alarm.is_none() {
                return Err(CliError::Validation {
                    field: "intervals".into(),
                    reason: "pass --data and/or --alarm".into(),
                });
            }
            let profile_name = config::active_profile_name(global, &cfg);
            let defaults = cfg.defaults.clone();

            let (idle, active) = match unit.unit {
                Some(ucr_id) => {
                    let profile = cfg.profiles.get_mut(&profile_name).ok_or_else(|| {
                        CliError::ProfileNotFound {
                            name: profile_name.clone(),
                            available: String::new(),
                        }
                    })?;
                    let entry = profile
                        .units
                        .iter_mut()
                        .find(|u| u.ucr_id == ucr_id)
                        .ok_or_else(|| CliError::NotFound {
                            resource_type: "unit".into(),
                            identifier: ucr_id.to_string(),
                            list_command: "config profiles".into(),
                        })?;
                    if data.is_some() {
                        entry.update_interval_data = data;
                    }
                    if alarm.is_some() {
                        entry.update_interval_alarm = alarm;
                    }
                    let intervals = entry.intervals(&defaults)?;
                    (intervals.idle(), intervals.active_alarm())
                }
                None => {
                    if let Some(secs) = data {
                        cfg.defaults.update_interval_data = secs;
                    }
                    if let Some(secs) = alarm {
                        cfg.defaults.update_interval_alarm = secs;
                    }
                    let intervals = divera_config::validate_intervals(
                        cfg.defaults.update_interval_data,
                        cfg.defaults.update_interval_alarm,
                    )
                    .map_err(|reason| CliError::Validation {
                        field: "intervals".into(),
                        reason,
                    })?;
                    (intervals.idle(), intervals.active_alarm())
                }
            };

            config::save(global, &cfg)?;
            if !global.quiet {
                eprintln!(
                    "Intervals set: {} idle, {} while an alarm is open",
                    humantime::format_duration(idle),
                    humantime::format_duration(active)
                );
            }
            Ok(())
        }

        ConfigCommand::SetKey { api_key, plaintext } => {
            let profile_name = config::active_profile_name(global, &cfg);
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name: profile_name,
                });
            }
            let key = api_key_or_prompt(api_key)?;
            store_key(&mut cfg, &profile_name, &key, plaintext)?;
            config::save(global, &cfg)?;
            if !global.quiet {
                eprintln!("API key updated for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}
