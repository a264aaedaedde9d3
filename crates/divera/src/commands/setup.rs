//! Account setup: authenticate, pick units, persist the profile.

use std::io::IsTerminal;
use std::time::Duration;

use dialoguer::MultiSelect;
use secrecy::SecretString;
use tracing::info;
use url::Url;

use divera_api::{Credentials, TransportConfig, UnitAccess};

use crate::cli::{GlobalOpts, SetupArgs};
use crate::config::{self, Config, UnitProfile};
use crate::error::CliError;

use super::config_cmd;

fn base_url(raw: Option<&str>) -> Result<Url, CliError> {
    raw.unwrap_or(divera_api::DEFAULT_BASE_URL)
        .parse()
        .map_err(|e| CliError::Validation {
            field: "base_url".into(),
            reason: format!("{e}"),
        })
}

fn credentials(args: &SetupArgs) -> Result<Credentials, CliError> {
    if let Some(ref username) = args.username {
        let password = rpassword::prompt_password("Password: ").map_err(CliError::prompt)?;
        if password.is_empty() {
            return Err(CliError::Validation {
                field: "password".into(),
                reason: "password cannot be empty".into(),
            });
        }
        return Ok(Credentials::Login {
            username: username.clone(),
            password: SecretString::from(password),
        });
    }
    let key = match args.api_key.clone() {
        Some(key) => Some(key),
        None if std::io::stdin().is_terminal() => None,
        None => {
            return Err(CliError::Validation {
                field: "credentials".into(),
                reason: "pass --username or --api-key when not running interactively".into(),
            });
        }
    };
    Ok(Credentials::ApiKey(config_cmd::api_key_or_prompt(key)?))
}

/// Units to poll: the `--unit` list, the only unit, or an interactive pick.
///
/// Accounts with several units never get a silent default.
fn select_units(available: &[UnitAccess], requested: &[u64]) -> Result<Vec<UnitAccess>, CliError> {
    if !requested.is_empty() {
        return requested
            .iter()
            .map(|id| {
                available
                    .iter()
                    .find(|u| u.ucr_id == *id)
                    .cloned()
                    .ok_or_else(|| CliError::NotFound {
                        resource_type: "unit".into(),
                        identifier: id.to_string(),
                        list_command: "setup".into(),
                    })
            })
            .collect();
    }
    match available {
        [] => Err(CliError::Validation {
            field: "account".into(),
            reason: "this account has no units".into(),
        }),
        [only] => Ok(vec![only.clone()]),
        several if std::io::stdin().is_terminal() => {
            let labels: Vec<String> = several
                .iter()
                .map(|u| format!("{} ({})", u.name, u.ucr_id))
                .collect();
            let picked = MultiSelect::new()
                .with_prompt("Units to poll")
                .items(&labels)
                .interact()
                .map_err(CliError::prompt)?;
            if picked.is_empty() {
                return Err(CliError::Validation {
                    field: "unit".into(),
                    reason: "select at least one unit".into(),
                });
            }
            Ok(picked.into_iter().map(|i| several[i].clone()).collect())
        }
        several => Err(CliError::Validation {
            field: "unit".into(),
            reason: format!(
                "account has {} units; choose with --unit {}",
                several.len(),
                several
                    .iter()
                    .map(|u| u.ucr_id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }),
    }
}

/// Units already polled by another profile.
fn claimed_elsewhere(cfg: &Config, profile_name: &str, unit: u64) -> Option<String> {
    cfg.profiles
        .iter()
        .filter(|(name, _)| name.as_str() != profile_name)
        .find(|(_, p)| p.units.iter().any(|u| u.ucr_id == unit))
        .map(|(name, _)| name.clone())
}

pub async fn handle(args: SetupArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    let profile_name = config::active_profile_name(global, &cfg);
    let existing_url = cfg
        .profiles
        .get(&profile_name)
        .and_then(|p| p.base_url.clone());
    let url = base_url(args.base_url.as_deref().or(existing_url.as_deref()))?;

    let creds = credentials(&args)?;
    let transport = TransportConfig::with_timeout(Duration::from_secs(cfg.defaults.timeout));
    let session = divera_api::authenticate(&url, &creds, &transport).await?;
    let selected = select_units(&session.units, &args.units)?;

    for unit in &selected {
        if let Some(other) = claimed_elsewhere(&cfg, &profile_name, unit.ucr_id) {
            return Err(CliError::Validation {
                field: "unit".into(),
                reason: format!("unit {} is already configured in profile '{other}'", unit.ucr_id),
            });
        }
    }

    config_cmd::store_key(&mut cfg, &profile_name, &session.api_key, args.plaintext)?;
    let profile = cfg.profiles.entry(profile_name.clone()).or_default();
    if args.base_url.is_some() {
        profile.base_url = Some(url.to_string());
    }
    if let Credentials::Login { ref username, .. } = creds {
        profile.username = Some(username.clone());
    }
    for unit in &selected {
        // Re-running setup keeps per-unit interval overrides.
        match profile.units.iter_mut().find(|u| u.ucr_id == unit.ucr_id) {
            Some(existing) => existing.name.clone_from(&unit.name),
            None => profile.units.push(UnitProfile::new(unit.ucr_id, unit.name.clone())),
        }
    }
    if cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.clone());
    }
    config::save(global, &cfg)?;
    info!(profile = %profile_name, units = selected.len(), "setup saved");

    if !global.quiet {
        for unit in &selected {
            eprintln!("   ✓ {} ({})", unit.name, unit.ucr_id);
        }
        eprintln!("Profile '{profile_name}' saved to {}", config::path(global).display());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn unit(id: u64, name: &str) -> UnitAccess {
        UnitAccess {
            ucr_id: id,
            name: name.into(),
            usergroup_id: Some(4),
        }
    }

    #[test]
    fn single_unit_is_selected_without_asking() {
        let picked = select_units(&[unit(1, "FF Test")], &[]).unwrap();
        assert_eq!(picked, vec![unit(1, "FF Test")]);
    }

    #[test]
    fn requested_units_must_exist() {
        let available = [unit(1, "FF A"), unit(2, "FF B")];
        assert_eq!(
            select_units(&available, &[2]).unwrap(),
            vec![unit(2, "FF B")]
        );
        assert!(matches!(
            select_units(&available, &[3]),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn account_without_units_is_rejected() {
        assert!(matches!(
            select_units(&[], &[]),
            Err(CliError::Validation { .. })
        ));
    }
}
