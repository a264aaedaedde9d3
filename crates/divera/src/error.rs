//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use divera_config::ConfigError;
use divera_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach Divera: {reason}")]
    #[diagnostic(
        code(divera::connection_failed),
        help(
            "Check network access to the Divera instance.\n\
             Self-hosted instances: verify base_url and ca_cert in your profile."
        )
    )]
    ConnectionFailed { reason: String },

    #[error("None of the configured units could be polled")]
    #[diagnostic(
        code(divera::no_reachable_unit),
        help("Run with -v for details, or: divera diagnostics")
    )]
    NoReachableUnit,

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(divera::timeout),
        help("Increase `timeout` in the profile or check the instance's responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(divera::auth_failed),
        help(
            "The API key was rejected. Store a new one with:\n\
             divera config set-key"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(divera::no_credentials),
        help(
            "Run: divera setup --profile {profile}\n\
             Or set api_key_env in the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(divera::not_found),
        help("Run: divera {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Permission '{permission}' is not granted for unit {unit}")]
    #[diagnostic(
        code(divera::permission_denied),
        help("Ask a unit administrator to grant the permission to this account.")
    )]
    PermissionDenied { permission: String, unit: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("Divera error: {message}")]
    #[diagnostic(code(divera::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(divera::validation))]
    Validation { field: String, reason: String },

    #[error("Missing required field(s): {fields}")]
    #[diagnostic(
        code(divera::missing_fields),
        help("See: divera call --help")
    )]
    MissingFields { fields: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(divera::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: divera setup --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Profile '{profile}' has no units")]
    #[diagnostic(
        code(divera::no_units),
        help("Run: divera setup --profile {profile}")
    )]
    NoUnits { profile: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(divera::config))]
    Config { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(divera::json), help("Check the JSON data and try again."))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NoReachableUnit => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::Validation { .. } | Self::MissingFields { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    pub(crate) fn prompt(err: impl std::fmt::Display) -> Self {
        Self::Validation {
            field: "interactive".into(),
            reason: format!("prompt failed: {err}"),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message } => CliError::AuthFailed { message },

            CoreError::Connection { reason } => CliError::ConnectionFailed { reason },

            CoreError::Server { status, message } => CliError::ConnectionFailed {
                reason: format!("HTTP {status}: {message}"),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NoReachableUnit => CliError::NoReachableUnit,

            CoreError::UnitNotFound { unit } => CliError::NotFound {
                resource_type: "unit".into(),
                identifier: unit.to_string(),
                list_command: "status".into(),
            },

            CoreError::RecordNotFound { kind, id, unit } => CliError::NotFound {
                resource_type: kind.to_string(),
                identifier: id.to_string(),
                list_command: format!("entities --unit {unit} --kind {kind}"),
            },

            CoreError::Validation { missing, .. } if !missing.is_empty() => {
                CliError::MissingFields {
                    fields: missing.join(", "),
                }
            }

            CoreError::Validation { message, .. } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::PermissionDenied { permission, unit } => CliError::PermissionDenied {
                permission,
                unit: unit.to_string(),
            },

            CoreError::MalformedPayload { message } | CoreError::Api { message, .. } => {
                CliError::ApiError { message }
            }

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

impl From<divera_api::Error> for CliError {
    fn from(err: divera_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::NoUnits { profile } => CliError::NoUnits { profile },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
