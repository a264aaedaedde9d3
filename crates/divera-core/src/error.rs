// ── Core error types ──
//
// User-facing errors from divera-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<divera_api::Error>`
// impl translates transport-layer errors into the poll/action taxonomy:
// authentication, connection, server, validation.

use thiserror::Error;

use crate::model::{RecordId, RecordKind, UnitId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Cannot reach Divera: {reason}")]
    Connection { reason: String },

    #[error("Divera did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Divera server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unit {unit} is not configured")]
    UnitNotFound { unit: UnitId },

    #[error("{kind} {id} not found in unit {unit}")]
    RecordNotFound {
        kind: RecordKind,
        id: RecordId,
        unit: UnitId,
    },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    /// Input rejected locally or by the server. `missing` lists required
    /// fields that were absent; it is empty for semantic rejections.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        missing: Vec<String>,
    },

    #[error("Permission '{permission}' is not granted for unit {unit}")]
    PermissionDenied { permission: String, unit: UnitId },

    #[error("No configured unit could be reached")]
    NoReachableUnit,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Validation failure listing absent required fields.
    pub fn missing_fields(missing: Vec<String>) -> Self {
        Self::Validation {
            message: format!("missing required field(s): {}", missing.join(", ")),
            missing,
        }
    }

    /// Semantic validation failure without missing fields.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    /// Credentials were rejected; polling must stop until they change.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// The unit could not be reached or answered with a server fault.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Server { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<divera_api::Error> for CoreError {
    fn from(err: divera_api::Error) -> Self {
        match err {
            divera_api::Error::Authentication { message } => CoreError::Authentication { message },
            divera_api::Error::Transport(e) => {
                let e = e.without_url();
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    CoreError::Connection {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            divera_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            divera_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            divera_api::Error::Tls(msg) => CoreError::Connection {
                reason: format!("TLS error: {msg}"),
            },
            divera_api::Error::Validation { message, .. } | divera_api::Error::Rejected { message } => {
                CoreError::Validation {
                    message,
                    missing: Vec::new(),
                }
            }
            divera_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            divera_api::Error::Server { status, message } => CoreError::Server { status, message },
            divera_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedPayload { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_into_taxonomy() {
        let auth = CoreError::from(divera_api::Error::Authentication {
            message: "expired".into(),
        });
        assert!(auth.is_auth());

        let server = CoreError::from(divera_api::Error::Server {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(server.is_connection());

        let rejected = CoreError::from(divera_api::Error::Rejected {
            message: "no".into(),
        });
        assert!(matches!(rejected, CoreError::Validation { .. }));
    }

    #[test]
    fn missing_fields_lists_every_field() {
        let err = CoreError::missing_fields(vec!["title".into(), "notification_type".into()]);
        assert_eq!(
            err.to_string(),
            "Validation failed: missing required field(s): title, notification_type"
        );
    }
}
