use thiserror::Error;

/// Top-level error type for the `divera-api` crate.
///
/// Covers every failure mode of the Divera REST surface: authentication,
/// transport, request validation, server faults and payload decoding.
/// `divera-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials or API key rejected (HTTP 401/403, or a failed login).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    ///
    /// The request URL is stripped on conversion; it carries the access key.
    #[error("HTTP transport error: {0}")]
    Transport(reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Request rejected ────────────────────────────────────────────
    /// The server refused the submitted fields (HTTP 400/422).
    #[error("Request rejected by Divera (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    /// HTTP 2xx with `"success": false` in the envelope.
    #[error("Divera reported failure: {message}")]
    Rejected { message: String },

    /// Any other non-success 4xx status.
    #[error("Divera API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Server ──────────────────────────────────────────────────────
    /// HTTP 5xx from the Divera backend.
    #[error("Divera server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }
}

impl Error {
    /// Returns `true` if the credentials need to be replaced before
    /// further requests can succeed.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the API answered 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. } | Self::Api { status, .. } | Self::Server { status, .. } => {
                Some(*status)
            }
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
