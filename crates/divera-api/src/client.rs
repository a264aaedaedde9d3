// Divera HTTP client
//
// Wraps `reqwest::Client` with Divera URL construction, access-key
// injection and envelope unwrapping. Endpoint families (pull, alarms,
// vehicles, messages, news) are inherent methods in sibling modules so this
// file stays focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::Envelope;
use crate::transport::TransportConfig;

/// Public Divera 24/7 instance.
pub const DEFAULT_BASE_URL: &str = "https://app.divera247.com/";

const API_PREFIX: &str = "api/v2";
const ACCESS_KEY_PARAM: &str = "accesskey";

/// Raw HTTP client for one Divera API key.
///
/// The key is appended as `accesskey` query parameter to every request and
/// never written to logs; request logging uses the URL path only.
pub struct DiveraClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    timeout_secs: u64,
}

impl DiveraClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base_url,
            api_key,
            timeout_secs: TransportConfig::default().timeout.as_secs(),
        }
    }

    /// The Divera base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/v2/{path}?accesskey=...`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let mut url = api_url(&self.base_url, path)?;
        url.query_pairs_mut()
            .append_pair(ACCESS_KEY_PARAM, self.api_key.expose_secret());
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and unwrap the envelope.
    pub(crate) async fn get(&self, url: Url) -> Result<Value, Error> {
        debug!("GET {}", url.path());

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        parse_envelope(resp).await
    }

    /// Send a POST request with JSON body and unwrap the envelope.
    pub(crate) async fn post(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<Value, Error> {
        debug!("POST {}", url.path());

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        parse_envelope(resp).await
    }

    /// Send a PUT request with JSON body and unwrap the envelope.
    pub(crate) async fn put(&self, url: Url, body: &(impl Serialize + Sync)) -> Result<Value, Error> {
        debug!("PUT {}", url.path());

        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        parse_envelope(resp).await
    }
}

/// Build `{base}/api/v2/{path}` without credentials.
pub(crate) fn api_url(base_url: &Url, path: &str) -> Result<Url, Error> {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{API_PREFIX}/{path}"))?)
}

pub(crate) fn map_send_error(err: reqwest::Error, timeout_secs: u64) -> Error {
    if err.is_timeout() {
        Error::Timeout { timeout_secs }
    } else {
        Error::from(err)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Classify the HTTP status, then parse the `{ success, data }` envelope.
///
/// Returns `data` on success. Authentication failures (401/403) and
/// validation failures (400/422) carry the vendor's error text when the
/// body has one.
pub(crate) async fn parse_envelope(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::from)?;

    let vendor_message = || {
        serde_json::from_str::<Envelope>(&body)
            .map(|env| env.error_message())
            .unwrap_or_else(|_| format!("HTTP {status}: {}", preview(&body)))
    };

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: vendor_message(),
        });
    }

    if status == reqwest::StatusCode::BAD_REQUEST
        || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
    {
        return Err(Error::Validation {
            status: status.as_u16(),
            message: vendor_message(),
        });
    }

    if status.is_server_error() {
        return Err(Error::Server {
            status: status.as_u16(),
            message: preview(&body),
        });
    }

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: vendor_message(),
        });
    }

    let envelope: Envelope = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })?;

    if envelope.success == Some(false) {
        return Err(Error::Rejected {
            message: envelope.error_message(),
        });
    }

    Ok(envelope.data)
}
