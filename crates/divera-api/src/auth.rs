// Account authentication and unit discovery.
//
// Divera issues a long-lived personal API key on login. Setup either
// exchanges username/password for that key or starts from a key the user
// already has; both paths end with the list of accessible units.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::client::{self, DiveraClient};
use crate::error::Error;
use crate::models::{LoginBody, LoginForm, UnitAccess};
use crate::transport::TransportConfig;

/// Credentials accepted during setup.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Divera account login, exchanged for the account's API key.
    Login {
        username: String,
        password: SecretString,
    },
    /// Personal or system-user API key.
    ApiKey(SecretString),
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_key: SecretString,
    pub units: Vec<UnitAccess>,
}

/// Exchange username/password for an API key (`POST auth/login`).
///
/// A failed login comes back as HTTP 200 with `success: false`; that is
/// reported as [`Error::Authentication`] with the vendor's error text.
pub async fn login(
    base_url: &Url,
    username: &str,
    password: &SecretString,
    transport: &TransportConfig,
) -> Result<Session, Error> {
    let http = transport.build_client()?;
    let url = client::api_url(base_url, "auth/login")?;
    debug!("POST {}", url.path());

    let body = LoginBody {
        login: LoginForm {
            username,
            password: password.expose_secret(),
            jwt: false,
        },
    };

    let resp = http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| client::map_send_error(e, transport.timeout.as_secs()))?;

    let data = client::parse_envelope(resp).await.map_err(|e| match e {
        Error::Rejected { message } | Error::Validation { message, .. } => {
            Error::Authentication { message }
        }
        other => other,
    })?;

    let api_key = data
        .pointer("/user/access_token")
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::Authentication {
            message: "login response carried no access token".into(),
        })?;

    let units = UnitAccess::from_login_list(data.get("ucr").unwrap_or(&Value::Null));
    info!(units = units.len(), "login succeeded");

    Ok(Session {
        api_key: SecretString::from(api_key.to_owned()),
        units,
    })
}

/// Run either authentication flow and return the key plus its units.
pub async fn authenticate(
    base_url: &Url,
    credentials: &Credentials,
    transport: &TransportConfig,
) -> Result<Session, Error> {
    match credentials {
        Credentials::Login { username, password } => {
            login(base_url, username, password, transport).await
        }
        Credentials::ApiKey(key) => {
            let client = DiveraClient::new(base_url.clone(), key.clone(), transport)?;
            let units = client.discover_units().await?;
            Ok(Session {
                api_key: key.clone(),
                units,
            })
        }
    }
}

impl DiveraClient {
    /// List the units this API key can access (`GET pull/all`, `data.ucr`).
    pub async fn discover_units(&self) -> Result<Vec<UnitAccess>, Error> {
        let url = self.api_url("pull/all")?;
        let data = self.get(url).await?;
        Ok(UnitAccess::from_pull_map(
            data.get("ucr").unwrap_or(&Value::Null),
        ))
    }
}
