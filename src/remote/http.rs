//! Shared HTTP plumbing for the remote clients: agent setup, status
//! checks, and OAuth access-token caching.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use crate::errors::{BackupError, Result};

pub type Response = ureq::http::Response<ureq::Body>;

/// Upper bound on any single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Refresh tokens this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

/// Blocking agent that hands back non-2xx responses instead of erroring,
/// so callers can inspect status and headers themselves.
pub fn agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a transport-level failure to a remote error.
pub fn transport_error(service: &'static str, what: &str, err: ureq::Error) -> BackupError {
    BackupError::Remote {
        service,
        message: format!("{what}: {err}"),
    }
}

/// Pass a 2xx response through, turn anything else into an error that
/// carries the status and the start of the body.
pub fn expect_success(service: &'static str, what: &str, mut resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let mut body = resp.body_mut().read_to_string().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(BackupError::Remote {
        service,
        message: format!("{what}: HTTP {} {body}", status.as_u16()),
    })
}

/// Decode a JSON response body.
pub fn read_json<T: DeserializeOwned>(
    service: &'static str,
    what: &str,
    mut resp: Response,
) -> Result<T> {
    resp.body_mut().read_json::<T>().map_err(|e| BackupError::Remote {
        service,
        message: format!("{what}: invalid response body: {e}"),
    })
}

/// OAuth2 token endpoint response (both Entra ID and SharePoint ACS).
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(deserialize_with = "seconds_from_number_or_string")]
    pub expires_in: u64,
}

/// ACS sends `expires_in` as a string, Entra ID as a number.
fn seconds_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A bearer token and the moment it stops being valid.
pub struct AccessToken {
    value: Zeroizing<String>,
    expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: String, lifetime: Duration) -> Self {
        Self {
            value: Zeroizing::new(value),
            expires_at: Instant::now() + lifetime,
        }
    }

    pub fn from_response(resp: TokenResponse) -> Self {
        Self::new(resp.access_token, Duration::from_secs(resp.expires_in))
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Holds the current token and fetches a new one when it is about to expire.
#[derive(Default)]
pub struct TokenCache {
    current: RefCell<Option<AccessToken>>,
}

impl TokenCache {
    pub fn get_or_fetch(
        &self,
        fetch: impl FnOnce() -> Result<AccessToken>,
    ) -> Result<Zeroizing<String>> {
        if let Some(token) = self.current.borrow().as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let token = fetch()?;
        let value = token.value.clone();
        *self.current.borrow_mut() = Some(token);
        Ok(value)
    }
}
