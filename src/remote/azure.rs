//! Azure Key Vault reader over the REST API.
//!
//! Authenticates with the client-credentials flow against Entra ID and
//! reads secrets through `https://<vault>.vault.azure.net`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use super::http::{self, AccessToken, TokenCache, TokenResponse};
use super::VaultReader;
use crate::errors::{BackupError, Result};
use crate::inventory::SecretVersionRecord;

const SERVICE: &str = "Key Vault";
const API_VERSION: &str = "7.4";
const SCOPE: &str = "https://vault.azure.net/.default";
const DEFAULT_LOGIN_HOST: &str = "https://login.microsoftonline.com";

/// One page of a Key Vault list operation.
#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

/// A secret or secret-version item as returned by the list endpoints.
#[derive(Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: Attributes,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    managed: Option<bool>,
}

/// Version attributes; timestamps are Unix seconds.
#[derive(Default, Deserialize)]
struct Attributes {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    updated: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Key Vault client shared by every configured vault of one tenant.
pub struct AzureKeyVaultClient {
    agent: ureq::Agent,
    tenant_id: String,
    client_id: String,
    client_secret: Zeroizing<String>,
    login_host: String,
    vault_host_override: Option<String>,
    token: TokenCache,
}

impl AzureKeyVaultClient {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            agent: http::agent(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: Zeroizing::new(client_secret.to_string()),
            login_host: DEFAULT_LOGIN_HOST.to_string(),
            vault_host_override: None,
            token: TokenCache::default(),
        }
    }

    /// Use another Entra ID login endpoint (sovereign clouds, local mocks).
    pub fn with_login_host(mut self, login_host: &str) -> Self {
        self.login_host = login_host.trim_end_matches('/').to_string();
        self
    }

    /// Replace `https://<vault>.vault.azure.net` with `base` for every vault.
    pub fn with_vault_base_url(mut self, base: &str) -> Self {
        self.vault_host_override = Some(base.trim_end_matches('/').to_string());
        self
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_host, self.tenant_id)
    }

    fn access_token(&self) -> Result<Zeroizing<String>> {
        self.token.get_or_fetch(|| {
            let url = self.token_url();
            debug!(tenant = %self.tenant_id, "requesting Key Vault access token");

            let resp = self
                .agent
                .post(&url)
                .send_form([
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", SCOPE),
                ])
                .map_err(|e| http::transport_error(SERVICE, "token request", e))?;
            let resp = http::expect_success(SERVICE, "token request", resp)?;
            let token: TokenResponse = http::read_json(SERVICE, "token request", resp)?;
            Ok(AccessToken::from_response(token))
        })
    }

    /// `https://<vault>.vault.azure.net/secrets/<segments...>?api-version=7.4`
    fn vault_url(&self, vault: &str, segments: &[&str]) -> Result<Url> {
        let base = match &self.vault_host_override {
            Some(base) => base.clone(),
            None => format!("https://{vault}.vault.azure.net"),
        };
        let mut url = Url::parse(&base)
            .map_err(|e| BackupError::Config(format!("invalid vault URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| BackupError::Config(format!("vault URL {base} cannot be a base")))?
            .pop_if_empty()
            .push("secrets")
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    fn get(&self, url: &str, what: &str) -> Result<http::Response> {
        let token = self.access_token()?;
        let resp = self
            .agent
            .get(url)
            .header("Authorization", format!("Bearer {}", token.as_str()))
            .call()
            .map_err(|e| http::transport_error(SERVICE, what, e))?;
        http::expect_success(SERVICE, what, resp)
    }

    /// Follow `nextLink` until the listing is exhausted.
    fn list_all(&self, first: Url, what: &str) -> Result<Vec<SecretItem>> {
        let mut items = Vec::new();
        let mut next = Some(first.to_string());

        while let Some(url) = next {
            let page: Page = http::read_json(SERVICE, what, self.get(&url, what)?)?;
            items.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(items)
    }
}

impl VaultReader for AzureKeyVaultClient {
    fn list_secret_names(&self, vault: &str) -> Result<BTreeSet<String>> {
        let url = self.vault_url(vault, &[])?;
        let items = self.list_all(url, "list secrets")?;

        items
            .iter()
            .map(|item| id_segment(&item.id, 0))
            .collect::<Result<BTreeSet<_>>>()
    }

    fn get_version_metadata(&self, vault: &str, secret: &str) -> Result<Vec<SecretVersionRecord>> {
        let url = self.vault_url(vault, &[secret, "versions"])?;
        let items = self.list_all(url, "list secret versions")?;

        items.into_iter().map(version_record).collect()
    }

    fn get_version_value(
        &self,
        vault: &str,
        secret: &str,
        version: &str,
    ) -> Result<Zeroizing<String>> {
        let url = self.vault_url(vault, &[secret, version])?;
        let bundle: SecretBundle =
            http::read_json(SERVICE, "get secret", self.get(url.as_str(), "get secret")?)?;
        Ok(Zeroizing::new(bundle.value))
    }
}

/// Pick a segment after `/secrets/` out of an item id such as
/// `https://v.vault.azure.net/secrets/<name>/<version>`.
fn id_segment(id: &str, index: usize) -> Result<String> {
    let url = Url::parse(id).map_err(|e| BackupError::key_vault(format!("bad item id {id}: {e}")))?;
    url.path_segments()
        .and_then(|mut segments| {
            segments.find(|s| *s == "secrets")?;
            segments.nth(index)
        })
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BackupError::key_vault(format!("unexpected item id {id}")))
}

fn version_record(item: SecretItem) -> Result<SecretVersionRecord> {
    Ok(SecretVersionRecord {
        version: id_segment(&item.id, 1)?,
        enabled: item.attributes.enabled.unwrap_or(false),
        content_type: item.content_type,
        created_on: iso_timestamp(item.attributes.created),
        updated_on: iso_timestamp(item.attributes.updated),
        not_before: iso_timestamp(item.attributes.nbf),
        expires_on: iso_timestamp(item.attributes.exp),
        tags: item.tags,
        managed: item.managed.unwrap_or(false),
    })
}

/// Unix seconds to `2024-01-31T12:00:00+00:00`.
fn iso_timestamp(secs: Option<i64>) -> Option<String> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.to_rfc3339())
}
