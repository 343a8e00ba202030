//! SharePoint document library client (REST API, app-only ACS auth).
//!
//! Remote paths are server-relative folders: `remote_root` is taken
//! relative to the site (e.g. `Shared Documents/Backups`) unless it
//! starts with `/`, in which case it is used as-is.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use super::http::{self, AccessToken, TokenCache, TokenResponse};
use super::RemoteStorage;
use crate::errors::{BackupError, Result};

const SERVICE: &str = "SharePoint";
const DEFAULT_ACS_HOST: &str = "https://accounts.accesscontrol.windows.net";
const ODATA_JSON: &str = "application/json;odata=nometadata";

/// Tenant realm and SharePoint principal id, discovered once per client.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AcsRealm {
    realm: String,
    principal: String,
}

pub struct SharePointClient {
    agent: ureq::Agent,
    site_url: Url,
    client_id: String,
    client_secret: Zeroizing<String>,
    acs_host: String,
    realm: RefCell<Option<AcsRealm>>,
    token: TokenCache,
}

impl SharePointClient {
    pub fn new(site_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        let site_url = Url::parse(site_url.trim_end_matches('/'))
            .map_err(|e| BackupError::Config(format!("invalid SharePoint URL {site_url}: {e}")))?;
        if site_url.cannot_be_a_base() || site_url.host_str().is_none() {
            return Err(BackupError::Config(format!(
                "invalid SharePoint URL {site_url}: expected https://<host>/<site path>"
            )));
        }

        Ok(Self {
            agent: http::agent(),
            site_url,
            client_id: client_id.to_string(),
            client_secret: Zeroizing::new(client_secret.to_string()),
            acs_host: DEFAULT_ACS_HOST.to_string(),
            realm: RefCell::new(None),
            token: TokenCache::default(),
        })
    }

    /// Use a different ACS endpoint (sovereign clouds, local mocks).
    pub fn with_acs_host(mut self, acs_host: &str) -> Self {
        self.acs_host = acs_host.trim_end_matches('/').to_string();
        self
    }

    /// Ask the site who issues its tokens: an anonymous bearer request is
    /// answered with `401` and a `WWW-Authenticate` header naming the realm.
    fn realm(&self) -> Result<AcsRealm> {
        if let Some(realm) = self.realm.borrow().as_ref() {
            return Ok(realm.clone());
        }

        let url = self.api_url(&["_vti_bin", "client.svc"]);
        let resp = self
            .agent
            .get(url.as_str())
            .header("Authorization", "Bearer")
            .call()
            .map_err(|e| http::transport_error(SERVICE, "realm discovery", e))?;

        let realm = resp
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_www_authenticate)
            .ok_or_else(|| {
                BackupError::sharepoint(format!(
                    "realm discovery: no bearer realm in response (HTTP {})",
                    resp.status().as_u16()
                ))
            })?;

        debug!(realm = %realm.realm, "discovered SharePoint realm");
        *self.realm.borrow_mut() = Some(realm.clone());
        Ok(realm)
    }

    fn token_url(&self, realm: &str) -> String {
        format!("{}/{realm}/tokens/OAuth/2", self.acs_host)
    }

    fn access_token(&self) -> Result<Zeroizing<String>> {
        self.token.get_or_fetch(|| {
            let AcsRealm { realm, principal } = self.realm()?;
            let host = self.site_url.host_str().unwrap_or_default();
            let url = self.token_url(&realm);
            let client_id = format!("{}@{realm}", self.client_id);
            let resource = format!("{principal}/{host}@{realm}");

            let resp = self
                .agent
                .post(&url)
                .send_form([
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("resource", resource.as_str()),
                ])
                .map_err(|e| http::transport_error(SERVICE, "token request", e))?;
            let resp = http::expect_success(SERVICE, "token request", resp)?;
            let token: TokenResponse = http::read_json(SERVICE, "token request", resp)?;
            Ok(AccessToken::from_response(token))
        })
    }

    /// Site URL with extra path segments appended.
    fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.site_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Site URL + REST path + `@alias='value'` query parameters.
    fn rest_url(&self, segments: &[&str], aliases: &[(&str, &str)]) -> Url {
        let mut url = self.api_url(segments);
        let query = aliases
            .iter()
            .map(|(name, value)| format!("{name}={}", encode_query_value(&quote_odata(value))))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
        url
    }

    /// Server-relative path of `<remote_root>/<relative>`.
    fn server_relative(&self, remote_root: &str, relative: &str) -> String {
        let root = remote_root.trim_matches('/');
        let mut path = if remote_root.starts_with('/') {
            String::new()
        } else {
            self.site_url.path().trim_end_matches('/').to_string()
        };

        for part in [root, relative.trim_matches('/')] {
            if !part.is_empty() {
                path.push('/');
                path.push_str(part);
            }
        }
        path
    }

    fn post(&self, url: &Url, body: &[u8], what: &str) -> Result<()> {
        let token = self.access_token()?;
        let resp = self
            .agent
            .post(url.as_str())
            .header("Authorization", format!("Bearer {}", token.as_str()))
            .header("Accept", ODATA_JSON)
            .send(body)
            .map_err(|e| http::transport_error(SERVICE, what, e))?;
        http::expect_success(SERVICE, what, resp)?;
        Ok(())
    }
}

impl RemoteStorage for SharePointClient {
    fn ensure_dir(&self, remote_root: &str, relative_dir: &str) -> Result<()> {
        // Folders.add only creates the last segment, so walk down the path.
        let mut current = String::new();
        for segment in relative_dir.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);

            let folder = self.server_relative(remote_root, &current);
            let url = self.rest_url(&["_api", "web", "folders", "add(@u)"], &[("@u", &folder)]);
            self.post(&url, &[], "create folder")?;
            debug!(folder, "folder ensured");
        }
        Ok(())
    }

    fn upload_file(&self, remote_root: &str, relative_dir: &str, local_file: &Path) -> Result<()> {
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BackupError::sharepoint(format!("invalid file name: {}", local_file.display()))
            })?;
        let bytes = fs::read(local_file)?;

        let folder = self.server_relative(remote_root, relative_dir);
        let url = self.rest_url(
            &[
                "_api",
                "web",
                "GetFolderByServerRelativeUrl(@f)",
                "Files",
                "add(url=@n,overwrite=true)",
            ],
            &[("@f", &folder), ("@n", file_name)],
        );
        self.post(&url, &bytes, "upload file")?;
        debug!(folder, file = file_name, bytes = bytes.len(), "file uploaded");
        Ok(())
    }
}

/// Extract `realm` and `client_id` from
/// `Bearer realm="<guid>",client_id="<principal>",trusted_issuers="..."`.
fn parse_www_authenticate(header: &str) -> Option<AcsRealm> {
    let params = header.trim().strip_prefix("Bearer")?;
    let mut realm = None;
    let mut principal = None;

    for pair in params.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "realm" => realm = Some(value),
            "client_id" => principal = Some(value),
            _ => {}
        }
    }

    Some(AcsRealm {
        realm: realm.filter(|r| !r.is_empty())?,
        principal: principal.filter(|p| !p.is_empty())?,
    })
}

/// OData string literal: wrap in single quotes, double embedded ones.
fn quote_odata(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
