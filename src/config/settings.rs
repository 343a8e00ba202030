use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::errors::{BackupError, Result};

/// Runtime settings as given on the command line or in the environment.
///
/// Everything is optional at parse time so that a missing value can be
/// reported by its environment variable name.
#[derive(clap::Args, Default)]
pub struct SettingsArgs {
    /// Password protecting the archive files
    #[arg(long, global = true, env = "KEYVAULT_BACKUP_PASSWORD", hide_env_values = true)]
    pub backup_password: Option<String>,

    /// Entra ID tenant of the Key Vault service principal
    #[arg(long, global = true, env = "KEYVAULT_TENANT_ID")]
    pub keyvault_tenant_id: Option<String>,

    /// Client id of the Key Vault service principal
    #[arg(long, global = true, env = "KEYVAULT_CLIENT_ID")]
    pub keyvault_client_id: Option<String>,

    /// Client secret of the Key Vault service principal
    #[arg(long, global = true, env = "KEYVAULT_CLIENT_SECRET", hide_env_values = true)]
    pub keyvault_client_secret: Option<String>,

    /// SharePoint site URL (e.g. https://contoso.sharepoint.com/sites/ops)
    #[arg(long, global = true, env = "SHAREPOINT_URL")]
    pub sharepoint_url: Option<String>,

    /// Target folder within the site (e.g. "Shared Documents/Backups")
    #[arg(long, global = true, env = "SHAREPOINT_DIR")]
    pub sharepoint_dir: Option<String>,

    /// SharePoint app-only client id
    #[arg(long, global = true, env = "SHAREPOINT_CLIENT_ID")]
    pub sharepoint_client_id: Option<String>,

    /// SharePoint app-only client secret
    #[arg(long, global = true, env = "SHAREPOINT_CLIENT_SECRET", hide_env_values = true)]
    pub sharepoint_client_secret: Option<String>,

    /// JSON file listing the vault names to back up
    #[arg(long, global = true, env = "PATH_CONFIG")]
    pub path_config: Option<PathBuf>,

    /// Directory for the per-vault inventory cache
    #[arg(long, global = true, env = "PATH_CACHE")]
    pub path_cache: Option<PathBuf>,

    /// Directory where archives wait for upload
    #[arg(long, global = true, env = "PATH_ARCHIVE")]
    pub path_archive: Option<PathBuf>,

    /// Entra ID login endpoint (sovereign clouds, test doubles)
    #[arg(long, global = true, env = "KEYVAULT_LOGIN_HOST")]
    pub keyvault_login_host: Option<String>,

    /// Base URL used for every vault instead of https://<vault>.vault.azure.net
    #[arg(long, global = true, env = "KEYVAULT_BASE_URL")]
    pub keyvault_base_url: Option<String>,

    /// SharePoint ACS token endpoint
    #[arg(long, global = true, env = "SHAREPOINT_ACS_HOST")]
    pub sharepoint_acs_host: Option<String>,
}

/// Key Vault service principal.
pub struct KeyVaultSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub login_host: Option<String>,
    pub base_url: Option<String>,
}

/// SharePoint target and app-only credentials.
pub struct SharePointSettings {
    pub url: String,
    pub dir: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub acs_host: Option<String>,
}

/// Validated settings for a backup run.
pub struct Settings {
    pub backup_password: Zeroizing<String>,
    pub keyvault: KeyVaultSettings,
    pub sharepoint: SharePointSettings,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl Settings {
    /// Check that every required value is present.  The first missing one
    /// is reported by its environment variable name.
    pub fn from_args(args: &SettingsArgs) -> Result<Self> {
        Ok(Self {
            backup_password: Zeroizing::new(required(
                &args.backup_password,
                "KEYVAULT_BACKUP_PASSWORD",
            )?),
            keyvault: KeyVaultSettings {
                tenant_id: required(&args.keyvault_tenant_id, "KEYVAULT_TENANT_ID")?,
                client_id: required(&args.keyvault_client_id, "KEYVAULT_CLIENT_ID")?,
                client_secret: Zeroizing::new(required(
                    &args.keyvault_client_secret,
                    "KEYVAULT_CLIENT_SECRET",
                )?),
                login_host: optional(&args.keyvault_login_host),
                base_url: optional(&args.keyvault_base_url),
            },
            sharepoint: SharePointSettings {
                url: required(&args.sharepoint_url, "SHAREPOINT_URL")?,
                dir: required(&args.sharepoint_dir, "SHAREPOINT_DIR")?,
                client_id: required(&args.sharepoint_client_id, "SHAREPOINT_CLIENT_ID")?,
                client_secret: Zeroizing::new(required(
                    &args.sharepoint_client_secret,
                    "SHAREPOINT_CLIENT_SECRET",
                )?),
                acs_host: optional(&args.sharepoint_acs_host),
            },
            config_path: required_path(&args.path_config, "PATH_CONFIG")?,
            cache_dir: required_path(&args.path_cache, "PATH_CACHE")?,
            archive_dir: required_path(&args.path_archive, "PATH_ARCHIVE")?,
        })
    }

    /// Create the cache and archive directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::create_dir_all(&self.archive_dir)?;
        Ok(())
    }
}

fn required(value: &Option<String>, key: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(BackupError::MissingSetting(key)),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_path(value: &Option<PathBuf>, key: &'static str) -> Result<PathBuf> {
    match value {
        Some(p) if !p.as_os_str().is_empty() => Ok(p.clone()),
        _ => Err(BackupError::MissingSetting(key)),
    }
}

/// Load the list of vault names from a JSON array of strings.
///
/// Names are validated because each one becomes both a host name label
/// (`<vault>.vault.azure.net`) and a directory name.
pub fn load_vault_names(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(BackupError::ConfigFileNotFound(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path)?;
    let names: Vec<String> = serde_json::from_str(&contents).map_err(|e| {
        BackupError::Config(format!(
            "Failed to parse {}: expected a JSON array of vault names: {e}",
            path.display()
        ))
    })?;

    let mut seen = BTreeSet::new();
    for name in &names {
        validate_vault_name(name)?;
        if !seen.insert(name.as_str()) {
            return Err(BackupError::Config(format!(
                "vault '{name}' is listed more than once in {}",
                path.display()
            )));
        }
    }

    Ok(names)
}

/// Validate a Key Vault name.
///
/// Allowed: 3–24 ASCII letters, digits and hyphens, starting with a
/// letter, ending with a letter or digit, no consecutive hyphens.
pub fn validate_vault_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| BackupError::InvalidName {
        name: name.to_string(),
        reason: format!("vault name {reason}"),
    };

    if !(3..=24).contains(&name.len()) {
        return Err(invalid("must be 3-24 characters long"));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(invalid(
            "may only contain ASCII letters, digits, and hyphens",
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid("must start with a letter"));
    }
    if name.ends_with('-') {
        return Err(invalid("cannot end with a hyphen"));
    }
    if name.contains("--") {
        return Err(invalid("cannot contain consecutive hyphens"));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn complete_args() -> SettingsArgs {
        SettingsArgs {
            backup_password: Some("backup-pw".into()),
            keyvault_tenant_id: Some("tenant".into()),
            keyvault_client_id: Some("kv-client".into()),
            keyvault_client_secret: Some("kv-secret".into()),
            sharepoint_url: Some("https://contoso.sharepoint.com/sites/ops".into()),
            sharepoint_dir: Some("Shared Documents/Backups".into()),
            sharepoint_client_id: Some("sp-client".into()),
            sharepoint_client_secret: Some("sp-secret".into()),
            path_config: Some("/etc/kvbackup/vaults.json".into()),
            path_cache: Some("/var/lib/kvbackup/cache".into()),
            path_archive: Some("/var/lib/kvbackup/archive".into()),
            keyvault_login_host: None,
            keyvault_base_url: None,
            sharepoint_acs_host: None,
        }
    }

    #[test]
    fn complete_args_resolve() {
        let settings = Settings::from_args(&complete_args()).unwrap();
        assert_eq!(settings.backup_password.as_str(), "backup-pw");
        assert_eq!(settings.sharepoint.dir, "Shared Documents/Backups");
        assert_eq!(settings.cache_dir, PathBuf::from("/var/lib/kvbackup/cache"));
        assert!(settings.keyvault.login_host.is_none());
        assert!(settings.sharepoint.acs_host.is_none());
    }

    #[test]
    fn missing_setting_is_named() {
        let args = SettingsArgs {
            sharepoint_client_secret: None,
            ..complete_args()
        };
        match Settings::from_args(&args) {
            Err(BackupError::MissingSetting(key)) => assert_eq!(key, "SHAREPOINT_CLIENT_SECRET"),
            other => panic!("expected MissingSetting, got {:?}", other.err()),
        }
    }

    #[test]
    fn blank_setting_counts_as_missing() {
        let args = SettingsArgs {
            backup_password: Some("   ".into()),
            ..complete_args()
        };
        assert!(matches!(
            Settings::from_args(&args),
            Err(BackupError::MissingSetting("KEYVAULT_BACKUP_PASSWORD"))
        ));
    }

    #[test]
    fn endpoint_overrides_pass_through() {
        let args = SettingsArgs {
            keyvault_login_host: Some("https://login.microsoftonline.us".into()),
            keyvault_base_url: Some("http://127.0.0.1:9001".into()),
            sharepoint_acs_host: Some("  ".into()),
            ..complete_args()
        };
        let settings = Settings::from_args(&args).unwrap();
        assert_eq!(
            settings.keyvault.login_host.as_deref(),
            Some("https://login.microsoftonline.us")
        );
        assert_eq!(
            settings.keyvault.base_url.as_deref(),
            Some("http://127.0.0.1:9001")
        );
        assert!(settings.sharepoint.acs_host.is_none());
    }

    #[test]
    fn ensure_dirs_creates_both_directories() {
        let tmp = TempDir::new().unwrap();
        let args = SettingsArgs {
            path_cache: Some(tmp.path().join("cache")),
            path_archive: Some(tmp.path().join("archive")),
            ..complete_args()
        };
        let settings = Settings::from_args(&args).unwrap();
        settings.ensure_dirs().unwrap();
        assert!(tmp.path().join("cache").is_dir());
        assert!(tmp.path().join("archive").is_dir());
    }

    #[test]
    fn load_vault_names_reads_json_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vaults.json");
        fs::write(&path, r#"["myvault", "prod-kv-01"]"#).unwrap();

        assert_eq!(load_vault_names(&path).unwrap(), vec!["myvault", "prod-kv-01"]);
    }

    #[test]
    fn load_vault_names_missing_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.json");
        match load_vault_names(&path) {
            Err(BackupError::ConfigFileNotFound(p)) => assert_eq!(p, path),
            other => panic!("expected ConfigFileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_vault_names_rejects_non_string_list() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vaults.json");
        fs::write(&path, r#"{"vaults": ["a"]}"#).unwrap();
        assert!(matches!(load_vault_names(&path), Err(BackupError::Config(_))));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_vault_names(&path), Err(BackupError::Config(_))));
    }

    #[test]
    fn load_vault_names_rejects_duplicates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vaults.json");
        fs::write(&path, r#"["myvault", "myvault"]"#).unwrap();
        assert!(load_vault_names(&path).is_err());
    }

    #[test]
    fn vault_name_rules() {
        assert!(validate_vault_name("myvault").is_ok());
        assert!(validate_vault_name("kv-prod-01").is_ok());

        assert!(validate_vault_name("kv").is_err());
        assert!(validate_vault_name(&"a".repeat(25)).is_err());
        assert!(validate_vault_name("1vault").is_err());
        assert!(validate_vault_name("vault-").is_err());
        assert!(validate_vault_name("my--vault").is_err());
        assert!(validate_vault_name("../etc").is_err());
        assert!(validate_vault_name("my_vault").is_err());
    }
}
