//! `kvbackup backup`: sync every configured vault, then upload.

use tracing::{error, info};

use crate::archive::Archiver;
use crate::cache::CacheStore;
use crate::cli::{output, Cli};
use crate::config::{load_vault_names, Settings};
use crate::errors::Result;
use crate::remote::{AzureKeyVaultClient, SharePointClient};
use crate::sync::backup_vaults;
use crate::upload;

/// Execute the `backup` command and return the process exit code.
///
/// Vault failures are reported in the outcome (exit code 1) and do not
/// prevent the upload of what was archived before them.  Setup and upload
/// errors are returned as `Err`.
pub fn execute(cli: &Cli) -> Result<u8> {
    let settings = Settings::from_args(&cli.settings)?;
    settings.ensure_dirs()?;
    let vaults = load_vault_names(&settings.config_path)?;
    info!(count = vaults.len(), config = %settings.config_path.display(), "loaded vault list");

    let mut reader = AzureKeyVaultClient::new(
        &settings.keyvault.tenant_id,
        &settings.keyvault.client_id,
        &settings.keyvault.client_secret,
    );
    if let Some(host) = &settings.keyvault.login_host {
        reader = reader.with_login_host(host);
    }
    if let Some(base) = &settings.keyvault.base_url {
        reader = reader.with_vault_base_url(base);
    }
    let cache = CacheStore::new(&settings.cache_dir);
    let archiver = Archiver::new(&settings.archive_dir, &settings.backup_password);
    info!(
        cache = %cache.dir().display(),
        archive = %archiver.root().display(),
        "local storage ready"
    );

    let outcome = backup_vaults(&reader, &cache, &archiver, &vaults);
    output::print_outcome_table(&outcome);
    if !outcome.succeeded() {
        error!("backup finished with failures");
    }

    info!(dir = %settings.sharepoint.dir, "uploading archive to SharePoint");
    let mut storage = SharePointClient::new(
        &settings.sharepoint.url,
        &settings.sharepoint.client_id,
        &settings.sharepoint.client_secret,
    )?;
    if let Some(host) = &settings.sharepoint.acs_host {
        storage = storage.with_acs_host(host);
    }
    let summary = upload::upload(&storage, &settings.sharepoint.dir, &settings.archive_dir)?;
    output::print_upload_summary(&summary);

    info!(
        archived = outcome.archived(),
        uploaded = summary.files,
        exit_code = outcome.exit_code(),
        "run finished"
    );
    Ok(outcome.exit_code())
}
