//! Sync orchestrator: drives one backup pass over the configured vaults.
//!
//! Per vault, strictly in this order:
//!
//! 1. fetch the actual inventory from the vault (metadata only)
//! 2. load the cached inventory
//! 3. diff both ways: `to_add = diff(actual, cached)`, `to_remove = diff(cached, actual)`
//! 4. overwrite the cache with the actual inventory
//! 5. fetch the value of every added version and archive it
//!
//! The cache is committed before archiving.  If archiving fails halfway,
//! the versions not yet archived are already cached and will not be seen
//! as new by later runs.
//!
//! The first failing vault stops the loop; vaults after it are reported
//! as skipped.  Nothing here retries.

use tracing::{error, info};

use crate::archive::Archiver;
use crate::cache::{find_version, CacheStore};
use crate::errors::Result;
use crate::inventory::record::version_count;
use crate::inventory::{diff, ChangeSet, Inventory, SecretRecord};
use crate::remote::VaultReader;

/// The two change-sets computed for one vault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultChanges {
    pub to_add: ChangeSet,
    /// Not consumed yet; kept for a future retention/cleanup step.
    pub to_remove: ChangeSet,
}

/// How one vault fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultStatus {
    Synced {
        added: usize,
        removed: usize,
        archived: usize,
    },
    Failed(String),
    /// Not attempted because an earlier vault failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultReport {
    pub vault: String,
    pub status: VaultStatus,
}

/// Aggregated result of the sync phase, mapped to an exit code by `main`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub vaults: Vec<VaultReport>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.vaults
            .iter()
            .all(|r| matches!(r.status, VaultStatus::Synced { .. }))
    }

    pub fn exit_code(&self) -> u8 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    /// Total number of archive files written across all vaults.
    pub fn archived(&self) -> usize {
        self.vaults
            .iter()
            .map(|r| match r.status {
                VaultStatus::Synced { archived, .. } => archived,
                _ => 0,
            })
            .sum()
    }
}

/// Read the full inventory of `vault`: names first, then versions per name.
pub fn fetch_inventory(reader: &dyn VaultReader, vault: &str) -> Result<Inventory> {
    reader
        .list_secret_names(vault)?
        .into_iter()
        .map(|name| {
            let versions = reader.get_version_metadata(vault, &name)?;
            Ok(SecretRecord { name, versions })
        })
        .collect()
}

/// Steps 1–4: fetch, diff against the cache, and commit the new cache.
pub fn sync_vault(reader: &dyn VaultReader, cache: &CacheStore, vault: &str) -> Result<VaultChanges> {
    sync_inventory(reader, cache, vault).map(|(_, changes)| changes)
}

/// Like `sync_vault`, but also hands back the inventory that was cached.
fn sync_inventory(
    reader: &dyn VaultReader,
    cache: &CacheStore,
    vault: &str,
) -> Result<(Inventory, VaultChanges)> {
    info!(vault, "getting actual vault data");
    let actual = fetch_inventory(reader, vault)?;

    info!(vault, "getting cached vault data");
    let cached = cache.load(vault)?;

    info!(vault, "comparing data");
    let changes = VaultChanges {
        to_add: diff(&actual, &cached),
        to_remove: diff(&cached, &actual),
    };

    info!(vault, "storing data in cache");
    cache.save(vault, &actual)?;

    Ok((actual, changes))
}

/// Steps 1–5 for a single vault.  Returns the vault's change-sets and the
/// number of archives written.
pub fn backup_vault(
    reader: &dyn VaultReader,
    cache: &CacheStore,
    archiver: &Archiver,
    vault: &str,
) -> Result<(VaultChanges, usize)> {
    let (actual, changes) = sync_inventory(reader, cache, vault)?;
    info!(
        vault,
        to_add = version_count(&changes.to_add),
        to_remove = version_count(&changes.to_remove),
        "vault diffed"
    );

    let mut archived = 0;
    for secret in &changes.to_add {
        for version in &secret.versions {
            let metadata = find_version(&actual, vault, &secret.name, version)?;
            let value = reader.get_version_value(vault, &secret.name, version)?;

            info!(vault, secret = %secret.name, version = %version, "archiving secret");
            archiver.archive(vault, &secret.name, version, &value, metadata)?;
            archived += 1;
        }
    }

    Ok((changes, archived))
}

/// Back up every vault in order, stopping at the first failure.
pub fn backup_vaults(
    reader: &dyn VaultReader,
    cache: &CacheStore,
    archiver: &Archiver,
    vaults: &[String],
) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    let mut failed = false;

    for vault in vaults {
        if failed {
            outcome.vaults.push(VaultReport {
                vault: vault.clone(),
                status: VaultStatus::Skipped,
            });
            continue;
        }

        info!(vault = %vault, "start");
        let status = match backup_vault(reader, cache, archiver, vault) {
            Ok((changes, archived)) => {
                info!(vault = %vault, archived, "finish");
                VaultStatus::Synced {
                    added: version_count(&changes.to_add),
                    removed: version_count(&changes.to_remove),
                    archived,
                }
            }
            Err(e) => {
                error!(vault = %vault, "exception raised during backup: {e}");
                failed = true;
                VaultStatus::Failed(e.to_string())
            }
        };

        outcome.vaults.push(VaultReport {
            vault: vault.clone(),
            status,
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes() {
        let ok = RunOutcome {
            vaults: vec![VaultReport {
                vault: "a".into(),
                status: VaultStatus::Synced {
                    added: 1,
                    removed: 0,
                    archived: 1,
                },
            }],
        };
        assert!(ok.succeeded());
        assert_eq!(ok.exit_code(), 0);
        assert_eq!(ok.archived(), 1);

        let mut failed = ok.clone();
        failed.vaults.push(VaultReport {
            vault: "b".into(),
            status: VaultStatus::Failed("boom".into()),
        });
        failed.vaults.push(VaultReport {
            vault: "c".into(),
            status: VaultStatus::Skipped,
        });
        assert!(!failed.succeeded());
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.archived(), 1);
    }

    #[test]
    fn empty_run_succeeds() {
        assert_eq!(RunOutcome::default().exit_code(), 0);
    }
}
