//! Per-vault inventory cache.
//!
//! Each vault's last observed inventory lives in `<cache_dir>/<vault>.json`
//! as a plain JSON array.  A missing file means "nothing seen yet" and
//! loads as an empty inventory.  `save` always replaces the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{BackupError, MissingData, Result};
use crate::inventory::record::find_secret;
use crate::inventory::{Inventory, SecretRecord, SecretVersionRecord};

/// File-backed store of the last observed inventory per vault.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for `vault`.
    pub fn path_for(&self, vault: &str) -> PathBuf {
        self.dir.join(format!("{vault}.json"))
    }

    /// Load the cached inventory, or an empty one if nothing is cached.
    pub fn load(&self, vault: &str) -> Result<Inventory> {
        match self.read(vault)? {
            Some(inventory) => Ok(inventory),
            None => {
                debug!(vault, "no cached inventory, starting empty");
                Ok(Inventory::new())
            }
        }
    }

    /// Replace the cached inventory **atomically** (temp file + rename).
    pub fn save(&self, vault: &str, inventory: &Inventory) -> Result<()> {
        let bytes = serde_json::to_vec(inventory)
            .map_err(|e| BackupError::Serialization(format!("cache for {vault}: {e}")))?;

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(vault);
        let tmp_path = self.dir.join(format!(".{vault}.json.tmp"));

        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;

        debug!(vault, path = %path.display(), secrets = inventory.len(), "cache saved");
        Ok(())
    }

    /// Fetch the cached metadata of one secret version.
    ///
    /// Unlike `load`, an absent cache file is an error here: the caller
    /// expects the version to have been cached already.
    pub fn lookup_version(
        &self,
        vault: &str,
        secret: &str,
        version: &str,
    ) -> Result<SecretVersionRecord> {
        let inventory = self
            .read(vault)?
            .ok_or_else(|| missing(vault, secret, version, MissingData::CacheFile))?;
        find_version(&inventory, vault, secret, version).cloned()
    }

    fn read(&self, vault: &str) -> Result<Option<Inventory>> {
        let path = self.path_for(vault);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read(&path)?;
        let inventory = serde_json::from_slice(&contents).map_err(|e| {
            BackupError::Serialization(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(inventory))
    }
}

/// Find one version record in an inventory already held in memory.
pub fn find_version<'a>(
    inventory: &'a [SecretRecord],
    vault: &str,
    secret: &str,
    version: &str,
) -> Result<&'a SecretVersionRecord> {
    find_secret(inventory, secret)
        .ok_or_else(|| missing(vault, secret, version, MissingData::Secret))?
        .version(version)
        .ok_or_else(|| missing(vault, secret, version, MissingData::Version))
}

fn missing(vault: &str, secret: &str, version: &str, reason: MissingData) -> BackupError {
    BackupError::CacheDataMissing {
        vault: vault.to_string(),
        secret: secret.to_string(),
        version: version.to_string(),
        reason,
    }
}
