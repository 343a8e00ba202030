//! Remote collaborators: the vault being backed up and the storage
//! receiving the archives.
//!
//! The sync and upload code only sees the two traits below, so tests can
//! drive them with in-memory fakes.  Production implementations:
//! - `AzureKeyVaultClient` (`azure`)
//! - `SharePointClient` (`sharepoint`)

pub mod azure;
pub mod http;
pub mod sharepoint;

use std::collections::BTreeSet;
use std::path::Path;

use zeroize::Zeroizing;

use crate::errors::Result;
use crate::inventory::SecretVersionRecord;

pub use azure::AzureKeyVaultClient;
pub use sharepoint::SharePointClient;

/// Read access to a remote secret vault.
pub trait VaultReader {
    /// Names of every secret in `vault`.
    fn list_secret_names(&self, vault: &str) -> Result<BTreeSet<String>>;

    /// Metadata of every version of one secret, without values.
    fn get_version_metadata(&self, vault: &str, secret: &str) -> Result<Vec<SecretVersionRecord>>;

    /// Plaintext value of one secret version.
    fn get_version_value(&self, vault: &str, secret: &str, version: &str)
        -> Result<Zeroizing<String>>;
}

/// Write access to the remote document store.  Both operations must be
/// safe to repeat when the target already exists.
pub trait RemoteStorage {
    /// Make sure `<remote_root>/<relative_dir>` exists.
    fn ensure_dir(&self, remote_root: &str, relative_dir: &str) -> Result<()>;

    /// Upload `local_file` into `<remote_root>/<relative_dir>`, replacing
    /// any file of the same name.
    fn upload_file(&self, remote_root: &str, relative_dir: &str, local_file: &Path) -> Result<()>;
}
