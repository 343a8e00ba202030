//! Archiver: writes one secret version to a password-protected zip file.
//!
//! Layout under the archive root:
//!
//! ```text
//! <archive_root>/<vault>/<secret>/<version>.zip
//! ```
//!
//! Each zip holds a single Deflate-compressed, AES-256 encrypted entry
//! named `<version>.json`.  The record is first written as that JSON file
//! next to the target, packed, and the JSON file is removed again.  Every
//! scratch file is removed on every exit path, including errors, so only
//! finished archives are ever left in the tree.

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::{Zeroize, Zeroizing};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{BackupError, Result};
use crate::inventory::SecretVersionRecord;

/// File extension of archive files.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// The record sealed inside an archive: version metadata plus the value.
#[derive(Clone, Serialize, Deserialize)]
pub struct ArchivedSecret {
    #[serde(flatten)]
    pub metadata: SecretVersionRecord,
    pub value: String,
}

impl fmt::Debug for ArchivedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivedSecret")
            .field("metadata", &self.metadata)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl Drop for ArchivedSecret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Writes encrypted archive files under a root directory.
pub struct Archiver {
    root: PathBuf,
    password: Zeroizing<String>,
}

impl Archiver {
    pub fn new(root: impl Into<PathBuf>, password: &str) -> Self {
        Self {
            root: root.into(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of the archive for one secret version.
    pub fn archive_path(&self, vault: &str, secret: &str, version: &str) -> PathBuf {
        self.root
            .join(vault)
            .join(secret)
            .join(format!("{version}.{ARCHIVE_EXTENSION}"))
    }

    /// Pack `metadata` + `value` into `<root>/<vault>/<secret>/<version>.zip`.
    ///
    /// An existing archive for the same version is replaced.
    pub fn archive(
        &self,
        vault: &str,
        secret: &str,
        version: &str,
        value: &str,
        metadata: &SecretVersionRecord,
    ) -> Result<PathBuf> {
        validate_path_component("vault", vault)?;
        validate_path_component("secret", secret)?;
        validate_path_component("version", version)?;

        let dir = self.root.join(vault).join(secret);
        fs::create_dir_all(&dir)?;

        let record = ArchivedSecret {
            metadata: metadata.clone(),
            value: value.to_string(),
        };
        let json = Zeroizing::new(
            serde_json::to_vec(&record)
                .map_err(|e| BackupError::Serialization(format!("archive record: {e}")))?,
        );
        drop(record);

        let entry_name = format!("{version}.json");
        let plaintext_file = ScratchFile::create(dir.join(&entry_name), &json)?;
        let plaintext = Zeroizing::new(fs::read(plaintext_file.path())?);

        let path = self.archive_path(vault, secret, version);
        let partial = ScratchFile::create(
            dir.join(format!(".{version}.{ARCHIVE_EXTENSION}.tmp")),
            &[],
        )?;
        self.write_zip(partial.path(), &entry_name, &plaintext)?;
        partial.persist(&path)?;
        plaintext_file.remove()?;

        debug!(vault, secret, version, path = %path.display(), "archive written");
        Ok(path)
    }

    fn write_zip(&self, path: &Path, entry_name: &str, contents: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .with_aes_encryption(AesMode::Aes256, self.password.as_str());

        let file = fs::OpenOptions::new().write(true).truncate(true).open(path)?;
        let mut zip = ZipWriter::new(file);
        zip.start_file(entry_name, options).map_err(write_error)?;
        zip.write_all(contents)?;
        let file = zip.finish().map_err(write_error)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Decrypt an archive file with the backup password.
pub fn open_archive(path: &Path, password: &str) -> Result<ArchivedSecret> {
    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file).map_err(read_error)?;
    if zip.len() != 1 {
        return Err(BackupError::InvalidArchiveFormat(format!(
            "expected exactly one entry, found {}",
            zip.len()
        )));
    }

    let mut entry = zip
        .by_index_decrypt(0, password.as_bytes())
        .map_err(read_error)?;
    if !entry.encrypted() {
        return Err(BackupError::InvalidArchiveFormat(
            "archive entry is not encrypted".into(),
        ));
    }

    // AES entries carry a MAC; a mismatch surfaces as a read error.
    let mut plaintext = Zeroizing::new(Vec::new());
    entry
        .read_to_end(&mut plaintext)
        .map_err(|_| BackupError::DecryptionFailed)?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| BackupError::InvalidArchiveFormat(format!("archived record: {e}")))
}

fn write_error(err: ZipError) -> BackupError {
    match err {
        ZipError::Io(e) => BackupError::Io(e),
        other => BackupError::ArchiveFailed(other.to_string()),
    }
}

fn read_error(err: ZipError) -> BackupError {
    match err {
        ZipError::InvalidPassword => BackupError::DecryptionFailed,
        ZipError::Io(e) => BackupError::Io(e),
        other => BackupError::InvalidArchiveFormat(other.to_string()),
    }
}

/// Reject names that could escape their directory or are empty.
pub fn validate_path_component(kind: &str, name: &str) -> Result<()> {
    let invalid = |reason: &str| BackupError::InvalidName {
        name: name.to_string(),
        reason: format!("{kind} name {reason}"),
    };

    if name.is_empty() {
        return Err(invalid("cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("cannot be a relative path segment"));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err(invalid("contains a path separator or control character"));
    }
    Ok(())
}

/// File inside the archive tree that is removed when dropped, unless it
/// was removed or renamed into place first.
struct ScratchFile {
    path: PathBuf,
    done: bool,
}

impl ScratchFile {
    fn create(path: PathBuf, contents: &[u8]) -> Result<Self> {
        // Register the guard before writing so a partial write is cleaned up too.
        let guard = Self { path, done: false };

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&guard.path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(guard)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the file to `target`.
    fn persist(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target)?;
        self.done = true;
        Ok(())
    }

    fn remove(mut self) -> Result<()> {
        fs::remove_file(&self.path)?;
        self.done = true;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove scratch file: {e}"),
        }
    }
}
