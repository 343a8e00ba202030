use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which piece of cached data was absent during a version lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingData {
    /// No cache file exists for the vault.
    CacheFile,
    /// The cache has no entry for the secret name.
    Secret,
    /// The secret entry has no such version id.
    Version,
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheFile => f.write_str("cache file is missing"),
            Self::Secret => f.write_str("secret is missing"),
            Self::Version => f.write_str("secret version is missing"),
        }
    }
}

/// All errors that can occur during a backup run.
#[derive(Debug, Error)]
pub enum BackupError {
    // --- Configuration errors ---
    #[error("Missing ENV variable: {0}")]
    MissingSetting(&'static str),

    #[error("Missing config file, path: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    // --- Cache errors ---
    #[error("Cache data missing for {vault}/{secret}/{version}: {reason}")]
    CacheDataMissing {
        vault: String,
        secret: String,
        version: String,
        reason: MissingData,
    },

    // --- Remote errors ---
    #[error("{service} request failed: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },

    // --- Archive errors ---
    #[error("Failed to write archive: {0}")]
    ArchiveFailed(String),

    #[error("Decryption failed: wrong password or corrupted archive")]
    DecryptionFailed,

    #[error("Invalid archive format: {0}")]
    InvalidArchiveFormat(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl BackupError {
    /// Shorthand for a Key Vault call failure.
    pub fn key_vault(message: impl Into<String>) -> Self {
        Self::Remote {
            service: "Key Vault",
            message: message.into(),
        }
    }

    /// Shorthand for a SharePoint call failure.
    pub fn sharepoint(message: impl Into<String>) -> Self {
        Self::Remote {
            service: "SharePoint",
            message: message.into(),
        }
    }
}

/// Convenience type alias for backup results.
pub type Result<T> = std::result::Result<T, BackupError>;
