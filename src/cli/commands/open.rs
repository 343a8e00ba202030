//! `kvbackup open <FILE>`: decrypt one archive and print its record.

use std::path::Path;

use zeroize::Zeroize;

use crate::archive::open_archive;
use crate::cli::{backup_password, Cli};
use crate::errors::{BackupError, Result};

/// Execute the `open` command.
pub fn execute(cli: &Cli, file: &str) -> Result<()> {
    let password = backup_password(&cli.settings)?;
    let record = open_archive(Path::new(file), &password)?;

    let mut json = serde_json::to_string_pretty(&record)
        .map_err(|e| BackupError::Serialization(e.to_string()))?;
    println!("{json}");
    json.zeroize();

    Ok(())
}
