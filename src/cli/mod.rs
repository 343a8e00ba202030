//! CLI: argument parser, logging setup, output helpers, and
//! command implementations.

pub mod commands;
pub mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use crate::config::SettingsArgs;
use crate::errors::{BackupError, Result};

/// kvbackup: incremental encrypted backup of Key Vault secrets.
#[derive(Parser)]
#[command(
    name = "kvbackup",
    about = "Back up Azure Key Vault secrets into encrypted archives on SharePoint",
    version
)]
pub struct Cli {
    /// Subcommand to run (default: backup)
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Log filter used when RUST_LOG is not set (e.g. info, debug, kvbackup=trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Sync every configured vault, then upload new archives (default)
    Backup,

    /// Decrypt one archive file and print its record as JSON
    Open {
        /// Path to an archive file (<version>.zip)
        file: String,
    },
}

/// Install the global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `--log-level` when set.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log panics with a backtrace and terminate with exit code 1.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!("unexpected failure: {info}\n{backtrace}");
        std::process::exit(1);
    }));
}

/// Get the backup password, trying in order:
/// 1. `--backup-password` / `KEYVAULT_BACKUP_PASSWORD`
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn backup_password(settings: &SettingsArgs) -> Result<Zeroizing<String>> {
    if let Some(pw) = settings.backup_password.as_deref() {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw.to_string()));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter backup password")
        .interact()
        .map_err(|e| BackupError::Unexpected(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_backup() {
        let cli = Cli::try_parse_from(["kvbackup"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn open_takes_a_file() {
        let cli = Cli::try_parse_from(["kvbackup", "open", "archive/v/s/1.zip"]).unwrap();
        match cli.command {
            Some(Commands::Open { file }) => assert_eq!(file, "archive/v/s/1.zip"),
            _ => panic!("expected open"),
        }
    }

    #[test]
    fn settings_flags_are_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kvbackup",
            "backup",
            "--path-cache",
            "/tmp/cache",
            "--sharepoint-acs-host",
            "http://127.0.0.1:9002",
        ])
        .unwrap();
        assert_eq!(
            cli.settings.path_cache.as_deref(),
            Some(std::path::Path::new("/tmp/cache"))
        );
        assert_eq!(
            cli.settings.sharepoint_acs_host.as_deref(),
            Some("http://127.0.0.1:9002")
        );
    }

    #[test]
    fn explicit_password_skips_prompt() {
        let args = SettingsArgs {
            backup_password: Some("from-env".into()),
            ..SettingsArgs::default()
        };
        assert_eq!(backup_password(&args).unwrap().as_str(), "from-env");
    }
}
