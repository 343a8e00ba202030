//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.  Diagnostics go to `tracing`.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::sync::{RunOutcome, VaultStatus};
use crate::upload::UploadSummary;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print one row per vault (Vault, Status, Added, Removed, Archived).
pub fn print_outcome_table(outcome: &RunOutcome) {
    if outcome.vaults.is_empty() {
        info("No vaults configured.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Vault", "Status", "Added", "Removed", "Archived"]);

    for report in &outcome.vaults {
        let row = match &report.status {
            VaultStatus::Synced {
                added,
                removed,
                archived,
            } => vec![
                report.vault.clone(),
                "synced".to_string(),
                added.to_string(),
                removed.to_string(),
                archived.to_string(),
            ],
            VaultStatus::Failed(reason) => vec![
                report.vault.clone(),
                format!("failed: {reason}"),
                "-".into(),
                "-".into(),
                "-".into(),
            ],
            VaultStatus::Skipped => vec![
                report.vault.clone(),
                "skipped".to_string(),
                "-".into(),
                "-".into(),
                "-".into(),
            ],
        };
        table.add_row(row);
    }

    println!("{table}");
}

/// One-line summary of an upload pass.
pub fn print_upload_summary(summary: &UploadSummary) {
    if summary.files == 0 {
        info("Nothing to upload.");
    } else {
        success(&format!(
            "Uploaded {} file(s) into {} folder(s), cleaned {} archive folder(s)",
            summary.files, summary.dirs, summary.cleaned
        ));
    }
    if summary.skipped > 0 {
        warning(&format!(
            "{} loose file(s) in the archive root were not uploaded",
            summary.skipped
        ));
    }
}
