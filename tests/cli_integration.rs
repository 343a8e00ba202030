//! Integration tests for the kvbackup CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.  The
//! remote services are not reachable here, so the backup command is only
//! driven up to its configuration checks; `open` is exercised against an
//! archive produced through the library.

use std::fs;

use assert_cmd::Command;
use assert_fs::TempDir;
use kvbackup::archive::Archiver;
use kvbackup::inventory::SecretVersionRecord;
use predicates::prelude::*;

/// Helper: get a Command pointing at the kvbackup binary with a clean
/// environment.
fn kvbackup() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("kvbackup").expect("binary should exist");
    cmd.env_clear();
    cmd
}

/// Every setting except the ones listed in `skip`.
fn with_settings(cmd: &mut Command, tmp: &TempDir, skip: &[&str]) {
    let values = [
        ("KEYVAULT_BACKUP_PASSWORD", "pw".to_string()),
        ("KEYVAULT_TENANT_ID", "tenant".to_string()),
        ("KEYVAULT_CLIENT_ID", "client".to_string()),
        ("KEYVAULT_CLIENT_SECRET", "secret".to_string()),
        (
            "SHAREPOINT_URL",
            "https://contoso.sharepoint.com/sites/ops".to_string(),
        ),
        ("SHAREPOINT_DIR", "Shared Documents/Backups".to_string()),
        ("SHAREPOINT_CLIENT_ID", "sp-client".to_string()),
        ("SHAREPOINT_CLIENT_SECRET", "sp-secret".to_string()),
        (
            "PATH_CONFIG",
            tmp.path().join("vaults.json").display().to_string(),
        ),
        ("PATH_CACHE", tmp.path().join("cache").display().to_string()),
        (
            "PATH_ARCHIVE",
            tmp.path().join("archive").display().to_string(),
        ),
    ];
    for (key, value) in values {
        if !skip.contains(&key) {
            cmd.env(key, value);
        }
    }
}

#[test]
fn help_flag_shows_usage() {
    kvbackup()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Key Vault"))
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("open"))
        .stdout(predicate::str::contains("KEYVAULT_BACKUP_PASSWORD"));
}

#[test]
fn version_flag_shows_version() {
    kvbackup()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kvbackup"));
}

#[test]
fn missing_password_is_reported_by_env_name() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = kvbackup();
    with_settings(&mut cmd, &tmp, &["KEYVAULT_BACKUP_PASSWORD"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "Missing ENV variable: KEYVAULT_BACKUP_PASSWORD",
        ));
}

#[test]
fn fatal_error_is_printed_once() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = kvbackup();
    with_settings(&mut cmd, &tmp, &["KEYVAULT_CLIENT_ID"]);

    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Missing ENV variable: KEYVAULT_CLIENT_ID").count(),
        1,
        "stderr was: {stderr}"
    );
}

#[test]
fn missing_sharepoint_dir_is_reported_by_env_name() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = kvbackup();
    with_settings(&mut cmd, &tmp, &["SHAREPOINT_DIR"]);

    cmd.arg("backup")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Missing ENV variable: SHAREPOINT_DIR",
        ));
}

#[test]
fn missing_config_file_fails_before_any_remote_call() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = kvbackup();
    with_settings(&mut cmd, &tmp, &[]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing config file"));

    // Local directories are prepared before the config is read.
    assert!(tmp.path().join("cache").is_dir());
    assert!(tmp.path().join("archive").is_dir());
}

#[test]
fn malformed_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("vaults.json"), r#"{"vault": "x"}"#).unwrap();
    let mut cmd = kvbackup();
    with_settings(&mut cmd, &tmp, &[]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("JSON array of vault names"));
}

#[test]
fn open_prints_archived_record() {
    let tmp = TempDir::new().unwrap();
    let archiver = Archiver::new(tmp.path(), "open-sesame");
    let path = archiver
        .archive(
            "myvault",
            "db-pass",
            "v1",
            "hunter2",
            &SecretVersionRecord::new("v1"),
        )
        .unwrap();

    kvbackup()
        .env("KEYVAULT_BACKUP_PASSWORD", "open-sesame")
        .arg("open")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": \"hunter2\""))
        .stdout(predicate::str::contains("\"version\": \"v1\""));
}

#[test]
fn open_with_wrong_password_fails() {
    let tmp = TempDir::new().unwrap();
    let archiver = Archiver::new(tmp.path(), "right");
    let path = archiver
        .archive("myvault", "s", "1", "x", &SecretVersionRecord::new("1"))
        .unwrap();

    kvbackup()
        .env("KEYVAULT_BACKUP_PASSWORD", "wrong")
        .arg("open")
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("wrong password"));
}
