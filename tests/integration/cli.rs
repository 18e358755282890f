//! Binary smoke tests

use assert_cmd::Command;
use listing_sync::config::{ENV_REMOTE_PASSWORD, ENV_REMOTE_URL, ENV_REMOTE_USER};

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("listing-sync").unwrap();
    cmd.env_remove(ENV_REMOTE_URL)
        .env_remove(ENV_REMOTE_USER)
        .env_remove(ENV_REMOTE_PASSWORD)
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let output = cli().arg("--help").output().unwrap();
    assert!(output.status.success());

    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["scrape", "snapshot", "remote"] {
        assert!(text.contains(command), "missing {command} in help:\n{text}");
    }
}

#[test]
fn test_snapshot_info_json_for_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("listings.csv");

    let output = cli()
        .args(["--output-format", "json", "--snapshot"])
        .arg(&snapshot)
        .args(["snapshot", "info"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["exists"], false);
    assert_eq!(info["rows"], 0);
}

#[test]
fn test_restore_without_backup_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .arg("--snapshot")
        .arg(dir.path().join("listings.csv"))
        .args(["snapshot", "restore"])
        .assert()
        .failure();
}

#[test]
fn test_inverted_year_range_rejected_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .arg("--snapshot")
        .arg(dir.path().join("listings.csv"))
        .args(["scrape", "--make", "Toyota", "--year-min", "2022", "--year-max", "2018"])
        .assert()
        .failure();
    assert!(!dir.path().join("listings.csv").exists());
}

#[test]
fn test_remote_commands_need_a_remote() {
    cli().args(["remote", "list"]).assert().failure();
}

#[test]
fn test_remote_clear_requires_confirmation() {
    cli()
        .env(ENV_REMOTE_URL, "http://127.0.0.1:9")
        .args(["remote", "clear"])
        .assert()
        .failure();
}
