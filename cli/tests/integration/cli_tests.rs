//! Argument parsing, help, version and status.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

pub fn datastack(workdir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("datastack"));
    cmd.env("NO_COLOR", "1")
        .env_remove("DATASTACK_YES")
        .env_remove("RUST_LOG")
        .arg("--workdir")
        .arg(workdir);
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    Command::new(assert_cmd::cargo::cargo_bin!("datastack"))
        .current_dir(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Phased, resumable installer for a multi-cloud data platform",
        ));
}

#[test]
fn test_cli_help_lists_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    datastack(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("decrypt"));
}

#[test]
fn test_version_command_shows_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    datastack(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            "datastack v",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_no_color_environment_accepts_any_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    for value in ["1", "true", ""] {
        datastack(dir.path())
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("datastack v"));
    }
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = datastack(dir.path())
        .args(["version", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_phase_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    datastack(dir.path())
        .args(["deploy", "--dry-run", "--phase", "7"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("7"));
}

// --- Status ---

#[test]
fn test_status_without_state_reports_nothing_deployed() {
    let dir = tempfile::tempdir().expect("tempdir");
    datastack(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no deployment recorded"));
}

#[test]
fn test_status_json_without_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = datastack(dir.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["deployed"], false);
}

#[test]
fn test_corrupt_state_is_reported_with_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("state.json"), "{ not json").expect("write");
    let output = datastack(dir.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["error"], true);
    assert_eq!(v["code"], "state_corruption");
}
