//! CLI end-to-end tests
//!
//! Tests for the voicetrim command-line interface.

mod common;

use assert_cmd::prelude::*;
use common::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the voicetrim binary
#[allow(deprecated)]
fn voicetrim_cmd() -> Command {
    let mut cmd = Command::cargo_bin("voicetrim").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = voicetrim_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = voicetrim_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("voicetrim"));
}

#[test]
fn test_cli_trim_help() {
    let mut cmd = voicetrim_cmd();
    cmd.args(["trim", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--start-ms"))
        .stdout(predicate::str::contains("--end-ms"));
}

#[test]
fn test_cli_probe_json() {
    let dir = tempdir().unwrap();
    let path = write_recording(dir.path());

    let output = voicetrim_cmd()
        .args(["probe", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["duration_us"], 10_000_000);
    assert_eq!(json["selected_track"], 0);
    assert_eq!(json["tracks"][0]["mime"], "audio/mp4a-latm");
    assert_eq!(json["tracks"][0]["sample_count"], 50);
}

#[test]
fn test_cli_probe_text() {
    let dir = tempdir().unwrap();
    let path = write_recording(dir.path());

    voicetrim_cmd()
        .arg("probe")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("audio/mp4a-latm"))
        .stdout(predicate::str::contains("[selected]"));
}

#[test]
fn test_cli_probe_missing_file() {
    voicetrim_cmd()
        .args(["probe", "/nonexistent/memo.m4a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_trim_dry_run_leaves_file() {
    let dir = tempdir().unwrap();
    let path = write_recording(dir.path());
    let before = fs::read(&path).unwrap();

    voicetrim_cmd()
        .args(["trim", "--start-ms", "3000", "--end-ms", "7000", "--dry-run"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Would keep 36 samples"))
        .stdout(predicate::str::contains("DRY RUN"));

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_cli_trim_replaces_file() {
    let dir = tempdir().unwrap();
    let path = write_recording(dir.path());

    voicetrim_cmd()
        .args(["trim", "--start-ms", "5000", "--end-ms", "6000"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Samples: 6"));

    assert_eq!(read_all(&path).len(), 6);
    assert_eq!(dir_entries(dir.path()), ["memo.m4a"]);
}

#[test]
fn test_cli_trim_rejects_empty_range() {
    let dir = tempdir().unwrap();
    let path = write_recording(dir.path());

    voicetrim_cmd()
        .args(["trim", "--start-ms", "4000", "--end-ms", "4000"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid range"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("voicetrim.toml");
    fs::write(&config, "[trim]\nmax_sample_bytes = 1048576\n").unwrap();

    voicetrim_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("1048576"));
}

#[test]
fn test_cli_validate_rejects_bad_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("voicetrim.toml");
    fs::write(&config, "[writer]\nsamples_per_chunk = 0\n").unwrap();

    voicetrim_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("samples_per_chunk"));
}
