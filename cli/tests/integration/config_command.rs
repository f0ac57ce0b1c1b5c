//! Integration tests for `strata config`.
//!
//! All filesystem-touching tests set `STRATA_CONFIG` to a temp path so they
//! never read or write a `strata.yaml` in the working directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("strata"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Returns a `TempDir` and the path string for a config file inside it.
fn temp_config_path() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("strata.yaml")
        .to_string_lossy()
        .into_owned();
    (dir, path)
}

// ---------------------------------------------------------------------------
// `strata config show`
// ---------------------------------------------------------------------------

#[test]
fn test_config_help_shows_show_and_set_subcommands() {
    strata()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set"));
}

#[test]
fn test_config_show_without_file_uses_defaults() {
    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "show"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("strata.out"))
        .stdout(predicate::str::contains("STRATA_CONFIG"));
}

#[test]
fn test_config_show_does_not_create_file() {
    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "show"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .success();
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_show_json() {
    let (_dir, path) = temp_config_path();
    let out = strata()
        .args(["config", "show", "--json"])
        .env("STRATA_CONFIG", &path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["config"]["output_dir"], "strata.out");
    assert_eq!(value["config"]["basic_server"]["cidr"], "10.0.0.0/16");
}

// ---------------------------------------------------------------------------
// `strata config set`
// ---------------------------------------------------------------------------

#[test]
fn test_config_set_persists_value() {
    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "set", "basic_server.max_capacity", "8"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("basic_server.max_capacity"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("max_capacity: 8"));
}

#[test]
fn test_config_set_unknown_key_fails() {
    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "set", "basic_server.flavour", "spicy"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown setting"));
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_set_invalid_cidr_fails() {
    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "set", "basic_server.cidr", "10.0.0.0/33"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("basic_server.cidr"));
}

#[test]
fn test_config_set_invalid_value_json_code() {
    let (_dir, path) = temp_config_path();
    let out = strata()
        .args(["config", "set", "waf.scope", "GLOBAL", "--json"])
        .env("STRATA_CONFIG", &path)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["code"], "INVALID_CONFIG");
}

#[cfg(unix)]
#[test]
fn test_config_set_writes_owner_only_file() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = temp_config_path();
    strata()
        .args(["config", "set", "output_dir", "build"])
        .env("STRATA_CONFIG", &path)
        .assert()
        .success();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
