//! Integration tests for the CLI skeleton: help, version, list and error
//! reporting.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("strata"));
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("STRATA_CONFIG", dir.path().join("strata.yaml"))
        .env_remove("STRATA_LOG");
    cmd
}

fn sandbox() -> TempDir {
    TempDir::new().expect("temp dir")
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let dir = sandbox();
    strata(&dir).assert().code(2).stderr(predicate::str::contains(
        "Compose infrastructure stacks",
    ));
}

#[test]
fn test_cli_help_lists_commands() {
    let dir = sandbox();
    strata(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn test_version_command_shows_version() {
    let dir = sandbox();
    strata(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata 0.1.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let dir = sandbox();
    let out = strata(&dir).args(["version", "--json"]).output().unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["version"], "0.1.0");
}

// --- list ---

#[test]
fn test_list_shows_every_stack() {
    let dir = sandbox();
    strata(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("BasicServerStack"))
        .stdout(predicate::str::contains("ServerlessStack"))
        .stdout(predicate::str::contains("WafStack"));
}

#[test]
fn test_list_json_has_names_and_descriptions() {
    let dir = sandbox();
    let out = strata(&dir).args(["list", "--json"]).output().unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let stacks = value["stacks"].as_array().unwrap();
    assert_eq!(stacks.len(), 3);
    assert!(stacks.iter().all(|s| s["description"].as_str().is_some_and(|d| !d.is_empty())));
}

// --- Errors ---

#[test]
fn test_unknown_stack_fails_with_available_names() {
    let dir = sandbox();
    strata(&dir)
        .args(["synth", "NoSuchStack"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown stack 'NoSuchStack'"))
        .stderr(predicate::str::contains("WafStack"));
}

#[test]
fn test_unknown_stack_json_error_object() {
    let dir = sandbox();
    let out = strata(&dir)
        .args(["synth", "NoSuchStack", "--json"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "UNKNOWN_STACK");
}

#[test]
fn test_destroy_unknown_stack_fails_before_any_provider_call() {
    let dir = sandbox();
    strata(&dir)
        .args(["destroy", "Nope", "--yes"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown stack"));
}
