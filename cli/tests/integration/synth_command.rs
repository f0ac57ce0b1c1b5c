//! Integration tests for `strata synth`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("strata"));
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("STRATA_CONFIG", dir.path().join("strata.yaml"));
    cmd
}

/// A sandbox with the default Lambda source directory in place.
fn sandbox_with_code() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let code = dir.path().join("lambda_code");
    std::fs::create_dir_all(&code).unwrap();
    std::fs::write(
        code.join("index.js"),
        "exports.handler = async (event) => console.log(JSON.stringify(event));\n",
    )
    .unwrap();
    dir
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_synth_print_waf_template() {
    let dir = TempDir::new().unwrap();
    let out = strata(&dir)
        .args(["synth", "WafStack", "--print", "-o", "out"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let template: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(template["Resources"]["WebACL"]["Type"], "AWS::WAFv2::WebACL");
    assert!(template["Outputs"]["WebAclArn"]["Export"].is_object());
}

#[test]
fn test_synth_is_case_insensitive_and_deduplicates() {
    let dir = TempDir::new().unwrap();
    strata(&dir)
        .args(["synth", "wafstack", "WafStack", "-o", "out"])
        .assert()
        .success();
    let manifest = read_json(&dir.path().join("out").join("manifest.json"));
    assert_eq!(manifest["stacks"].as_array().unwrap().len(), 1);
}

#[test]
fn test_synth_all_writes_templates_manifest_and_staged_asset() {
    let dir = sandbox_with_code();
    strata(&dir)
        .args(["synth", "-o", "cdk.out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest:"));

    let out = dir.path().join("cdk.out");
    for stack in ["BasicServerStack", "ServerlessStack", "WafStack"] {
        let template = read_json(&out.join(format!("{stack}.template.json")));
        assert!(template["Resources"].as_object().is_some_and(|r| !r.is_empty()));
    }

    let manifest = read_json(&out.join("manifest.json"));
    let serverless = manifest["stacks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "ServerlessStack")
        .unwrap();
    let hash = serverless["assets"][0]["hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(out.join(format!("asset.{hash}")).join("index.js").is_file());
}

#[test]
fn test_synth_is_deterministic_across_runs() {
    let dir = sandbox_with_code();
    strata(&dir).args(["synth", "-o", "a"]).assert().success();
    strata(&dir).args(["synth", "-o", "b"]).assert().success();
    for file in [
        "BasicServerStack.template.json",
        "ServerlessStack.template.json",
        "WafStack.template.json",
    ] {
        let a = std::fs::read_to_string(dir.path().join("a").join(file)).unwrap();
        let b = std::fs::read_to_string(dir.path().join("b").join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between runs");
    }
}

#[test]
fn test_synth_serverless_without_code_dir_fails() {
    let dir = TempDir::new().unwrap();
    strata(&dir)
        .args(["synth", "ServerlessStack", "-o", "out"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("lambda_code"));
    assert!(!dir.path().join("out").join("manifest.json").exists());
}

#[test]
fn test_synth_json_summary() {
    let dir = TempDir::new().unwrap();
    let out = strata(&dir)
        .args(["synth", "WafStack", "--json", "-o", "out"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["stacks"][0]["name"], "WafStack");
    assert!(value["stacks"][0]["resource_count"].as_u64().unwrap() >= 1);
}

#[test]
fn test_synth_uses_configured_output_dir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("strata.yaml"), "output_dir: from-config\n").unwrap();
    strata(&dir).args(["synth", "WafStack"]).assert().success();
    assert!(dir.path().join("from-config").join("WafStack.template.json").is_file());
}

#[test]
fn test_synth_invalid_config_reports_validation_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("strata.yaml"),
        "basic_server:\n  min_capacity: 9\n  max_capacity: 2\n",
    )
    .unwrap();
    strata(&dir)
        .args(["synth", "BasicServerStack", "-o", "out"])
        .assert()
        .code(1);
    assert!(!dir.path().join("out").join("BasicServerStack.template.json").exists());
}

#[test]
fn test_synth_out_of_range_file_value_names_key() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("strata.yaml"),
        "basic_server:\n  cooldown_minutes: 9223372036854775807\n",
    )
    .unwrap();
    let out = strata(&dir)
        .args(["--json", "synth", "BasicServerStack", "-o", "out"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["code"], "INVALID_CONFIG");
    assert!(
        value["message"]
            .as_str()
            .unwrap()
            .contains("basic_server.cooldown_minutes")
    );
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_single_stack_synth_keeps_manifest_entries() {
    let dir = sandbox_with_code();
    strata(&dir).args(["synth", "-o", "out"]).assert().success();
    strata(&dir).args(["synth", "WafStack", "-o", "out"]).assert().success();
    let manifest = read_json(&dir.path().join("out").join("manifest.json"));
    let names: Vec<&str> = manifest["stacks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["BasicServerStack", "ServerlessStack", "WafStack"]);
}
