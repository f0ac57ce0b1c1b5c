//! Unit tests for the synthesis service.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use strata_cli::application::services::synth_service;
use strata_cli::domain::config::StrataConfig;
use strata_cli::domain::error::AppError;

use crate::mocks::{FakeHasher, MemorySink, RecordingReporter};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[test]
fn test_select_stacks_defaults_to_all() {
    let selected = synth_service::select_stacks(&[]).unwrap();
    assert_eq!(selected, vec!["BasicServerStack", "ServerlessStack", "WafStack"]);
}

#[test]
fn test_select_stacks_canonicalizes_and_dedupes() {
    let selected =
        synth_service::select_stacks(&names(&["wafstack", "WafStack", "basicserverstack"])).unwrap();
    assert_eq!(selected, vec!["WafStack", "BasicServerStack"]);
}

#[test]
fn test_select_stacks_rejects_unknown() {
    let err = synth_service::select_stacks(&names(&["WafStack", "Nope"])).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::UnknownStack { .. })
    ));
}

#[test]
fn test_synth_all_writes_templates_and_manifest() {
    let config = StrataConfig::default();
    let hasher = FakeHasher::default();
    let sink = MemorySink::default();
    let reporter = RecordingReporter::default();

    let outcome = synth_service::synth(
        &config,
        &[],
        Path::new("out"),
        &hasher,
        &sink,
        &reporter,
    )
    .unwrap();

    assert_eq!(outcome.stacks.len(), 3);
    assert_eq!(outcome.manifest_path, Path::new("out/manifest.json"));
    let templates = sink.templates.borrow();
    assert_eq!(templates.len(), 3);
    for body in templates.values() {
        let doc: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(doc["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(!doc["Resources"].as_object().unwrap().is_empty());
    }

    let manifest = sink.manifest.borrow();
    let manifest = manifest.as_ref().unwrap();
    assert_eq!(manifest.stacks.len(), 3);
    let serverless = manifest.stack("ServerlessStack").unwrap();
    assert_eq!(serverless.assets.len(), 1);
    assert_eq!(serverless.assets[0].hash, "hash-lambda_code");
    assert!(manifest.stack("WafStack").unwrap().assets.is_empty());

    assert_eq!(
        *sink.staged.borrow(),
        vec![(Path::new("lambda_code").to_path_buf(), "asset.hash-lambda_code".to_string())]
    );
    let events = reporter.events.borrow();
    assert_eq!(events.iter().filter(|e| e.starts_with("success:")).count(), 3);
}

#[test]
fn test_synth_only_hashes_assets_of_selected_stacks() {
    let config = StrataConfig::default();
    // The function code directory is absent; stacks that do not use it
    // must still synthesize.
    let hasher = FakeHasher {
        missing: vec!["lambda_code".to_string()],
        ..FakeHasher::default()
    };
    let sink = MemorySink::default();
    let outcome = synth_service::synth(
        &config,
        &names(&["WafStack", "BasicServerStack"]),
        Path::new("out"),
        &hasher,
        &sink,
        &RecordingReporter::default(),
    )
    .unwrap();
    assert_eq!(outcome.stacks.len(), 2);
    assert!(hasher.hashed.borrow().is_empty());

    let err = synth_service::synth(
        &config,
        &names(&["ServerlessStack"]),
        Path::new("out"),
        &hasher,
        &sink,
        &RecordingReporter::default(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("lambda_code"), "got: {err:#}");
}

#[test]
fn test_invalid_config_fails_before_writing() {
    let mut config = StrataConfig::default();
    config.basic_server.min_capacity = 10;
    let sink = MemorySink::default();
    let result = synth_service::synth(
        &config,
        &names(&["BasicServerStack"]),
        Path::new("out"),
        &FakeHasher::default(),
        &sink,
        &RecordingReporter::default(),
    );
    assert!(result.is_err());
    assert!(sink.templates.borrow().is_empty());
    assert!(sink.manifest.borrow().is_none());
}

#[test]
fn test_compose_is_deterministic() {
    let config = StrataConfig::default();
    let a = synth_service::compose(&config, &["BasicServerStack"], &FakeHasher::default()).unwrap();
    let b = synth_service::compose(&config, &["BasicServerStack"], &FakeHasher::default()).unwrap();
    assert_eq!(
        a[0].1.to_json_pretty().unwrap(),
        b[0].1.to_json_pretty().unwrap()
    );
    assert_eq!(a[0].0, b[0].0);
}

#[test]
fn test_partial_synth_keeps_other_manifest_entries() {
    let config = StrataConfig::default();
    let sink = MemorySink::default();
    let synth = |requested: &[&str]| {
        synth_service::synth(
            &config,
            &names(requested),
            Path::new("out"),
            &FakeHasher::default(),
            &sink,
            &RecordingReporter::default(),
        )
        .unwrap()
    };

    synth(&["BasicServerStack", "WafStack"]);
    let outcome = synth(&["WafStack"]);
    assert_eq!(outcome.stacks.len(), 1);

    let manifest = sink.manifest.borrow();
    let listed: Vec<&str> = manifest
        .as_ref()
        .unwrap()
        .stacks
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(listed, ["BasicServerStack", "WafStack"]);
}
