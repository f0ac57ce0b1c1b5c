//! Unit tests for the configuration service.

#![allow(clippy::unwrap_used)]

use strata_cli::application::services::config_service;
use strata_cli::domain::error::ConfigError;

use crate::mocks::MemoryConfigStore;

#[test]
fn test_load_without_saved_config_returns_defaults() {
    let store = MemoryConfigStore::default();
    let config = config_service::load_config(&store).unwrap();
    assert_eq!(config.output_dir, "strata.out");
    assert_eq!(config.basic_server.max_azs, 2);
}

#[test]
fn test_set_value_persists() {
    let store = MemoryConfigStore::default();
    let config = config_service::set_value(&store, "basic_server.max_capacity", "8").unwrap();
    assert_eq!(config.basic_server.max_capacity, 8);
    assert_eq!(*store.saves.borrow(), 1);
    assert_eq!(config_service::load_config(&store).unwrap().basic_server.max_capacity, 8);
}

#[test]
fn test_set_optional_value_and_clear_it() {
    let store = MemoryConfigStore::default();
    config_service::set_value(&store, "deploy.asset_bucket", "my-asset-bucket").unwrap();
    assert_eq!(
        config_service::load_config(&store).unwrap().deploy.asset_bucket.as_deref(),
        Some("my-asset-bucket")
    );
    config_service::set_value(&store, "deploy.asset_bucket", "none").unwrap();
    assert!(config_service::load_config(&store).unwrap().deploy.asset_bucket.is_none());
}

#[test]
fn test_unknown_key_is_not_saved() {
    let store = MemoryConfigStore::default();
    let err = config_service::set_value(&store, "basic_server.color", "blue").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::UnknownKey { .. })
    ));
    assert_eq!(*store.saves.borrow(), 0);
}

#[test]
fn test_capacity_inversion_is_not_saved() {
    let store = MemoryConfigStore::default();
    // default max is 6
    assert!(config_service::set_value(&store, "basic_server.min_capacity", "7").is_err());
    assert_eq!(*store.saves.borrow(), 0);
}

fn store_from_yaml(yaml: &str) -> MemoryConfigStore {
    let config = serde_yaml::from_str(yaml).unwrap();
    MemoryConfigStore {
        config: std::cell::RefCell::new(Some(config)),
        ..MemoryConfigStore::default()
    }
}

#[test]
fn test_load_rejects_out_of_range_file_values_by_key() {
    for (yaml, key) in [
        ("basic_server:\n  cooldown_minutes: 18446744073709551615\n", "basic_server.cooldown_minutes"),
        ("basic_server:\n  cpu_target_percent: 150\n", "basic_server.cpu_target_percent"),
        ("basic_server:\n  max_azs: 0\n", "basic_server.max_azs"),
        ("basic_server:\n  db_instances: 40\n", "basic_server.db_instances"),
    ] {
        let err = config_service::load_config(&store_from_yaml(yaml)).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::InvalidValue { .. })),
            "{key}: got {err}"
        );
        assert!(err.to_string().contains(key), "{key}: got {err}");
    }
}

#[test]
fn test_set_value_repairs_bad_file_value() {
    let store = store_from_yaml("basic_server:\n  cooldown_minutes: 0\n");
    assert!(config_service::load_config(&store).is_err());
    config_service::set_value(&store, "basic_server.cooldown_minutes", "15").unwrap();
    let config = config_service::load_config(&store).unwrap();
    assert_eq!(config.basic_server.cooldown_minutes, 15);
}
