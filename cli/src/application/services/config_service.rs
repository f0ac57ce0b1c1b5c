//! Application service — configuration use-cases.

use anyhow::Result;
use tracing::info;

use crate::application::ports::ConfigStore;
use crate::domain::config::{StrataConfig, apply_config_value};

/// Load configuration and check every value in it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a value is
/// out of range. Range errors name the offending key.
pub fn load_config(store: &impl ConfigStore) -> Result<StrataConfig> {
    let config = store.load()?;
    config.validate()?;
    Ok(config)
}

/// Save configuration.
pub fn save_config(store: &impl ConfigStore, config: &StrataConfig) -> Result<()> {
    store.save(config)
}

/// Validate and persist a single setting, returning the updated config.
///
/// The file is loaded unchecked so a bad value can be repaired, but the
/// result must pass full validation. Nothing is written when it fails.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<StrataConfig> {
    let mut config = store.load()?;
    apply_config_value(&mut config, key, value)?;
    config.validate()?;
    store.save(&config)?;
    info!(%key, %value, "configuration updated");
    Ok(config)
}
