//! Infrastructure implementation of the `ConfigStore` port.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::application::ports::ConfigStore;
use crate::domain::config::StrataConfig;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "STRATA_CONFIG";

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "strata.yaml";

/// Production implementation of `ConfigStore` that uses a YAML file on disk.
///
/// The file is located through `STRATA_CONFIG`, then `strata.yaml` in the
/// working directory, unless pinned with [`YamlConfigStore::at`].
#[derive(Debug, Default)]
pub struct YamlConfigStore {
    pinned: Option<PathBuf>,
}

impl YamlConfigStore {
    /// A store that always uses `path`, ignoring the environment.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            pinned: Some(path.into()),
        }
    }
}

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<StrataConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(StrataConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn save(&self, config: &StrataConfig) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("cannot serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("cannot set permissions on {}", path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.pinned {
            return Ok(path.clone());
        }
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        Ok(PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlConfigStore::at(dir.path().join("strata.yaml"));
        assert_eq!(store.load().unwrap(), StrataConfig::default());
    }

    #[test]
    fn test_save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlConfigStore::at(dir.path().join("nested").join("strata.yaml"));
        let mut config = StrataConfig::default();
        config.basic_server.max_capacity = 9;
        config.deploy.asset_bucket = Some("my-assets".to_string());
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.yaml");
        std::fs::write(&path, "waf:\n  scope: cloudfront\n").unwrap();
        let config = YamlConfigStore::at(&path).load().unwrap();
        assert_eq!(config.waf.scope, "cloudfront");
        assert_eq!(config.output_dir, StrataConfig::default().output_dir);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.yaml");
        std::fs::write(&path, "basic_server: [not, a, map]\n").unwrap();
        let err = YamlConfigStore::at(&path).load().unwrap_err();
        assert!(format!("{err:#}").contains("cannot parse"));
    }
}
