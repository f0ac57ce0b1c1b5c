//! Registry of the shipped stacks.
//!
//! Stacks are composed on demand from the configuration, so callers only
//! hash the assets of the stacks they actually synthesize.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::domain::config::StrataConfig;
use crate::domain::error::AppError;
use crate::domain::stack::Stack;
use crate::domain::stacks::{basic_server, serverless, waf};

/// Stack names in composition order.
pub const STACK_NAMES: [&str; 3] = [basic_server::NAME, serverless::NAME, waf::NAME];

#[derive(Debug, Clone)]
pub struct App {
    config: StrataConfig,
    /// Asset directory → content hash.
    assets: BTreeMap<String, String>,
}

impl App {
    #[must_use]
    pub fn from_config(config: &StrataConfig, assets: BTreeMap<String, String>) -> Self {
        Self {
            config: config.clone(),
            assets,
        }
    }

    #[must_use]
    pub fn names() -> &'static [&'static str] {
        &STACK_NAMES
    }

    /// One-line description of the stack called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a known stack.
    pub fn description(name: &str) -> Result<&'static str> {
        Ok(match Self::resolve(name)? {
            basic_server::NAME => basic_server::DESCRIPTION,
            serverless::NAME => serverless::DESCRIPTION,
            _ => waf::DESCRIPTION,
        })
    }

    /// Asset directories `name` needs hashed before it can be composed.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a known stack.
    pub fn required_assets(config: &StrataConfig, name: &str) -> Result<Vec<String>> {
        match Self::resolve(name)? {
            serverless::NAME => Ok(vec![config.serverless.code_path.clone()]),
            _ => Ok(Vec::new()),
        }
    }

    /// Compose the stack called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown, a required asset has not been
    /// hashed, or the configuration for that stack is invalid.
    pub fn stack(&self, name: &str) -> Result<Stack> {
        match Self::resolve(name)? {
            basic_server::NAME => basic_server::build(&self.config.basic_server),
            serverless::NAME => {
                let path = &self.config.serverless.code_path;
                let hash = self.assets.get(path).ok_or_else(|| AppError::MissingAsset {
                    stack: name.to_string(),
                    path: path.clone(),
                })?;
                serverless::build(&self.config.serverless, hash)
            }
            _ => waf::build(&self.config.waf),
        }
    }

    /// Canonical spelling of a stack name; lookup ignores ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownStack`] listing the valid names.
    pub fn resolve(name: &str) -> Result<&'static str> {
        STACK_NAMES
            .iter()
            .copied()
            .find(|known| known.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                AppError::UnknownStack {
                    name: name.to_string(),
                    valid: STACK_NAMES.join(", "),
                }
                .into()
            })
    }

    /// Compose every stack, in [`STACK_NAMES`] order.
    ///
    /// # Errors
    ///
    /// Returns the first composition error.
    pub fn stacks(&self) -> Result<Vec<Stack>> {
        STACK_NAMES.iter().map(|name| self.stack(name)).collect()
    }
}
