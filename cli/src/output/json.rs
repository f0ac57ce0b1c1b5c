//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one JSON document on stdout;
//! failures use the error object from [`format_error`].

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::application::services::deploy_service::StackOutput;
use crate::application::services::synth_service::SynthOutcome;
use crate::domain::config::StrataConfig;
use crate::domain::error::{
    AppError, ComputeError, ConfigError, DataError, EdgeError, NetworkError, SecurityError,
    StackError, StorageError,
};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable error code for the `code` field of the error object.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(app) = err.downcast_ref::<AppError>() {
        match app {
            AppError::UnknownStack { .. } => "UNKNOWN_STACK",
            AppError::MissingAsset { .. } => "MISSING_ASSET",
        }
    } else if err.downcast_ref::<ConfigError>().is_some() {
        "INVALID_CONFIG"
    } else if err.downcast_ref::<StackError>().is_some() {
        "INVALID_STACK"
    } else if err.downcast_ref::<NetworkError>().is_some()
        || err.downcast_ref::<SecurityError>().is_some()
        || err.downcast_ref::<ComputeError>().is_some()
        || err.downcast_ref::<DataError>().is_some()
        || err.downcast_ref::<StorageError>().is_some()
        || err.downcast_ref::<EdgeError>().is_some()
    {
        "INVALID_RESOURCE"
    } else {
        "COMMAND_FAILED"
    }
}

fn print(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

/// Renders results as JSON documents on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// Render the list of stacks.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_stack_list(&self, stacks: &[(&str, &str)]) -> Result<()> {
        let stacks: Vec<Value> = stacks
            .iter()
            .map(|(name, description)| json!({"name": name, "description": description}))
            .collect();
        print(&json!({ "stacks": stacks }))
    }

    /// Render the result of a synthesis run.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_synth(&self, outcome: &SynthOutcome) -> Result<()> {
        let stacks: Vec<Value> = outcome
            .stacks
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "template": s.template_path,
                    "resource_count": s.manifest.resource_count,
                    "assets": s.manifest.assets,
                })
            })
            .collect();
        print(&json!({ "stacks": stacks, "manifest": outcome.manifest_path }))
    }

    /// Render a template printed with `synth --print`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_templates(&self, outcome: &SynthOutcome) -> Result<()> {
        let templates: serde_json::Map<String, Value> = outcome
            .stacks
            .iter()
            .map(|s| Ok((s.name.clone(), serde_json::to_value(&s.template)?)))
            .collect::<Result<_, serde_json::Error>>()
            .context("JSON serialization failed")?;
        print(&Value::Object(templates))
    }

    /// Render outputs of a deployed stack.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_deployed(&self, stack: &str, outputs: &[StackOutput]) -> Result<()> {
        print(&json!({ "stack": stack, "status": "deployed", "outputs": outputs }))
    }

    /// Render a destroyed stack.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_destroyed(&self, stack: &str) -> Result<()> {
        print(&json!({ "stack": stack, "status": "deleted" }))
    }

    /// Render the configuration and its location.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config(&self, config: &StrataConfig, path: &Path) -> Result<()> {
        print(&json!({ "path": path, "config": config }))
    }

    /// Render the CLI version.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        print(&json!({ "version": version }))
    }
}
