//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `strata_common` — never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use strata_common::Manifest;

use crate::domain::config::StrataConfig;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Configuration Port ────────────────────────────────────────────────────────

/// Abstracts configuration persistence (load/save).
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults when no file exists.
    fn load(&self) -> Result<StrataConfig>;
    /// Persist the configuration.
    fn save(&self, config: &StrataConfig) -> Result<()>;
    /// Location of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

// ── Synthesis Output Ports ────────────────────────────────────────────────────

/// Computes content hashes of asset directories.
pub trait AssetHasher {
    /// Lowercase hex SHA-256 over every file under `path`, visited in sorted
    /// order, covering relative file names as well as contents.
    fn hash_dir(&self, path: &Path) -> Result<String>;
}

/// Destination for synthesized artifacts.
pub trait TemplateSink {
    /// Write `<dir>/<stack>.template.json` and return its path.
    fn write_template(&self, dir: &Path, stack: &str, body: &str) -> Result<PathBuf>;
    /// Read `<dir>/manifest.json`, or `None` when there is none yet.
    fn read_manifest(&self, dir: &Path) -> Result<Option<Manifest>>;
    /// Write `<dir>/manifest.json` and return its path.
    fn write_manifest(&self, dir: &Path, manifest: &Manifest) -> Result<PathBuf>;
    /// Copy the asset directory `source` to `<dir>/<staged>`, replacing any
    /// previous copy.
    fn stage_asset(&self, dir: &Path, source: &Path, staged: &str) -> Result<PathBuf>;
}
