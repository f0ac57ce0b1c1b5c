//! Shared mock implementations of the application ports.
//!
//! Each mock records what it was asked to do so tests can assert on the
//! exact sequence of calls.

#![allow(clippy::expect_used, dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::time::Duration;

use anyhow::Result;
use strata_cli::application::ports::{
    AssetHasher, CommandRunner, ConfigStore, ProgressReporter, TemplateSink,
};
use strata_cli::domain::config::StrataConfig;
use strata_common::Manifest;

// ── Output helpers ────────────────────────────────────────────────────────────

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(stderr: &[u8]) -> Output {
    Output {
        status: ExitStatus::from_raw(1 << 8),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Mock: command runner ──────────────────────────────────────────────────────

/// Returns queued outputs in order (success with empty stdout once the
/// queue is drained) and records every invocation.
#[derive(Default)]
pub struct RecordingRunner {
    responses: RefCell<VecDeque<Output>>,
    pub calls: RefCell<Vec<(String, Vec<String>, Duration)>>,
}

impl RecordingRunner {
    pub fn with_responses(responses: Vec<Output>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::default(),
        }
    }

    /// Second argument of each call: the `cloudformation` subcommand.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(_, args, _)| args.get(1).cloned().unwrap_or_default())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, Duration::from_secs(1)).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        self.calls.borrow_mut().push((
            program.to_string(),
            args.iter().map(ToString::to_string).collect(),
            timeout,
        ));
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ok_output(b"")))
    }
}

// ── Mock: config store ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryConfigStore {
    pub config: RefCell<Option<StrataConfig>>,
    pub saves: RefCell<usize>,
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<StrataConfig> {
        Ok(self.config.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &StrataConfig) -> Result<()> {
        *self.config.borrow_mut() = Some(config.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("memory://strata.yaml"))
    }
}

// ── Mock: asset hasher ────────────────────────────────────────────────────────

/// Hashes every path to `hash-<path>`; paths listed in `missing` fail.
#[derive(Default)]
pub struct FakeHasher {
    pub missing: Vec<String>,
    pub hashed: RefCell<Vec<PathBuf>>,
}

impl AssetHasher for FakeHasher {
    fn hash_dir(&self, path: &Path) -> Result<String> {
        self.hashed.borrow_mut().push(path.to_path_buf());
        let name = path.display().to_string();
        if self.missing.contains(&name) {
            anyhow::bail!("reading {name}: No such file or directory");
        }
        Ok(format!("hash-{name}"))
    }
}

// ── Mock: template sink ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySink {
    pub templates: RefCell<BTreeMap<String, String>>,
    pub manifest: RefCell<Option<Manifest>>,
    pub staged: RefCell<Vec<(PathBuf, String)>>,
}

impl TemplateSink for MemorySink {
    fn write_template(&self, dir: &Path, stack: &str, body: &str) -> Result<PathBuf> {
        self.templates
            .borrow_mut()
            .insert(stack.to_string(), body.to_string());
        Ok(dir.join(format!("{stack}.template.json")))
    }

    fn read_manifest(&self, _dir: &Path) -> Result<Option<Manifest>> {
        Ok(self.manifest.borrow().clone())
    }

    fn write_manifest(&self, dir: &Path, manifest: &Manifest) -> Result<PathBuf> {
        *self.manifest.borrow_mut() = Some(manifest.clone());
        Ok(dir.join("manifest.json"))
    }

    fn stage_asset(&self, dir: &Path, source: &Path, staged: &str) -> Result<PathBuf> {
        self.staged
            .borrow_mut()
            .push((source.to_path_buf(), staged.to_string()));
        Ok(dir.join(staged))
    }
}

// ── Mock: progress reporter ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub events: RefCell<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.events.borrow_mut().push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.events.borrow_mut().push(format!("success: {message}"));
    }

    fn warn(&self, message: &str) {
        self.events.borrow_mut().push(format!("warn: {message}"));
    }
}
