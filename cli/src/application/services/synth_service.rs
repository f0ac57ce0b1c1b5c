//! Application service — synthesis use-case.
//!
//! Resolves the requested stacks, hashes and stages the assets they use,
//! and writes one template per stack plus the manifest. A partial run
//! updates its own entries in an existing manifest and keeps the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use strata_common::{MANIFEST_VERSION, Manifest, ManifestStack, Template, template_file_name};
use tracing::{debug, info, warn};

use crate::application::ports::{AssetHasher, ProgressReporter, TemplateSink};
use crate::domain::App;
use crate::domain::config::StrataConfig;
use crate::domain::storage::staged_asset_dir;

/// One stack written to disk.
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub name: String,
    pub template_path: PathBuf,
    pub template: Template,
    pub manifest: ManifestStack,
}

impl SynthesizedStack {
    /// Whether the deploy step has to package local files for this stack.
    #[must_use]
    pub fn has_assets(&self) -> bool {
        !self.manifest.assets.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SynthOutcome {
    pub stacks: Vec<SynthesizedStack>,
    pub manifest_path: PathBuf,
}

/// Canonical names for the requested stacks, deduplicated, in the order
/// given. An empty request selects every stack.
///
/// # Errors
///
/// Returns an error if any name is unknown.
pub fn select_stacks(requested: &[String]) -> Result<Vec<&'static str>> {
    if requested.is_empty() {
        return Ok(App::names().to_vec());
    }
    let mut selected = Vec::new();
    for name in requested {
        let canonical = App::resolve(name)?;
        if !selected.contains(&canonical) {
            selected.push(canonical);
        }
    }
    Ok(selected)
}

/// Hash every asset directory the selected stacks need.
///
/// # Errors
///
/// Returns an error if an asset directory cannot be read.
pub fn hash_assets(
    config: &StrataConfig,
    stacks: &[&str],
    hasher: &impl AssetHasher,
) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for stack in stacks {
        for path in App::required_assets(config, stack)? {
            if hashes.contains_key(&path) {
                continue;
            }
            let hash = hasher
                .hash_dir(Path::new(&path))
                .with_context(|| format!("hashing asset '{path}' for {stack}"))?;
            debug!(%path, %hash, "asset hashed");
            hashes.insert(path, hash);
        }
    }
    Ok(hashes)
}

/// Compose and synthesize the selected stacks without touching the output
/// directory.
///
/// # Errors
///
/// Returns the first composition or validation error.
pub fn compose(
    config: &StrataConfig,
    stacks: &[&str],
    hasher: &impl AssetHasher,
) -> Result<Vec<(ManifestStack, Template)>> {
    let app = App::from_config(config, hash_assets(config, stacks, hasher)?);
    stacks
        .iter()
        .map(|name| {
            let stack = app.stack(name)?;
            let template = stack
                .synth()
                .with_context(|| format!("synthesizing {name}"))?;
            let entry = ManifestStack {
                name: stack.name().to_string(),
                template_file: template_file_name(stack.name()),
                resource_count: stack.resource_count(),
                assets: stack.assets().to_vec(),
            };
            Ok((entry, template))
        })
        .collect()
}

/// Synthesize the requested stacks into `output_dir`.
///
/// # Errors
///
/// Returns an error if a stack name is unknown, a stack fails validation,
/// or an artifact cannot be written.
pub fn synth(
    config: &StrataConfig,
    requested: &[String],
    output_dir: &Path,
    hasher: &impl AssetHasher,
    sink: &impl TemplateSink,
    reporter: &impl ProgressReporter,
) -> Result<SynthOutcome> {
    let selected = select_stacks(requested)?;
    info!(stacks = ?selected, output_dir = %output_dir.display(), "synthesizing");

    let mut stacks = Vec::new();
    for (entry, template) in compose(config, &selected, hasher)? {
        reporter.step(&format!("Synthesizing {}...", entry.name));
        for asset in &entry.assets {
            sink.stage_asset(output_dir, Path::new(&asset.path), &staged_asset_dir(&asset.hash))
                .with_context(|| format!("staging asset '{}'", asset.path))?;
        }
        let body = template
            .to_json_pretty()
            .with_context(|| format!("serializing {}", entry.name))?;
        let template_path = sink.write_template(output_dir, &entry.name, &body)?;
        info!(stack = %entry.name, resources = entry.resource_count, "template written");
        reporter.success(&format!(
            "{} ({} resources) → {}",
            entry.name,
            entry.resource_count,
            template_path.display()
        ));
        stacks.push(SynthesizedStack {
            name: entry.name.clone(),
            template_path,
            template,
            manifest: entry,
        });
    }

    let entries: Vec<ManifestStack> = stacks.iter().map(|s| s.manifest.clone()).collect();
    let manifest = match sink.read_manifest(output_dir) {
        Ok(Some(mut existing)) if existing.version == MANIFEST_VERSION => {
            existing.merge(entries);
            existing
        }
        Ok(_) => Manifest::new(entries),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "replacing unreadable manifest");
            reporter.warn("Existing manifest is unreadable; writing a new one");
            Manifest::new(entries)
        }
    };
    let manifest_path = sink.write_manifest(output_dir, &manifest)?;
    Ok(SynthOutcome {
        stacks,
        manifest_path,
    })
}
