use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest file written next to synthesized templates.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest schema version.
pub const MANIFEST_VERSION: &str = "1";

/// File name of a stack's template inside the output directory.
#[must_use]
pub fn template_file_name(stack: &str) -> String {
    format!("{stack}.template.json")
}

/// Index of one synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub synthesized_at: DateTime<Utc>,
    pub stacks: Vec<ManifestStack>,
}

/// One synthesized stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestStack {
    pub name: String,
    pub template_file: String,
    pub resource_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetEntry>,
}

/// A local file tree the deploy step packages and uploads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetEntry {
    /// Logical id of the resource that consumes the asset.
    pub logical_id: String,
    pub path: String,
    /// Lowercase hex SHA-256 over the asset's files.
    pub hash: String,
}

impl Manifest {
    #[must_use]
    pub fn new(stacks: Vec<ManifestStack>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            synthesized_at: Utc::now(),
            stacks,
        }
    }

    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&ManifestStack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Fold a later, possibly partial, run into this manifest. Entries for
    /// the same stack are replaced in place; new stacks are appended.
    pub fn merge(&mut self, stacks: Vec<ManifestStack>) {
        for stack in stacks {
            match self.stacks.iter_mut().find(|s| s.name == stack.name) {
                Some(existing) => *existing = stack,
                None => self.stacks.push(stack),
            }
        }
        MANIFEST_VERSION.clone_into(&mut self.version);
        self.synthesized_at = Utc::now();
    }
}
