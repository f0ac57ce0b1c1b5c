//! Filesystem infrastructure — asset hashing and synthesis artifact writing.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use strata_common::{MANIFEST_FILE, Manifest, template_file_name};
use tracing::debug;

use crate::application::ports::{AssetHasher, TemplateSink};
use crate::domain::stack::hex_encode;

/// Production filesystem implementation of `AssetHasher` and `TemplateSink`.
pub struct LocalFs;

impl AssetHasher for LocalFs {
    fn hash_dir(&self, path: &Path) -> Result<String> {
        sha256_tree(path)
    }
}

impl TemplateSink for LocalFs {
    fn write_template(&self, dir: &Path, stack: &str, body: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let path = dir.join(template_file_name(stack));
        std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    fn read_manifest(&self, dir: &Path) -> Result<Option<Manifest>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text =
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let manifest =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(manifest))
    }

    fn write_manifest(&self, dir: &Path, manifest: &Manifest) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let path = dir.join(MANIFEST_FILE);
        let body = serde_json::to_string_pretty(manifest).context("serializing manifest")?;
        std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    fn stage_asset(&self, dir: &Path, source: &Path, staged: &str) -> Result<PathBuf> {
        let target = dir.join(staged);
        if target.exists() {
            std::fs::remove_dir_all(&target)
                .with_context(|| format!("removing stale asset {}", target.display()))?;
        }
        copy_tree(source, &target)?;
        Ok(target)
    }
}

/// Files under `root`, relative to it, in sorted order. A plain file yields
/// itself under its own name. Symlinks are followed; a directory reached
/// twice through links is listed once.
fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(root).with_context(|| format!("reading {}", root.display()))?;
    if meta.is_file() {
        return Ok(vec![PathBuf::from(root.file_name().unwrap_or(root.as_os_str()))]);
    }
    let mut visited = HashSet::new();
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        let dir = root.join(&rel);
        let canonical = dir
            .canonicalize()
            .with_context(|| format!("resolving {}", dir.display()))?;
        if !visited.insert(canonical) {
            debug!(dir = %dir.display(), "directory already listed, skipping link");
            continue;
        }
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
            let child = rel.join(entry.file_name());
            // Follows symlinks, unlike `entry.file_type()`.
            let target = std::fs::metadata(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            if target.is_dir() {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// SHA-256 over every file under `root`: each file contributes its relative
/// path (with `/` separators), a NUL byte, then its contents.
///
/// Reads files in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if `root` or any file below it cannot be read.
pub fn sha256_tree(root: &Path) -> Result<String> {
    let is_file = root.is_file();
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    for rel in list_files(root)? {
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        let path = if is_file { root.to_path_buf() } else { root.join(&rel) };
        let mut file =
            std::fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        loop {
            let n = file
                .read(&mut buf)
                .with_context(|| format!("reading {}", path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).with_context(|| format!("creating {}", target.display()))?;
    if source.is_file() {
        let name = source.file_name().unwrap_or(source.as_os_str());
        std::fs::copy(source, target.join(name))
            .with_context(|| format!("copying {}", source.display()))?;
        return Ok(());
    }
    for rel in list_files(source)? {
        let to = target.join(&rel);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::copy(source.join(&rel), &to)
            .with_context(|| format!("copying {}", source.join(&rel).display()))?;
    }
    Ok(())
}
