//! Merge regenerated artifacts into a live package directory.
//!
//! Generated files overwrite their counterparts. The files in [`PRESERVED_FILES`] are
//! never copied wholesale: `.gitignore` and the package documentation are
//! hand-maintained, `CHANGELOG.md` belongs to the changelog writer, and the manifest
//! only receives the [`MANIFEST_SUBTREES`] from the generated manifest. Every other
//! manifest field (name, scripts, dependencies, authorship) stays as it was.

use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::changelog::CHANGELOG_FILE;
use crate::error::{Result, SyncError};
use crate::provider::{lookup, lookup_mut, read_manifest, write_manifest, MANIFEST_FILE};

/// Files at the package root that regeneration must not replace.
pub const PRESERVED_FILES: &[&str] = &[MANIFEST_FILE, ".gitignore", "README.md", CHANGELOG_FILE];

/// A manifest key path whose value is owned by the generator.
///
/// Merging replaces the value at `path` wholesale and keeps every sibling key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeableSubtree {
    pub path: &'static [&'static str],
}

impl MergeableSubtree {
    pub const fn new(path: &'static [&'static str]) -> Self {
        Self { path }
    }

    pub fn extract<'a>(&self, manifest: &'a Value) -> Option<&'a Value> {
        lookup(manifest, self.path)
    }

    /// Put `value` at this path in `manifest`, creating parent objects as needed.
    pub fn splice(&self, manifest: &mut Value, value: Value) {
        *lookup_mut(manifest, self.path) = value;
    }

    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// Provider-binding metadata the generator owns inside `package.json`.
pub const MANIFEST_SUBTREES: &[MergeableSubtree] =
    &[MergeableSubtree::new(&["pulumi", "parameterization"])];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub files_copied: usize,
    /// Preserved files that were present in the generated output and left alone.
    pub preserved: Vec<PathBuf>,
    pub manifest_updated: bool,
}

/// Copy `generated_dir` into `target_dir`, then splice the generated manifest subtrees.
pub fn merge(generated_dir: &Path, target_dir: &Path) -> Result<MergeReport> {
    let mut report = MergeReport::default();

    for entry in WalkDir::new(generated_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| merge_error(generated_dir, io::Error::from(e)))?;
        let relative = entry
            .path()
            .strip_prefix(generated_dir)
            .map_err(|e| merge_error(entry.path(), io::Error::new(io::ErrorKind::Other, e)))?;
        let destination = target_dir.join(relative);

        if is_preserved(relative) {
            debug!(file = %relative.display(), "Preserving hand-maintained file");
            report.preserved.push(relative.to_path_buf());
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&destination).map_err(|e| merge_error(&destination, e))?;
        } else if file_type.is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| merge_error(parent, e))?;
            }
            fs::copy(entry.path(), &destination).map_err(|e| merge_error(&destination, e))?;
            report.files_copied += 1;
        } else {
            warn!(path = %entry.path().display(), "Skipping non-regular file in generated output");
        }
    }

    report.manifest_updated = merge_manifest(
        &generated_dir.join(MANIFEST_FILE),
        &target_dir.join(MANIFEST_FILE),
    )?;

    info!(
        target = %target_dir.display(),
        files_copied = report.files_copied,
        manifest_updated = report.manifest_updated,
        "[SYNC][MERGE] Merged generated artifacts"
    );
    Ok(report)
}

/// Splice [`MANIFEST_SUBTREES`] from the generated manifest into the target manifest.
///
/// Returns `false`, leaving the target untouched, when the generated manifest is
/// missing or carries none of the subtrees.
pub fn merge_manifest(generated_manifest: &Path, target_manifest: &Path) -> Result<bool> {
    if !generated_manifest.is_file() {
        debug!(path = %generated_manifest.display(), "Generated output has no manifest");
        return Ok(false);
    }
    let generated = read_manifest(generated_manifest).map_err(|e| merge_error(generated_manifest, e))?;

    let updates: Vec<(&MergeableSubtree, &Value)> = MANIFEST_SUBTREES
        .iter()
        .filter_map(|subtree| subtree.extract(&generated).map(|v| (subtree, v)))
        .collect();
    if updates.is_empty() {
        debug!("Generated manifest carries no mergeable subtree; keeping target manifest");
        return Ok(false);
    }

    if !target_manifest.is_file() {
        warn!(path = %target_manifest.display(), "Target package has no manifest to merge into");
        return Ok(false);
    }
    let mut target = read_manifest(target_manifest).map_err(|e| merge_error(target_manifest, e))?;
    for (subtree, value) in updates {
        debug!(subtree = %subtree.dotted(), "Replacing manifest subtree");
        subtree.splice(&mut target, value.clone());
    }
    write_manifest(target_manifest, &target).map_err(|e| merge_error(target_manifest, e))?;
    Ok(true)
}

fn is_preserved(relative: &Path) -> bool {
    relative.components().count() == 1
        && relative
            .to_str()
            .is_some_and(|name| PRESERVED_FILES.contains(&name))
}

fn merge_error(path: &Path, source: io::Error) -> SyncError {
    SyncError::Merge {
        path: path.to_path_buf(),
        source,
    }
}
