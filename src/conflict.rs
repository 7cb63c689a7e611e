//! Three-way conflict detection between diverged workspace states.
//!
//! Given a common-ancestor manifest and two descendant manifests, finds the
//! files both sides changed and, for those whose final content differs, the
//! line spans where the two edits actually collide. Files both sides touched
//! whose edits land on disjoint lines produce no hunks — they appear in
//! `overlapping_files` but don't count as true conflicts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::diff::{ChangedRegion, changed_regions, regions_overlap};
use crate::error::Result;
use crate::manifest::Manifest;
use crate::store::Store;

// ---------------------------------------------------------------------------
// Blob access
// ---------------------------------------------------------------------------

/// Read access to file content by content hash.
///
/// Implemented by the project [`Store`] (blob directory) and by
/// [`WorktreeBlobs`] (live workspace files located via a manifest), so the
/// detector can compare snapshots, dirty working copies, or a mix.
pub trait BlobAccess {
    /// Fetch the content for `hash`.
    fn get(&self, hash: &str) -> Result<Vec<u8>>;
}

impl BlobAccess for Store {
    fn get(&self, hash: &str) -> Result<Vec<u8>> {
        self.read_blob(hash)
    }
}

/// Blob access backed by a live workspace tree: resolves a hash to a path
/// through the manifest, then reads the file.
pub struct WorktreeBlobs<'a> {
    root: PathBuf,
    manifest: &'a Manifest,
}

impl<'a> WorktreeBlobs<'a> {
    /// Create an accessor for the workspace at `root` described by `manifest`.
    #[must_use]
    pub fn new(root: &Path, manifest: &'a Manifest) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest,
        }
    }
}

impl BlobAccess for WorktreeBlobs<'_> {
    fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let entry = self
            .manifest
            .file_entries()
            .find(|f| f.hash == hash)
            .ok_or_else(|| crate::error::EngineError::NotFound {
                kind: "blob",
                id: hash.to_owned(),
            })?;
        std::fs::read(self.root.join(&entry.path)).map_err(|_| {
            crate::error::EngineError::NotFound {
                kind: "blob",
                id: hash.to_owned(),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// A line span where two divergent edits overlap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// First base line of the colliding span (1-based).
    pub start_line: usize,
    /// Last base line of the colliding span: the max of the two overlapping
    /// regions' ends.
    pub end_line: usize,
    /// Base lines across the span.
    pub base_lines: Vec<String>,
    /// The local side's lines for its changed region.
    pub local_lines: Vec<String>,
    /// The other side's lines for its changed region.
    pub source_lines: Vec<String>,
}

/// All colliding hunks for one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileConflict {
    /// Workspace-relative path.
    pub path: String,
    /// Colliding line spans. A whole-file conflict (delete vs. modify) is a
    /// single `1..1` sentinel hunk.
    pub hunks: Vec<Hunk>,
}

/// The outcome of three-way conflict detection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Files with at least one colliding hunk.
    pub conflicts: Vec<FileConflict>,
    /// Files changed on both sides since the base (colliding or not), sorted.
    pub overlapping_files: Vec<String>,
    /// Number of files with ≥ 1 hunk.
    pub true_conflicts: usize,
}

impl Report {
    /// True if any file has colliding edits.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.true_conflicts == 0 {
            if self.overlapping_files.is_empty() {
                return "No conflicts".to_owned();
            }
            return format!(
                "No conflicts ({} files modified on both sides, but changes don't overlap)",
                self.overlapping_files.len()
            );
        }
        let total_hunks: usize = self.conflicts.iter().map(|c| c.hunks.len()).sum();
        format!(
            "{} conflicting files with {} overlapping regions",
            self.true_conflicts, total_hunks
        )
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Run three-way conflict detection.
///
/// `local_blobs` / `other_blobs` / `base_blobs` resolve content for the
/// respective manifests. Files whose content cannot be fetched are skipped
/// with a warning rather than failing the whole report.
pub fn detect(
    base: &Manifest,
    local: &Manifest,
    other: &Manifest,
    base_blobs: &dyn BlobAccess,
    local_blobs: &dyn BlobAccess,
    other_blobs: &dyn BlobAccess,
) -> Report {
    let local_changed = Manifest::diff(base, local).changed_paths();
    let other_changed = Manifest::diff(base, other).changed_paths();
    let overlapping: Vec<String> = local_changed
        .intersection(&other_changed)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut conflicts = Vec::new();
    for path in &overlapping {
        let base_entry = base.file_entry(path);
        let local_entry = local.file_entry(path);
        let other_entry = other.file_entry(path);

        match (local_entry, other_entry) {
            (None, None) => {} // deleted on both sides: same outcome, no conflict
            (None, Some(_)) | (Some(_), None) => {
                // One side deleted, the other still has content: whole-file
                // conflict, no line diff attempted.
                conflicts.push(FileConflict {
                    path: path.clone(),
                    hunks: vec![whole_file_hunk()],
                });
            }
            (Some(l), Some(o)) => {
                if l.hash == o.hash {
                    // Both sides converged on identical content.
                    continue;
                }
                // A path absent from the base (added on both sides) diffs
                // against empty content.
                let base_content = match base_entry {
                    None => String::new(),
                    Some(e) => match fetch(Some(e.hash.as_str()), base_blobs, path) {
                        Some(c) => c,
                        None => continue,
                    },
                };
                let Some(local_content) = fetch(Some(l.hash.as_str()), local_blobs, path) else {
                    continue;
                };
                let Some(other_content) = fetch(Some(o.hash.as_str()), other_blobs, path) else {
                    continue;
                };

                let hunks = colliding_hunks(&base_content, &local_content, &other_content);
                if !hunks.is_empty() {
                    conflicts.push(FileConflict {
                        path: path.clone(),
                        hunks,
                    });
                }
            }
        }
    }

    let true_conflicts = conflicts.len();
    Report {
        conflicts,
        overlapping_files: overlapping,
        true_conflicts,
    }
}

/// Compute the colliding hunks between two divergent edits of `base`.
#[must_use]
pub fn colliding_hunks(base: &str, local: &str, other: &str) -> Vec<Hunk> {
    let local_regions = changed_regions(base, local);
    let other_regions = changed_regions(base, other);
    let base_lines: Vec<&str> = base.lines().collect();

    let mut hunks = Vec::new();
    for lr in &local_regions {
        for or in &other_regions {
            if regions_overlap(lr, or) {
                hunks.push(hunk_for(lr, or, &base_lines));
            }
        }
    }
    hunks
}

fn hunk_for(local: &ChangedRegion, other: &ChangedRegion, base_lines: &[&str]) -> Hunk {
    let start_line = local.start.min(other.start);
    let end_line = local.end.max(other.end);
    let slice_end = end_line.min(base_lines.len());
    let base_slice = if start_line <= slice_end {
        base_lines[start_line - 1..slice_end]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    } else {
        Vec::new()
    };
    Hunk {
        start_line,
        end_line,
        base_lines: base_slice,
        local_lines: local.replacement.clone(),
        source_lines: other.replacement.clone(),
    }
}

const fn whole_file_hunk() -> Hunk {
    Hunk {
        start_line: 1,
        end_line: 1,
        base_lines: Vec::new(),
        local_lines: Vec::new(),
        source_lines: Vec::new(),
    }
}

fn fetch(hash: Option<&str>, blobs: &dyn BlobAccess, path: &str) -> Option<String> {
    let hash = hash?;
    if hash.is_empty() {
        return Some(String::new());
    }
    match blobs.get(hash) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(path, error = %e, "skipping file content unavailable for conflict analysis");
            None
        }
    }
}
