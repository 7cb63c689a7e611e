//! Drift and divergence reporting.
//!
//! Cheap, file-level change summaries used as a pre-check before full
//! conflict detection: which paths changed, and roughly how much content
//! moved. Byte accounting is a change-volume heuristic, not an exact diff
//! byte count: added files count their full size, modified files count
//! `|new_size − old_size|`, deleted files count their original size — a
//! content-preserving edit of similar size is understated by design.

use serde::Serialize;
use tracing::debug;

use crate::dag::{self, SnapshotSource};
use crate::error::{EngineError, Result};
use crate::manifest::Manifest;
use crate::workspace::Workspace;

/// File-level drift between a base manifest and a current state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// The reference snapshot the comparison was made against, if known.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base_snapshot_id: String,
    /// Paths added since the base.
    pub files_added: Vec<String>,
    /// Paths whose content changed.
    pub files_modified: Vec<String>,
    /// Paths deleted since the base.
    pub files_deleted: Vec<String>,
    /// Approximate change volume in bytes (see module docs).
    pub bytes_changed: u64,
}

impl Report {
    /// True if any file changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.files_added.is_empty()
            || !self.files_modified.is_empty()
            || !self.files_deleted.is_empty()
    }

    /// Total number of changed files.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.files_added.len() + self.files_modified.len() + self.files_deleted.len()
    }

    /// Short human summary: `+a ~m -d (N KB)`.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return "No changes".to_owned();
        }
        format!(
            "+{} ~{} -{} ({})",
            self.files_added.len(),
            self.files_modified.len(),
            self.files_deleted.len(),
            format_bytes(self.bytes_changed)
        )
    }
}

/// Compare two manifests into a drift report (pure, no filesystem access).
#[must_use]
pub fn compare_manifests(base: &Manifest, current: &Manifest) -> Report {
    let diff = Manifest::diff(base, current);
    let bytes_changed = approximate_bytes_changed(base, current, &diff);
    Report {
        base_snapshot_id: String::new(),
        files_added: diff.added,
        files_modified: diff.modified,
        files_deleted: diff.deleted,
        bytes_changed,
    }
}

/// Compute drift of the live tree at `root` against a base manifest.
pub fn compute(root: &std::path::Path, base_manifest: &Manifest) -> Result<Report> {
    let current = Manifest::generate(root)?;
    Ok(compare_manifests(base_manifest, &current))
}

// ---------------------------------------------------------------------------
// Divergence between two workspaces
// ---------------------------------------------------------------------------

/// Divergence analysis between two workspaces.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DivergenceReport {
    /// Our workspace name.
    pub our_name: String,
    /// Their workspace name.
    pub their_name: String,
    /// Our head snapshot.
    pub our_head: String,
    /// Their head snapshot.
    pub their_head: String,
    /// Whether a shared ancestor was resolvable.
    pub has_common_ancestor: bool,
    /// The shared ancestor, when found.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub common_ancestor_id: String,
    /// Our changes relative to the ancestor (or to them, in two-way mode).
    pub our_changes: Report,
    /// Their changes relative to the ancestor (or to us, in two-way mode).
    pub their_changes: Report,
    /// Paths changed on both sides — conflict candidates, computed without
    /// hunk analysis.
    pub overlapping_paths: Vec<String>,
}

/// Analyze divergence between two workspaces.
///
/// Attempts to locate a shared ancestor, preferring the workspaces' recorded
/// fork/base snapshots when they agree, otherwise the DAG merge-base across
/// both stores. When no ancestor is resolvable, falls back to a direct
/// two-way comparison with `has_common_ancestor = false`.
///
/// `include_dirty` selects each side's live tree (manifested on the fly)
/// instead of its head snapshot.
pub fn compute_divergence(
    ours: &Workspace,
    theirs: &Workspace,
    include_dirty: bool,
) -> Result<DivergenceReport> {
    let our_head = ours.head()?.unwrap_or_default();
    let their_head = theirs.head()?.unwrap_or_default();

    let our_manifest = side_manifest(ours, &our_head, include_dirty)?;
    let their_manifest = side_manifest(theirs, &their_head, include_dirty)?;

    let ancestor = resolve_common_ancestor(ours, theirs, &our_head, &their_head);

    let mut report = DivergenceReport {
        our_name: ours.config().workspace_name.clone(),
        their_name: theirs.config().workspace_name.clone(),
        our_head: our_head.clone(),
        their_head: their_head.clone(),
        ..DivergenceReport::default()
    };

    if let Some(ancestor_id) = ancestor {
        let ancestor_manifest = load_manifest_either(ours, theirs, &ancestor_id)?;
        let our_changes = compare_manifests(&ancestor_manifest, &our_manifest);
        let their_changes = compare_manifests(&ancestor_manifest, &their_manifest);

        let our_paths = changed_path_set(&our_changes);
        report.overlapping_paths = changed_path_set(&their_changes)
            .intersection(&our_paths)
            .cloned()
            .collect();
        report.has_common_ancestor = true;
        report.common_ancestor_id = ancestor_id.clone();
        report.our_changes = Report {
            base_snapshot_id: ancestor_id.clone(),
            ..our_changes
        };
        report.their_changes = Report {
            base_snapshot_id: ancestor_id,
            ..their_changes
        };
    } else {
        // No shared history: report a direct two-way comparison.
        debug!(
            ours = %report.our_name,
            theirs = %report.their_name,
            "no common ancestor, falling back to two-way comparison"
        );
        report.our_changes = compare_manifests(&their_manifest, &our_manifest);
        report.their_changes = compare_manifests(&our_manifest, &their_manifest);
    }

    Ok(report)
}

fn side_manifest(ws: &Workspace, head: &str, include_dirty: bool) -> Result<Manifest> {
    if include_dirty || head.is_empty() {
        return ws.current_manifest();
    }
    ws.store().load_manifest_for_snapshot(head)
}

fn resolve_common_ancestor(
    ours: &Workspace,
    theirs: &Workspace,
    our_head: &str,
    their_head: &str,
) -> Option<String> {
    // Matching recorded fork points are authoritative and cheap.
    let our_base = &ours.config().base_snapshot_id;
    if !our_base.is_empty() && our_base == &theirs.config().base_snapshot_id {
        return Some(our_base.clone());
    }
    if our_head.is_empty() || their_head.is_empty() {
        return None;
    }
    let source = SnapshotSource::pair(ours.store(), theirs.store());
    dag::merge_base(&source, our_head, their_head).ok()
}

fn load_manifest_either(ours: &Workspace, theirs: &Workspace, snapshot_id: &str) -> Result<Manifest> {
    match ours.store().load_manifest_for_snapshot(snapshot_id) {
        Ok(m) => Ok(m),
        Err(EngineError::NotFound { .. }) => theirs.store().load_manifest_for_snapshot(snapshot_id),
        Err(e) => Err(e),
    }
}

fn changed_path_set(report: &Report) -> std::collections::BTreeSet<String> {
    report
        .files_added
        .iter()
        .chain(report.files_modified.iter())
        .chain(report.files_deleted.iter())
        .cloned()
        .collect()
}

fn approximate_bytes_changed(
    base: &Manifest,
    current: &Manifest,
    diff: &crate::manifest::ManifestDiff,
) -> u64 {
    let size_of = |m: &Manifest, path: &str| m.file_entry(path).map_or(0, |f| f.size);

    let mut bytes = 0u64;
    for path in &diff.added {
        bytes += size_of(current, path);
    }
    for path in &diff.modified {
        let new = size_of(current, path);
        let old = size_of(base, path);
        bytes += new.abs_diff(old);
    }
    for path in &diff.deleted {
        bytes += size_of(base, path);
    }
    bytes
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
