//! Merge planning and application between two snapshot heads.
//!
//! [`plan_merge`] computes a three-way classification of every path across
//! the merge base, the current side, and the source side: apply (only the
//! source changed), conflict (both sides changed incompatibly), or in-sync.
//! It never touches the working tree. [`apply_merge`] materializes a plan
//! into a workspace under an explicit conflict resolution and records the
//! result as a two-parent merge snapshot.
//!
//! Deletions on the source side are deliberately conservative: a file the
//! source deleted but we still carry stays in place (in-sync), never an
//! automatic delete.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use serde::Serialize;
use tracing::info;

use crate::dag::{self, SnapshotSource};
use crate::error::{EngineError, Result};
use crate::manifest::Manifest;
use crate::store::Store;
use crate::workspace::{SnapshotIdentity, Workspace};

/// What to do with one path during a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeActionKind {
    /// Take the source side's content.
    Apply,
    /// Both sides changed the path since the base; needs a resolution.
    Conflict,
}

/// One path's merge classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeAction {
    /// Workspace-relative path.
    pub path: String,
    /// Classification.
    pub kind: MergeActionKind,
    /// Content hash at the merge base (empty when absent).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base_hash: String,
    /// Content hash on our side (empty when absent).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_hash: String,
    /// Content hash on the source side (empty when absent).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_hash: String,
    /// File mode on the source side.
    pub source_mode: u32,
}

/// The computed plan for merging a source head into a current head.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MergePlan {
    /// Files to take from the source (no conflict).
    pub to_apply: Vec<MergeAction>,
    /// Files both sides changed incompatibly.
    pub conflicts: Vec<MergeAction>,
    /// Count of files already identical (or kept as ours by policy).
    pub in_sync: usize,
    /// The merge base used (empty in forced two-way mode).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub merge_base_id: String,
    /// The current-side head.
    pub current_snapshot_id: String,
    /// The source-side head.
    pub source_snapshot_id: String,
}

/// How to settle conflicting paths when applying a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeResolution {
    /// Keep our version of every conflicting path.
    Ours,
    /// Take the source version of every conflicting path.
    Theirs,
}

/// Compute a three-way merge plan between two snapshot heads.
///
/// The merge base is found by DAG traversal across both stores. With
/// `force`, a missing common ancestor degrades to a two-way merge against
/// an empty base instead of failing.
pub fn plan_merge(
    target_store: &Store,
    source_store: &Store,
    current_id: &str,
    source_id: &str,
    force: bool,
) -> Result<MergePlan> {
    let current_manifest = load_manifest_either(target_store, source_store, current_id)?;
    let source_manifest = load_manifest_either(target_store, source_store, source_id)?;

    let snapshots = SnapshotSource::pair(target_store, source_store);
    let (merge_base_id, base_manifest) = match dag::merge_base(&snapshots, current_id, source_id) {
        Ok(base_id) => {
            let manifest = load_manifest_either(target_store, source_store, &base_id)
                .unwrap_or_else(|_| Manifest::empty());
            (base_id, manifest)
        }
        Err(e) if force => {
            info!(error = %e, "no merge base, forcing two-way merge");
            (String::new(), Manifest::empty())
        }
        Err(e) => return Err(e),
    };

    let (to_apply, conflicts, in_sync) =
        classify_paths(&base_manifest, &current_manifest, &source_manifest);

    Ok(MergePlan {
        to_apply,
        conflicts,
        in_sync,
        merge_base_id,
        current_snapshot_id: current_id.to_owned(),
        source_snapshot_id: source_id.to_owned(),
    })
}

fn load_manifest_either(target: &Store, source: &Store, snapshot_id: &str) -> Result<Manifest> {
    match target.load_manifest_for_snapshot(snapshot_id) {
        Ok(m) => Ok(m),
        Err(first) => source
            .load_manifest_for_snapshot(snapshot_id)
            .map_err(|_| first),
    }
}

/// Three-way classification of every path across base, current, and source.
fn classify_paths(
    base: &Manifest,
    current: &Manifest,
    source: &Manifest,
) -> (Vec<MergeAction>, Vec<MergeAction>, usize) {
    let hashes = |m: &Manifest| -> BTreeMap<String, (String, u32)> {
        m.file_entries()
            .map(|f| (f.path.clone(), (f.hash.clone(), f.mode)))
            .collect()
    };
    let base_files = hashes(base);
    let current_files = hashes(current);
    let source_files = hashes(source);

    let all_paths: BTreeSet<&String> = base_files
        .keys()
        .chain(current_files.keys())
        .chain(source_files.keys())
        .collect();

    let mut to_apply = Vec::new();
    let mut conflicts = Vec::new();
    let mut in_sync = 0usize;

    for path in all_paths {
        let base_entry = base_files.get(path);
        let current_entry = current_files.get(path);
        let source_entry = source_files.get(path);

        let action = |kind| MergeAction {
            path: path.clone(),
            kind,
            base_hash: base_entry.map(|(h, _)| h.clone()).unwrap_or_default(),
            current_hash: current_entry.map(|(h, _)| h.clone()).unwrap_or_default(),
            source_hash: source_entry.map(|(h, _)| h.clone()).unwrap_or_default(),
            source_mode: source_entry.map_or(0o644, |(_, m)| *m),
        };

        let current_changed = match (base_entry, current_entry) {
            (None, Some(_)) => true,
            (Some((b, _)), Some((c, _))) => b != c,
            _ => false,
        };
        let source_changed = match (base_entry, source_entry) {
            (None, Some(_)) => true,
            (Some((b, _)), Some((s, _))) => b != s,
            _ => false,
        };
        let current_deleted = base_entry.is_some() && current_entry.is_none();
        let source_deleted = base_entry.is_some() && source_entry.is_none();

        match (current_entry, source_entry) {
            // Path never existed on the source side: nothing to merge in.
            (_, None) if !source_deleted => {}

            // Deleted on both sides: same outcome.
            (None, None) => {}

            // Added by source only.
            (None, Some(_)) if !current_deleted => to_apply.push(action(MergeActionKind::Apply)),

            // We deleted it, source still carries (possibly modified) content.
            (None, Some(_)) => conflicts.push(action(MergeActionKind::Conflict)),

            // Source deleted, we still carry it: keep ours.
            (Some(_), None) => in_sync += 1,

            (Some((c, _)), Some((s, _))) if c == s => in_sync += 1,

            (Some(_), Some(_)) if !current_changed && source_changed => {
                to_apply.push(action(MergeActionKind::Apply));
            }

            (Some(_), Some(_)) if current_changed && !source_changed => in_sync += 1,

            // Both changed to different content.
            (Some(_), Some(_)) => conflicts.push(action(MergeActionKind::Conflict)),
        }
    }

    (to_apply, conflicts, in_sync)
}

/// Apply a merge plan to a workspace tree and record the merge snapshot.
///
/// Conflicting paths are settled by `resolution`. The resulting snapshot has
/// two parents — the workspace's current head and the source head — unless
/// nothing changed, in which case the current head is reused.
pub fn apply_merge(
    workspace: &mut Workspace,
    plan: &MergePlan,
    resolution: MergeResolution,
    identity: &SnapshotIdentity,
    message: &str,
) -> Result<crate::store::SnapshotMeta> {
    for action in &plan.to_apply {
        write_source_version(workspace, action)?;
    }
    if resolution == MergeResolution::Theirs {
        for action in &plan.conflicts {
            write_source_version(workspace, action)?;
        }
    }

    let mut parents = vec![plan.current_snapshot_id.clone()];
    if plan.source_snapshot_id != plan.current_snapshot_id {
        parents.push(plan.source_snapshot_id.clone());
    }
    workspace.create_snapshot_with_parents(message, identity, parents)
}

fn write_source_version(workspace: &Workspace, action: &MergeAction) -> Result<()> {
    if action.source_hash.is_empty() {
        return Ok(());
    }
    let content = workspace.store().read_blob(&action.source_hash)?;
    let target = workspace.root().join(&action.path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::io(format!("failed to create {}", parent.display()), e))?;
    }
    fs::write(&target, content)
        .map_err(|e| EngineError::io(format!("failed to write {}", target.display()), e))?;
    set_mode(&target, action.source_mode);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &std::path::Path, _mode: u32) {}
