//! Persistent export state: the snapshot↔commit mapping and export metadata.
//!
//! [`GitMapping`] lives in `.warren/export/git-map.json` and records which
//! snapshots have been exported as which commits. It is a cache over the DAG:
//! `--rebuild` discards it and regenerates commits from scratch, so a corrupt
//! mapping degrades to empty instead of failing the caller.
//!
//! [`ExportMeta`] describes the exported project (which workspace maps to
//! which branch) and travels *with* the git repository on the
//! `refs/warren/meta` ref, so an importing side can discover branches without
//! any out-of-band state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::env::{CommitMeta, GitEnv};
use crate::config::now_rfc3339;
use crate::error::{EngineError, Result};
use crate::store::atomic_write_file;

/// Ref carrying the export metadata commit chain.
pub const META_REF: &str = "refs/warren/meta";

/// Path of the metadata file inside the meta commit's tree.
pub const META_PATH: &str = ".warren-export/meta.json";

// ---------------------------------------------------------------------------
// GitMapping
// ---------------------------------------------------------------------------

/// Snapshot → commit mapping for one exported repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMapping {
    /// The repository the mapping belongs to.
    #[serde(default)]
    pub repo_path: PathBuf,
    /// snapshot ID → git commit SHA, one entry per exported snapshot.
    #[serde(default)]
    pub snapshots: BTreeMap<String, String>,
}

impl GitMapping {
    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join("export").join("git-map.json")
    }

    /// Load the mapping from a `.warren` state directory. Missing or corrupt
    /// files degrade to an empty mapping.
    #[must_use]
    pub fn load(state_dir: &Path) -> Self {
        let path = Self::file_path(state_dir);
        let Ok(data) = fs::read(&path) else {
            return Self::default();
        };
        match serde_json::from_slice(&data) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "git mapping corrupt, starting empty");
                Self::default()
            }
        }
    }

    /// Persist the mapping into a `.warren` state directory.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = Self::file_path(state_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::io(format!("failed to create {}", parent.display()), e))?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| EngineError::Corrupt {
            kind: "git mapping",
            id: String::new(),
            detail: format!("failed to serialize: {e}"),
        })?;
        atomic_write_file(&path, &data)
    }

    /// Build the reverse map: commit SHA → snapshot ID.
    #[must_use]
    pub fn commits_to_snapshots(&self) -> BTreeMap<String, String> {
        self.snapshots
            .iter()
            .map(|(snap, commit)| (commit.clone(), snap.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ExportMeta
// ---------------------------------------------------------------------------

/// One workspace's entry in the export metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWorkspaceMeta {
    /// Workspace ID.
    pub workspace_id: String,
    /// Workspace name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_name: String,
    /// Exported branch name.
    pub branch: String,
}

/// The exported project description stored on [`META_REF`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    /// Format version.
    pub version: u32,
    /// Last update time, RFC 3339 UTC.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    /// Owning project ID.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// workspace ID → branch info.
    #[serde(default)]
    pub workspaces: BTreeMap<String, ExportWorkspaceMeta>,
}

impl ExportMeta {
    /// Deduplicated branch names across all workspaces, sorted.
    #[must_use]
    pub fn branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = self
            .workspaces
            .values()
            .filter(|ws| !ws.branch.is_empty())
            .map(|ws| ws.branch.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        branches.sort();
        branches
    }
}

/// Load export metadata from [`META_REF`], or `None` when the project has
/// never been exported.
pub fn load_export_metadata(git: &GitEnv) -> Result<Option<ExportMeta>> {
    let Some(data) = git.show_file_at_ref(META_REF, META_PATH)? else {
        return Ok(None);
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| EngineError::Corrupt {
            kind: "export metadata",
            id: META_REF.to_owned(),
            detail: format!("invalid metadata JSON: {e}"),
        })
}

/// Load export metadata from a repository without an existing [`GitEnv`],
/// using a throwaway scratch work-tree.
pub fn load_export_metadata_from_repo(repo_root: &Path) -> Result<Option<ExportMeta>> {
    let scratch = tempfile::Builder::new()
        .prefix("warren-meta-")
        .tempdir()
        .map_err(|e| EngineError::io("failed to create scratch dir".to_owned(), e))?;
    let git = GitEnv::new(repo_root, scratch.path(), &scratch.path().join("index"));
    load_export_metadata(&git)
}

/// Upsert a workspace entry into the export metadata and commit the result
/// onto [`META_REF`] (parented on the previous metadata commit, if any).
///
/// `meta_git` must use a scratch work-tree dedicated to metadata so the
/// metadata tree never mixes with exported snapshot trees.
pub fn update_export_metadata(
    meta_git: &GitEnv,
    project_id: &str,
    entry: ExportWorkspaceMeta,
) -> Result<()> {
    if entry.workspace_id.is_empty() {
        return Err(EngineError::Corrupt {
            kind: "export metadata",
            id: META_REF.to_owned(),
            detail: "missing workspace id".to_owned(),
        });
    }

    let mut meta = load_export_metadata(meta_git)?.unwrap_or(ExportMeta {
        version: 1,
        ..ExportMeta::default()
    });
    meta.project_id = project_id.to_owned();
    meta.updated_at = now_rfc3339();
    meta.workspaces.insert(entry.workspace_id.clone(), entry);

    let data = serde_json::to_vec_pretty(&meta).map_err(|e| EngineError::Corrupt {
        kind: "export metadata",
        id: META_REF.to_owned(),
        detail: format!("failed to serialize: {e}"),
    })?;

    let meta_file = meta_git.work_tree().join(META_PATH);
    if let Some(parent) = meta_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::io(format!("failed to create {}", parent.display()), e))?;
    }
    fs::write(&meta_file, data)
        .map_err(|e| EngineError::io(format!("failed to write {}", meta_file.display()), e))?;

    meta_git.run(&["add", "-A"])?;
    let tree = meta_git.write_tree()?;

    let parents = meta_git.ref_sha(META_REF).map(|p| vec![p]).unwrap_or_default();
    let commit_meta = CommitMeta {
        author_date: meta.updated_at.clone(),
        committer_date: meta.updated_at.clone(),
        ..CommitMeta::default()
    };
    let sha = meta_git.commit_tree(&tree, "warren export metadata", &parents, Some(&commit_meta))?;
    meta_git.update_ref(META_REF, &sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_mapping_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = GitMapping::load(dir.path());
        assert!(mapping.snapshots.is_empty());
    }

    #[test]
    fn corrupt_mapping_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("git-map.json"), b"{{{{").unwrap();
        let mapping = GitMapping::load(dir.path());
        assert!(mapping.snapshots.is_empty());
    }

    #[test]
    fn mapping_round_trips_and_reverses() {
        let dir = tempfile::tempdir().unwrap();
        let mut mapping = GitMapping {
            repo_path: dir.path().to_path_buf(),
            snapshots: BTreeMap::new(),
        };
        mapping
            .snapshots
            .insert("snap1".to_owned(), "c0ffee".to_owned());
        mapping.save(dir.path()).unwrap();

        let loaded = GitMapping::load(dir.path());
        assert_eq!(loaded, mapping);
        assert_eq!(
            loaded.commits_to_snapshots().get("c0ffee").map(String::as_str),
            Some("snap1")
        );
    }

    #[test]
    fn branches_deduplicate_and_skip_empty() {
        let mut meta = ExportMeta::default();
        meta.workspaces.insert(
            "ws-1".to_owned(),
            ExportWorkspaceMeta {
                workspace_id: "ws-1".to_owned(),
                workspace_name: "alpha".to_owned(),
                branch: "alpha".to_owned(),
            },
        );
        meta.workspaces.insert(
            "ws-2".to_owned(),
            ExportWorkspaceMeta {
                workspace_id: "ws-2".to_owned(),
                workspace_name: "dup".to_owned(),
                branch: "alpha".to_owned(),
            },
        );
        meta.workspaces.insert(
            "ws-3".to_owned(),
            ExportWorkspaceMeta {
                workspace_id: "ws-3".to_owned(),
                workspace_name: "unbranched".to_owned(),
                branch: String::new(),
            },
        );
        assert_eq!(meta.branches(), vec!["alpha"]);
    }
}
