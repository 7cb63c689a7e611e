//! Remote backends: push, pull, and bidirectional sync.
//!
//! A [`Backend`] is the closed capability set `{push, pull, sync}` over the
//! git bridge, selected by configuration through [`from_config`]. The `git`
//! backend drives a local repository only; the `github` backend adds a
//! remote, including push-rejection recovery: fetch, fast-forward where the
//! remote strictly descends, import, merge diverged workspaces through a
//! caller-supplied callback, re-export, push again — exactly once per sync.

use std::path::Path;

use tracing::{info, warn};

use crate::config::{BackendKind, ProjectConfig, WorkspaceConfig};
use crate::error::{EngineError, Result};
use crate::git::{
    self, DivergenceInfo, ExportOptions, GitEnv, ImportOutcome,
    mapping::{load_export_metadata, load_export_metadata_from_repo},
};
use crate::store::{Store, WorkspaceInfo};

/// Callback invoked per diverged workspace during sync. Returns the snapshot
/// ID of the merged result; the workspace head is advanced to it.
pub type MergeCallback<'a> = dyn FnMut(&DivergenceInfo) -> Result<String> + 'a;

/// Options for a sync run.
#[derive(Default)]
pub struct SyncOptions<'a> {
    /// Resolves divergence into a merged snapshot. Without it, divergence is
    /// surfaced as an error instead of auto-resolved.
    pub on_divergence: Option<Box<MergeCallback<'a>>>,
}

/// The closed backend capability set.
pub trait Backend {
    /// Which kind of backend this is.
    fn kind(&self) -> BackendKind;

    /// Export local snapshots and publish them (where a remote exists).
    fn push(&self, project_root: &Path) -> Result<()>;

    /// Bring remote changes into the local store.
    fn pull(&self, project_root: &Path) -> Result<ImportOutcome>;

    /// Bidirectional sync.
    fn sync(&self, project_root: &Path, opts: &mut SyncOptions<'_>) -> Result<()>;
}

/// Construct the configured backend.
#[must_use]
pub fn from_config(cfg: &ProjectConfig) -> Box<dyn Backend> {
    match cfg.remote.backend {
        BackendKind::Git => Box::new(GitBackend),
        BackendKind::Github => Box::new(GithubBackend {
            remote: cfg.remote.name.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// git — local repository only
// ---------------------------------------------------------------------------

/// Local-repository backend: exports to the project's own git repository and
/// imports commits that appeared there; never contacts a remote.
pub struct GitBackend;

impl Backend for GitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Git
    }

    fn push(&self, project_root: &Path) -> Result<()> {
        git::export(project_root, ExportOptions::default()).map(|_| ())
    }

    fn pull(&self, project_root: &Path) -> Result<ImportOutcome> {
        git::import_incremental(project_root)
    }

    fn sync(&self, project_root: &Path, _opts: &mut SyncOptions<'_>) -> Result<()> {
        git::export(project_root, ExportOptions::default())?;
        git::import_incremental(project_root).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// github — remote-synced repository
// ---------------------------------------------------------------------------

/// Remote-synced backend.
pub struct GithubBackend {
    /// Git remote name (usually `origin`).
    pub remote: String,
}

impl Backend for GithubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Github
    }

    fn push(&self, project_root: &Path) -> Result<()> {
        git::export(project_root, ExportOptions::default())?;
        push_export(project_root, &self.remote)
    }

    fn pull(&self, project_root: &Path) -> Result<ImportOutcome> {
        fetch_from_remote(project_root, &self.remote)?;
        fast_forward_branches(project_root, &self.remote)?;
        git::import_incremental_from(project_root, Some(&self.remote))
    }

    fn sync(&self, project_root: &Path, opts: &mut SyncOptions<'_>) -> Result<()> {
        // Export any new local snapshots, then try the optimistic push.
        git::export(project_root, ExportOptions::default())?;
        let push_err = match push_export(project_root, &self.remote) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        // Only a classified rejection is recoverable; auth/network errors
        // surface directly and are never retried.
        if !matches!(push_err, EngineError::PushRejected { .. }) {
            return Err(push_err);
        }
        info!(remote = %self.remote, "push rejected, reconciling with remote");

        fetch_from_remote(project_root, &self.remote)?;
        fast_forward_branches(project_root, &self.remote)?;
        let outcome = git::import_incremental_from(project_root, Some(&self.remote))?;

        let store = Store::open_at(project_root);
        for div in &outcome.diverged {
            let Some(on_divergence) = opts.on_divergence.as_mut() else {
                return Err(EngineError::Diverged {
                    workspace: div.workspace_name.clone(),
                    local_head: div.local_head.clone(),
                    remote_head: div.remote_head.clone(),
                });
            };
            let merged = on_divergence(div)?;
            advance_diverged_head(&store, div, &merged)?;
            info!(workspace = %div.workspace_name, snapshot = %merged, "divergence merged");
        }

        // Re-export (merge snapshots are parented on both sides now) and
        // push once more; a second rejection surfaces as-is.
        git::export(project_root, ExportOptions::default())?;
        push_export(project_root, &self.remote)
    }
}

fn advance_diverged_head(store: &Store, div: &DivergenceInfo, merged: &str) -> Result<()> {
    let mut cfg = WorkspaceConfig::load_at(&div.workspace_root)?;
    cfg.current_snapshot_id = merged.to_owned();
    cfg.save_at(&div.workspace_root)?;
    store.register_workspace(WorkspaceInfo {
        workspace_id: cfg.workspace_id.clone(),
        workspace_name: cfg.workspace_name.clone(),
        path: div.workspace_root.clone(),
        current_snapshot_id: merged.to_owned(),
        base_snapshot_id: cfg.base_snapshot_id.clone(),
        created_at: String::new(),
    })
}

// ---------------------------------------------------------------------------
// Remote plumbing
// ---------------------------------------------------------------------------

/// Push every exported branch plus the metadata ref to `remote`.
pub fn push_export(project_root: &Path, remote: &str) -> Result<()> {
    let meta = load_export_metadata_from_repo(project_root)?.ok_or(EngineError::NotFound {
        kind: "export metadata",
        id: git::META_REF.to_owned(),
    })?;
    for branch in meta.branches() {
        git::env::push(project_root, remote, &branch)?;
    }
    git::env::push(project_root, remote, git::META_REF)
}

/// Fetch branches and warren metadata refs from `remote`.
///
/// The metadata refspec is forced: the local metadata ref may sit ahead of
/// the remote's after an export whose push was rejected, and metadata is
/// derived state that the next export regenerates, so rewinding it to the
/// remote's view is safe where a non-forced fetch would fail.
pub fn fetch_from_remote(project_root: &Path, remote: &str) -> Result<()> {
    git::env::run_in(project_root, &["fetch", remote])?;
    git::env::run_in(
        project_root,
        &["fetch", remote, "+refs/warren/*:refs/warren/*"],
    )
}

/// Fast-forward local branch refs to their remote counterparts, but only
/// where the remote strictly descends from the local ref. Branches that
/// truly diverged are left alone — the subsequent import reports them.
pub fn fast_forward_branches(project_root: &Path, remote: &str) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix("warren-ff-")
        .tempdir()
        .map_err(|e| EngineError::io("failed to create scratch dir".to_owned(), e))?;
    let git_env = GitEnv::new(project_root, scratch.path(), &scratch.path().join("index"));

    let Some(meta) = load_export_metadata(&git_env)? else {
        return Ok(());
    };

    for ws in meta.workspaces.values() {
        if ws.branch.is_empty() {
            continue;
        }
        let remote_ref = format!("{remote}/{}", ws.branch);
        let Ok(remote_sha) = git_env.output(&["rev-parse", "--verify", &remote_ref]) else {
            continue; // remote branch doesn't exist
        };
        if remote_sha.is_empty() {
            continue;
        }

        match git_env.ref_sha(&format!("refs/heads/{}", ws.branch)) {
            None => {
                // No local branch yet: adopt the remote position.
                let _ = git_env.update_branch_ref(&ws.branch, &remote_sha);
            }
            Some(local_sha) if local_sha == remote_sha => {}
            Some(local_sha) => {
                if git_env.is_ancestor(&local_sha, &remote_sha) {
                    let _ = git_env.update_branch_ref(&ws.branch, &remote_sha);
                } else if git_env.is_ancestor(&remote_sha, &local_sha) {
                    // Local is ahead; push will handle it.
                } else {
                    warn!(branch = %ws.branch, "branch diverged from remote, deferring to import");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_selects_backend_by_config() {
        let mut cfg = ProjectConfig::default();
        assert_eq!(from_config(&cfg).kind(), BackendKind::Git);

        cfg.remote.backend = BackendKind::Github;
        assert_eq!(from_config(&cfg).kind(), BackendKind::Github);
    }

    #[test]
    fn sync_options_default_has_no_callback() {
        let opts = SyncOptions::default();
        assert!(opts.on_divergence.is_none());
    }
}
