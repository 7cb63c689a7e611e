//! Incremental import: replay new git commits as snapshots.
//!
//! For every branch recorded in the export metadata, commits not yet present
//! in the reverse (commit → snapshot) mapping are materialized into a scratch
//! work-tree and recorded as imported snapshots. Snapshot IDs are derived
//! from the commit's author and date, so importing the same commit twice
//! yields the same snapshot.
//!
//! A workspace's head is advanced to the branch tip **only** when the head is
//! empty, still at the last previously-known tip, or already at the new tip.
//! Any other head means local work happened since the last sync: the import
//! records a [`DivergenceInfo`] instead of overwriting — local work is never
//! silently discarded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::env::GitEnv;
use super::export::is_agent_email;
use super::mapping::{GitMapping, load_export_metadata};
use crate::config::{ProjectMeta, WorkspaceConfig, generate_workspace_id, now_rfc3339};
use crate::error::{EngineError, Result};
use crate::manifest::Manifest;
use crate::store::{STATE_DIR, SnapshotMeta, Store, WorkspaceInfo, compute_snapshot_id};

/// A workspace whose local head has drifted from its imported branch tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivergenceInfo {
    /// Workspace name.
    pub workspace_name: String,
    /// Workspace directory.
    pub workspace_root: PathBuf,
    /// The local head that blocked the advance.
    pub local_head: String,
    /// The freshly imported branch tip.
    pub remote_head: String,
    /// The last tip both sides agreed on (empty when unknown).
    pub merge_base: String,
}

/// The outcome of one incremental import run.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Snapshots created from new commits.
    pub new_snapshots: usize,
    /// Workspaces whose head could not be advanced.
    pub diverged: Vec<DivergenceInfo>,
    /// Per-branch failures; the rest of the batch still ran.
    pub errors: Vec<(String, EngineError)>,
}

/// Import new commits from every exported branch at `project_root`,
/// reading local branch refs only.
pub fn import_incremental(project_root: &Path) -> Result<ImportOutcome> {
    import_incremental_from(project_root, None)
}

/// Import new commits from every exported branch.
///
/// With a `remote`, a branch's remote tracking ref is preferred over the
/// local ref when it exists. This is what makes push-rejection recovery
/// work: a branch that truly diverged is deliberately not fast-forwarded,
/// so its new remote commits are only visible through the tracking ref.
pub fn import_incremental_from(project_root: &Path, remote: Option<&str>) -> Result<ImportOutcome> {
    let project = ProjectMeta::load_at(project_root)?;
    let store = Store::open_at(project_root);
    store.ensure_dirs()?;

    let state_dir = project_root.join(STATE_DIR);
    let mut mapping = GitMapping::load(&state_dir);
    let mut commit_to_snapshot = mapping.commits_to_snapshots();
    // Which commits were known before this run — the key to finding the
    // previously-agreed tip for divergence reporting.
    let previously_known: BTreeMap<String, String> = commit_to_snapshot.clone();

    let scratch = tempfile::Builder::new()
        .prefix("warren-import-")
        .tempdir()
        .map_err(|e| EngineError::io("failed to create scratch import dir".to_owned(), e))?;
    let work_tree = scratch.path().join("tree");
    std::fs::create_dir_all(&work_tree)
        .map_err(|e| EngineError::io(format!("failed to create {}", work_tree.display()), e))?;
    let git = GitEnv::new(project_root, &work_tree, &scratch.path().join("index"));

    let Some(meta) = load_export_metadata(&git)? else {
        return Err(EngineError::NotFound {
            kind: "export metadata",
            id: super::mapping::META_REF.to_owned(),
        });
    };

    let mut outcome = ImportOutcome::default();
    for ws in meta.workspaces.values() {
        if ws.branch.is_empty() {
            continue;
        }
        let result = import_branch(
            &store,
            &git,
            project_root,
            &project,
            &ws.branch,
            remote,
            &ws.workspace_id,
            &ws.workspace_name,
            &mut mapping,
            &mut commit_to_snapshot,
            &previously_known,
            &mut outcome,
        );
        if let Err(e) = result {
            warn!(branch = %ws.branch, error = %e, "branch import failed");
            outcome.errors.push((ws.branch.clone(), e));
        }
    }

    mapping.save(&state_dir)?;
    info!(
        snapshots = outcome.new_snapshots,
        diverged = outcome.diverged.len(),
        "import complete"
    );
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn import_branch(
    store: &Store,
    git: &GitEnv,
    project_root: &Path,
    project: &ProjectMeta,
    branch: &str,
    remote: Option<&str>,
    workspace_id: &str,
    workspace_name: &str,
    mapping: &mut GitMapping,
    commit_to_snapshot: &mut BTreeMap<String, String>,
    previously_known: &BTreeMap<String, String>,
    outcome: &mut ImportOutcome,
) -> Result<()> {
    // Prefer the remote tracking ref when syncing against a remote: diverged
    // branches are never fast-forwarded, so their new commits live only there.
    let list_ref = remote
        .map(|r| format!("refs/remotes/{r}/{branch}"))
        .filter(|tracking| git.commit_exists(tracking))
        .unwrap_or_else(|| branch.to_owned());
    let commits = git.rev_list(&list_ref)?;
    if commits.is_empty() {
        return Ok(());
    }

    let new_commits: Vec<&String> = commits
        .iter()
        .filter(|c| !commit_to_snapshot.contains_key(*c))
        .collect();
    if new_commits.is_empty() {
        return Ok(());
    }
    info!(branch, count = new_commits.len(), "importing new commits");

    let ws_name = if workspace_name.is_empty() { branch } else { workspace_name };
    let ws_root = project_root.join(ws_name);
    let ws_cfg = ensure_workspace(&ws_root, &project.project_id, workspace_id, ws_name, store)?;

    for commit in new_commits {
        let commit_info = git.read_commit_info(commit)?;
        git.checkout_tree(commit)?;

        // Parents resolved from already-known commits; unknown parents are
        // dropped, partial lineage tolerated.
        let parents: Vec<String> = commit_info
            .parents
            .iter()
            .filter_map(|p| commit_to_snapshot.get(p).cloned())
            .collect();

        let agent = if is_agent_email(&commit_info.author_email) {
            commit_info.author_name.clone()
        } else {
            String::new()
        };

        let snapshot_id = create_imported_snapshot(
            store,
            git.work_tree(),
            &ws_cfg,
            parents,
            &commit_info.subject,
            &commit_info.author_date,
            &commit_info.author_name,
            &commit_info.author_email,
            &agent,
        )?;

        commit_to_snapshot.insert(commit.clone(), snapshot_id.clone());
        mapping.snapshots.insert(snapshot_id, commit.clone());
        outcome.new_snapshots += 1;
    }

    // Head advance, or divergence.
    let tip_commit = commits.last().map(String::as_str).unwrap_or_default();
    let Some(tip_snapshot) = commit_to_snapshot.get(tip_commit).cloned() else {
        return Ok(());
    };
    let previous_tip = commits
        .iter()
        .rev()
        .find_map(|c| previously_known.get(c).cloned())
        .unwrap_or_default();

    // Reload for the freshest head; the workspace may have moved since we
    // created its config above.
    let mut fresh = WorkspaceConfig::load_at(&ws_root).unwrap_or(ws_cfg);
    let current_head = fresh.current_snapshot_id.clone();

    if current_head.is_empty() || current_head == previous_tip || current_head == tip_snapshot {
        fresh.current_snapshot_id = tip_snapshot.clone();
        if fresh.base_snapshot_id.is_empty() {
            fresh.base_snapshot_id = tip_snapshot.clone();
        }
        fresh.save_at(&ws_root)?;
        store.register_workspace(WorkspaceInfo {
            workspace_id: fresh.workspace_id.clone(),
            workspace_name: fresh.workspace_name.clone(),
            path: ws_root,
            current_snapshot_id: tip_snapshot,
            base_snapshot_id: fresh.base_snapshot_id.clone(),
            created_at: String::new(),
        })?;
    } else {
        info!(
            workspace = ws_name,
            local = %current_head,
            remote = %tip_snapshot,
            "local head diverged from imported branch tip"
        );
        outcome.diverged.push(DivergenceInfo {
            workspace_name: ws_name.to_owned(),
            workspace_root: ws_root,
            local_head: current_head,
            remote_head: tip_snapshot,
            merge_base: previous_tip,
        });
    }
    Ok(())
}

/// Find or create the workspace directory and config for an imported branch.
fn ensure_workspace(
    ws_root: &Path,
    project_id: &str,
    workspace_id: &str,
    workspace_name: &str,
    store: &Store,
) -> Result<WorkspaceConfig> {
    if WorkspaceConfig::exists_at(ws_root) {
        return WorkspaceConfig::load_at(ws_root);
    }
    std::fs::create_dir_all(ws_root)
        .map_err(|e| EngineError::io(format!("failed to create {}", ws_root.display()), e))?;
    let cfg = WorkspaceConfig {
        project_id: project_id.to_owned(),
        workspace_id: if workspace_id.is_empty() {
            generate_workspace_id()
        } else {
            workspace_id.to_owned()
        },
        workspace_name: workspace_name.to_owned(),
        base_snapshot_id: String::new(),
        current_snapshot_id: String::new(),
    };
    cfg.save_at(ws_root)?;
    store.register_workspace(WorkspaceInfo {
        workspace_id: cfg.workspace_id.clone(),
        workspace_name: cfg.workspace_name.clone(),
        path: ws_root.to_path_buf(),
        current_snapshot_id: String::new(),
        base_snapshot_id: String::new(),
        created_at: now_rfc3339(),
    })?;
    Ok(cfg)
}

/// Record the scratch work-tree's current content as an imported snapshot.
#[allow(clippy::too_many_arguments)]
fn create_imported_snapshot(
    store: &Store,
    source_root: &Path,
    ws_cfg: &WorkspaceConfig,
    parents: Vec<String>,
    message: &str,
    created_at: &str,
    author_name: &str,
    author_email: &str,
    agent: &str,
) -> Result<String> {
    let manifest = Manifest::generate(source_root)?;
    let manifest_hash = store.write_manifest(&manifest)?;

    for f in manifest.file_entries() {
        if store.blob_exists(&f.hash) {
            continue;
        }
        match std::fs::read(source_root.join(&f.path)) {
            Ok(content) => store.write_blob(&f.hash, &content)?,
            Err(e) => {
                warn!(path = %f.path, error = %e, "failed to read imported file, skipping blob");
            }
        }
    }

    let created_at = if created_at.is_empty() {
        now_rfc3339()
    } else {
        created_at.to_owned()
    };
    let snapshot_id =
        compute_snapshot_id(&manifest_hash, &parents, author_name, author_email, &created_at);

    let message = if message.is_empty() { "Imported commit" } else { message };
    store.write_snapshot_meta(&SnapshotMeta {
        id: snapshot_id.clone(),
        workspace_id: ws_cfg.workspace_id.clone(),
        workspace_name: ws_cfg.workspace_name.clone(),
        manifest_hash,
        parent_snapshot_ids: parents,
        author_name: author_name.to_owned(),
        author_email: author_email.to_owned(),
        agent: agent.to_owned(),
        message: message.to_owned(),
        created_at,
        files: manifest.file_count(),
        size: manifest.total_size(),
    })?;

    Ok(snapshot_id)
}
