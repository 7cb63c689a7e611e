//! Export: map the snapshot DAG onto git commits and branches.
//!
//! Every workspace with history becomes a branch named after the workspace.
//! Snapshots are materialized into a scratch work-tree from the blob store
//! and committed with `commit-tree`, preserving author identity (agents get
//! a synthesized `<slug>@warren.local` email). The snapshot→commit mapping
//! makes re-export incremental and idempotent: exporting twice with no new
//! snapshots creates no commits and leaves the mapping unchanged.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use super::env::{CommitMeta, GitEnv};
use super::mapping::{ExportWorkspaceMeta, GitMapping, update_export_metadata};
use crate::config::ProjectMeta;
use crate::dag::{self, SnapshotSource};
use crate::error::{EngineError, Result};
use crate::store::{STATE_DIR, SnapshotMeta, Store};
use crate::workspace::materialize_manifest;

/// Options for an export run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExportOptions {
    /// Initialize a git repository at the project root when none exists.
    pub init_repo: bool,
    /// Discard the existing mapping and regenerate every commit. Reproduces
    /// identical observable structure (trees, parents, authors, messages).
    pub rebuild: bool,
}

/// The outcome of one export run.
#[derive(Debug, Default)]
pub struct ExportOutcome {
    /// Commits created during this run.
    pub new_commits: usize,
    /// Workspaces whose branch was exported or refreshed.
    pub exported_workspaces: usize,
    /// Workspaces skipped because they have no snapshots yet.
    pub skipped: Vec<String>,
    /// Per-workspace failures; the rest of the batch still ran.
    pub errors: Vec<(String, EngineError)>,
}

/// Export all workspace snapshots at `project_root` to git.
pub fn export(project_root: &Path, opts: ExportOptions) -> Result<ExportOutcome> {
    let project = ProjectMeta::load_at(project_root)?;
    let store = Store::open_at(project_root);

    ensure_git_repo(project_root, opts.init_repo)?;

    let scratch = tempfile::Builder::new()
        .prefix("warren-export-")
        .tempdir()
        .map_err(|e| EngineError::io("failed to create scratch export dir".to_owned(), e))?;
    let work_tree = scratch.path().join("tree");
    let meta_tree = scratch.path().join("meta");
    for dir in [&work_tree, &meta_tree] {
        std::fs::create_dir_all(dir)
            .map_err(|e| EngineError::io(format!("failed to create {}", dir.display()), e))?;
    }
    let git = GitEnv::new(project_root, &work_tree, &scratch.path().join("index"));
    let meta_git = GitEnv::new(project_root, &meta_tree, &scratch.path().join("meta-index"));

    let state_dir = project_root.join(STATE_DIR);
    let mut mapping = if opts.rebuild {
        GitMapping::default()
    } else {
        GitMapping::load(&state_dir)
    };
    mapping.repo_path = project_root.to_path_buf();

    let workspaces = store.list_workspaces()?;
    if workspaces.is_empty() {
        return Err(EngineError::NotFound {
            kind: "workspace",
            id: "(none registered in project)".to_owned(),
        });
    }

    let mut outcome = ExportOutcome::default();
    for ws in workspaces {
        let head = if ws.current_snapshot_id.is_empty() {
            store
                .latest_snapshot_for_workspace(&ws.workspace_id)?
                .unwrap_or_default()
        } else {
            ws.current_snapshot_id.clone()
        };
        if head.is_empty() {
            info!(workspace = %ws.workspace_name, "skipping workspace with no snapshots");
            outcome.skipped.push(ws.workspace_name.clone());
            continue;
        }

        let branch = ws.workspace_name.clone();
        match export_workspace(&store, &git, &mut mapping, &branch, &head, opts.rebuild) {
            Ok(created) => {
                outcome.new_commits += created;
                outcome.exported_workspaces += 1;
            }
            Err(e) => {
                // Keep going: one broken workspace must not lose the batch,
                // and the mapping keeps the progress made so far.
                warn!(workspace = %ws.workspace_name, error = %e, "workspace export failed");
                outcome.errors.push((ws.workspace_name.clone(), e));
                continue;
            }
        }

        let entry = ExportWorkspaceMeta {
            workspace_id: ws.workspace_id.clone(),
            workspace_name: ws.workspace_name.clone(),
            branch,
        };
        if let Err(e) = update_export_metadata(&meta_git, &project.project_id, entry) {
            warn!(workspace = %ws.workspace_name, error = %e, "failed to update export metadata");
        }
    }

    mapping.save(&state_dir)?;
    info!(
        commits = outcome.new_commits,
        workspaces = outcome.exported_workspaces,
        "export complete"
    );
    Ok(outcome)
}

fn ensure_git_repo(project_root: &Path, init_repo: bool) -> Result<()> {
    if project_root.join(".git").exists() {
        return Ok(());
    }
    if !init_repo {
        return Err(EngineError::Config {
            path: project_root.join(".git"),
            detail: "no git repository at project root (re-run with --init)".to_owned(),
        });
    }
    super::env::run_in(project_root, &["init", "--quiet"])
}

/// Export one workspace's reachable history onto its branch. Returns the
/// number of commits created.
fn export_workspace(
    store: &Store,
    git: &GitEnv,
    mapping: &mut GitMapping,
    branch: &str,
    head: &str,
    rebuild: bool,
) -> Result<usize> {
    if rebuild && git.branch_exists(branch) {
        git.delete_branch_ref(branch)?;
    }

    // Reachable history, parents before children.
    let nodes = dag::load_reachable(&SnapshotSource::single(store), &[head.to_owned()])?;
    let mut ordered = dag::topo_sort(&nodes);
    ordered.reverse();

    let mut new_commits = 0usize;
    let mut last_commit: Option<String> = None;

    for node in &ordered {
        if !rebuild
            && let Some(existing) = mapping.snapshots.get(&node.id)
        {
            if git.commit_exists(existing) {
                last_commit = Some(existing.clone());
                continue;
            }
            warn!(snapshot = %node.id, commit = %existing, "mapped commit missing, re-exporting");
        }

        let meta = store.load_snapshot_meta(&node.id)?;
        let manifest = store.load_manifest(&meta.manifest_hash)?;
        materialize_manifest(git.work_tree(), store, &manifest)?;
        git.run(&["add", "-A"])?;
        let tree = git.write_tree()?;

        let mut parents = resolve_parent_commits(git, mapping, &meta.parent_snapshot_ids);
        // Linear history with an unexported parent: chain onto the previous
        // commit rather than creating a disconnected root.
        if parents.is_empty()
            && meta.parent_snapshot_ids.len() == 1
            && let Some(last) = &last_commit
        {
            parents.push(last.clone());
        }

        let message = if meta.message.is_empty() {
            format!("Snapshot {}", &meta.id[..meta.id.len().min(12)])
        } else {
            meta.message.clone()
        };

        let commit_meta = commit_meta_from_snapshot(&meta);
        let sha = git.commit_tree(&tree, &message, &parents, commit_meta.as_ref())?;
        mapping.snapshots.insert(node.id.clone(), sha.clone());
        last_commit = Some(sha);
        new_commits += 1;
    }

    // Always point the branch at the head's commit — even when every
    // snapshot was already exported by another workspace, this workspace
    // still gets its own branch ref at the shared tip.
    if let Some(tip) = mapping.snapshots.get(head) {
        git.update_branch_ref(branch, tip)?;
    }

    Ok(new_commits)
}

/// Map parent snapshot IDs to commit SHAs via the mapping: deduplicated, and
/// unknown or missing parents silently dropped — partial lineage is
/// tolerated, not fatal.
fn resolve_parent_commits(
    git: &GitEnv,
    mapping: &GitMapping,
    parent_ids: &[String],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut parents = Vec::new();
    for id in parent_ids {
        if id.is_empty() || !seen.insert(id.as_str()) {
            continue;
        }
        let Some(sha) = mapping.snapshots.get(id) else {
            warn!(snapshot = %id, "parent snapshot not exported, dropping");
            continue;
        };
        if !git.commit_exists(sha) {
            warn!(snapshot = %id, commit = %sha, "parent commit missing, dropping");
            continue;
        }
        parents.push(sha.clone());
    }
    parents
}

/// Git author/committer identity for a snapshot: the real author when
/// present, otherwise the agent with a synthesized email.
#[must_use]
pub fn commit_meta_from_snapshot(snap: &SnapshotMeta) -> Option<CommitMeta> {
    if snap.created_at.is_empty() && snap.author_name.is_empty() && snap.agent.is_empty() {
        return None;
    }
    let mut meta = CommitMeta {
        author_date: snap.created_at.clone(),
        committer_date: snap.created_at.clone(),
        ..CommitMeta::default()
    };
    if !snap.author_name.is_empty() {
        meta.author_name = snap.author_name.clone();
        meta.author_email = snap.author_email.clone();
        meta.committer_name = snap.author_name.clone();
        meta.committer_email = snap.author_email.clone();
    } else if !snap.agent.is_empty() {
        let email = agent_email(&snap.agent);
        meta.author_name = snap.agent.clone();
        meta.author_email = email.clone();
        meta.committer_name = snap.agent.clone();
        meta.committer_email = email;
    }
    Some(meta)
}

/// Synthesize a git email for an agent name: lowercased, non-alphanumerics
/// collapsed to dashes, at the warren.local domain.
#[must_use]
pub fn agent_email(agent: &str) -> String {
    if agent.is_empty() {
        return String::new();
    }
    let mut slug = String::new();
    let mut last_dash = false;
    for c in agent.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "agent" } else { slug };
    format!("{slug}@warren.local")
}

/// True when an email matches the synthesized agent pattern.
#[must_use]
pub fn is_agent_email(email: &str) -> bool {
    email.to_lowercase().ends_with("@warren.local")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_email_slugs_names() {
        assert_eq!(agent_email("Claude Opus"), "claude-opus@warren.local");
        assert_eq!(agent_email("agent_7"), "agent-7@warren.local");
        assert_eq!(agent_email("研究"), "agent@warren.local");
        assert_eq!(agent_email(""), "");
    }

    #[test]
    fn agent_email_round_trips_through_classifier() {
        assert!(is_agent_email(&agent_email("robo")));
        assert!(is_agent_email("X@WARREN.LOCAL"));
        assert!(!is_agent_email("dev@example.com"));
    }

    #[test]
    fn commit_meta_prefers_real_author_over_agent() {
        let snap = SnapshotMeta {
            author_name: "Ada".to_owned(),
            author_email: "ada@example.com".to_owned(),
            agent: "robo".to_owned(),
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            ..SnapshotMeta::default()
        };
        let meta = commit_meta_from_snapshot(&snap).unwrap();
        assert_eq!(meta.author_name, "Ada");
        assert_eq!(meta.author_email, "ada@example.com");
        assert_eq!(meta.author_date, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn commit_meta_synthesizes_agent_identity() {
        let snap = SnapshotMeta {
            agent: "Robo Agent".to_owned(),
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            ..SnapshotMeta::default()
        };
        let meta = commit_meta_from_snapshot(&snap).unwrap();
        assert_eq!(meta.author_name, "Robo Agent");
        assert_eq!(meta.author_email, "robo-agent@warren.local");
    }

    #[test]
    fn commit_meta_absent_for_empty_identity() {
        assert!(commit_meta_from_snapshot(&SnapshotMeta::default()).is_none());
    }
}
