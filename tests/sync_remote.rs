//! Integration tests for remote sync: push, rejection recovery, pull.

mod common;

use common::*;

use warren::backend::{Backend, GithubBackend, SyncOptions};
use warren::config::WorkspaceConfig;
use warren::git::{self, ExportOptions};
use warren::merge::{MergeResolution, apply_merge, plan_merge};
use warren::workspace::{SnapshotIdentity, Workspace};

/// Create a bare remote and wire it up as `origin` of the project repo.
fn with_remote(p: &TestProject) -> tempfile::TempDir {
    let bare = tempfile::tempdir().unwrap();
    git(bare.path(), &["init", "--quiet", "--bare", "--initial-branch=main"]);
    git(
        p.root(),
        &["remote", "add", "origin", bare.path().to_str().unwrap()],
    );
    bare
}

/// Clone the bare remote, add a commit on `branch`, and push it back.
fn external_remote_commit(bare: &std::path::Path, branch: &str, file: &str, content: &str) {
    let clone = tempfile::tempdir().unwrap();
    git(
        clone.path().parent().unwrap_or(clone.path()),
        &[
            "clone",
            "--quiet",
            "--branch",
            branch,
            bare.to_str().unwrap(),
            clone.path().to_str().unwrap(),
        ],
    );
    git(clone.path(), &["config", "user.name", "External"]);
    git(clone.path(), &["config", "user.email", "external@example.com"]);
    std::fs::write(clone.path().join(file), content).unwrap();
    git(clone.path(), &["add", "-A"]);
    git(clone.path(), &["commit", "--quiet", "-m", "external change"]);
    git(clone.path(), &["push", "--quiet", "origin", branch]);
}

#[test]
fn push_publishes_branches_and_metadata() {
    let p = project_with_git();
    let bare = with_remote(&p);

    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    snap(&mut ws, "first", "robo");

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    backend.push(p.root()).unwrap();

    let local_tip = git(p.root(), &["rev-parse", "refs/heads/alpha"]);
    let remote_tip = git(bare.path(), &["rev-parse", "refs/heads/alpha"]);
    assert_eq!(local_tip, remote_tip);
    // The metadata ref travels with the repository.
    git(bare.path(), &["rev-parse", "refs/warren/meta"]);
}

#[test]
fn sync_succeeds_when_remote_has_not_moved() {
    let p = project_with_git();
    let _bare = with_remote(&p);
    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    snap(&mut ws, "first", "robo");

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    backend.sync(p.root(), &mut SyncOptions::default()).unwrap();

    // A second sync with new work is a plain fast-forward push.
    write(&ws, "a.txt", "v2");
    snap(&mut ws, "second", "robo");
    backend.sync(p.root(), &mut SyncOptions::default()).unwrap();
}

#[test]
fn pull_imports_remote_changes() {
    let p = project_with_git();
    let bare = with_remote(&p);
    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    let s1 = snap(&mut ws, "first", "robo");

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    backend.push(p.root()).unwrap();
    external_remote_commit(bare.path(), "alpha", "remote.txt", "from remote");

    let outcome = backend.pull(p.root()).unwrap();
    assert_eq!(outcome.new_snapshots, 1);
    assert!(outcome.diverged.is_empty());

    let cfg = WorkspaceConfig::load_at(&p.root().join("alpha")).unwrap();
    assert_ne!(cfg.current_snapshot_id, s1);
}

#[test]
fn rejected_push_recovers_via_merge_callback() {
    let p = project_with_git();
    let bare = with_remote(&p);
    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    let s1 = snap(&mut ws, "first", "robo");

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    backend.push(p.root()).unwrap();

    // Remote moves and local diverges (disjoint files, so the merge plan is
    // conflict-free).
    external_remote_commit(bare.path(), "alpha", "remote.txt", "from remote");
    write(&ws, "local.txt", "local work");
    let s2 = snap(&mut ws, "local", "robo");

    let project_root = p.root().to_path_buf();
    let mut merged_id = String::new();
    let mut opts = SyncOptions {
        on_divergence: Some(Box::new(|div: &warren::git::DivergenceInfo| {
            assert_eq!(div.local_head, s2);
            assert_eq!(div.merge_base, s1);
            let mut ws = Workspace::open(&div.workspace_root)?;
            let plan = plan_merge(ws.store(), ws.store(), &div.local_head, &div.remote_head, false)?;
            assert!(plan.conflicts.is_empty());
            let meta = apply_merge(
                &mut ws,
                &plan,
                MergeResolution::Ours,
                &SnapshotIdentity::agent("robo"),
                "merge remote",
            )?;
            merged_id = meta.id.clone();
            Ok(meta.id)
        })),
    };
    backend.sync(&project_root, &mut opts).unwrap();
    drop(opts);

    // The workspace head is the merge snapshot, parented on both sides.
    let cfg = WorkspaceConfig::load_at(&p.root().join("alpha")).unwrap();
    assert_eq!(cfg.current_snapshot_id, merged_id);
    let store = warren::store::Store::open_at(p.root());
    let merged = store.load_snapshot_meta(&merged_id).unwrap();
    assert_eq!(merged.parent_snapshot_ids.len(), 2);
    assert!(merged.parent_snapshot_ids.contains(&s2));

    // Both sides' content survived, and the remote accepted the new tip.
    assert!(p.root().join("alpha").join("local.txt").exists());
    assert!(p.root().join("alpha").join("remote.txt").exists());
    let local_tip = git(p.root(), &["rev-parse", "refs/heads/alpha"]);
    let remote_tip = git(bare.path(), &["rev-parse", "refs/heads/alpha"]);
    assert_eq!(local_tip, remote_tip);
}

#[test]
fn divergence_without_callback_is_surfaced_not_resolved() {
    let p = project_with_git();
    let bare = with_remote(&p);
    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    snap(&mut ws, "first", "robo");

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    backend.push(p.root()).unwrap();

    external_remote_commit(bare.path(), "alpha", "remote.txt", "from remote");
    write(&ws, "local.txt", "local work");
    let s2 = snap(&mut ws, "local", "robo");

    let err = backend
        .sync(p.root(), &mut SyncOptions::default())
        .unwrap_err();
    assert!(matches!(err, warren::EngineError::Diverged { .. }));

    // Local head untouched.
    let cfg = WorkspaceConfig::load_at(&p.root().join("alpha")).unwrap();
    assert_eq!(cfg.current_snapshot_id, s2);
}

#[test]
fn non_rejection_push_failures_surface_immediately() {
    let p = project_with_git();
    // Point origin at a path that does not exist.
    git(p.root(), &["remote", "add", "origin", "/nonexistent/missing.git"]);
    let mut ws = p.workspace("alpha");
    write(&ws, "a.txt", "v1");
    snap(&mut ws, "first", "robo");
    git::export(p.root(), ExportOptions::default()).unwrap();

    let backend = GithubBackend {
        remote: "origin".to_owned(),
    };
    let err = backend
        .sync(p.root(), &mut SyncOptions::default())
        .unwrap_err();
    assert!(
        matches!(err, warren::EngineError::Git { .. }),
        "expected a plain git error, got: {err}"
    );
}
