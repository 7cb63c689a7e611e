//! Shared fixtures for integration tests.
//!
//! Each test builds an isolated project in a temp directory, with real git
//! repositories where the bridge is involved.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::Command;

use warren::workspace::{SnapshotIdentity, Workspace, init_project};

/// A project rooted in a temp directory. Dropping it removes everything.
pub struct TestProject {
    pub dir: tempfile::TempDir,
    pub project_id: String,
}

impl TestProject {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create a workspace under the project.
    pub fn workspace(&self, name: &str) -> Workspace {
        Workspace::init(&self.root().join(name), &self.project_id, name, "").unwrap()
    }

    /// Create a workspace forked from a snapshot, with its tree materialized.
    pub fn workspace_from(&self, name: &str, base_snapshot: &str) -> Workspace {
        let root = self.root().join(name);
        let ws = Workspace::init(&root, &self.project_id, name, base_snapshot).unwrap();
        let manifest = ws
            .store()
            .load_manifest_for_snapshot(base_snapshot)
            .unwrap();
        warren::workspace::materialize_manifest(&root, ws.store(), &manifest).unwrap();
        ws
    }
}

/// Initialize a fresh warren project.
pub fn project() -> TestProject {
    let dir = tempfile::tempdir().unwrap();
    let meta = init_project(dir.path(), "testproj").unwrap();
    TestProject {
        dir,
        project_id: meta.project_id,
    }
}

/// Initialize a fresh warren project whose root is also a git repository
/// with committer identity configured.
pub fn project_with_git() -> TestProject {
    let p = project();
    git(p.root(), &["init", "--quiet", "--initial-branch=main"]);
    git(p.root(), &["config", "user.name", "Test"]);
    git(p.root(), &["config", "user.email", "test@example.com"]);
    p
}

/// Write a file inside a workspace.
pub fn write(ws: &Workspace, rel: &str, content: &str) {
    let path = ws.root().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Snapshot a workspace as the given agent.
pub fn snap(ws: &mut Workspace, message: &str, agent: &str) -> String {
    ws.create_snapshot(message, &SnapshotIdentity::agent(agent))
        .unwrap()
        .id
}

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("failed to spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}{}",
        args,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// Commits on a branch, oldest first.
pub fn branch_commits(repo: &Path, branch: &str) -> Vec<String> {
    git(repo, &["rev-list", "--topo-order", "--reverse", branch, "--"])
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Add a commit directly onto a branch ref (simulating external history),
/// returning the new SHA.
pub fn add_external_commit(repo: &Path, branch: &str, file: &str, content: &str) -> String {
    let scratch = tempfile::tempdir().unwrap();
    let work = scratch.path().join("wt");
    fs::create_dir_all(&work).unwrap();

    let env_git = |args: &[&str]| -> std::process::Output {
        Command::new("git")
            .args(args)
            .current_dir(&work)
            .env("GIT_DIR", repo.join(".git"))
            .env("GIT_WORK_TREE", &work)
            .env("GIT_INDEX_FILE", scratch.path().join("index"))
            .env("GIT_AUTHOR_NAME", "External")
            .env("GIT_AUTHOR_EMAIL", "external@example.com")
            .env("GIT_COMMITTER_NAME", "External")
            .env("GIT_COMMITTER_EMAIL", "external@example.com")
            .output()
            .unwrap()
    };

    let parent = git(repo, &["rev-parse", &format!("refs/heads/{branch}")]);
    let checkout = env_git(&["checkout", "-f", &parent, "--", "."]);
    assert!(checkout.status.success(), "checkout failed");

    fs::write(work.join(file), content).unwrap();
    assert!(env_git(&["add", "-A"]).status.success());

    let tree_out = env_git(&["write-tree"]);
    assert!(tree_out.status.success());
    let tree = String::from_utf8_lossy(&tree_out.stdout).trim().to_owned();

    let commit_out = env_git(&["commit-tree", &tree, "-m", "external commit", "-p", &parent]);
    assert!(commit_out.status.success(), "commit-tree failed");
    let sha = String::from_utf8_lossy(&commit_out.stdout).trim().to_owned();

    git(repo, &["update-ref", &format!("refs/heads/{branch}"), &sha]);
    sha
}
