//! Low-level git subprocess wrapper.
//!
//! The single place warren builds git command lines. [`GitEnv`] points git's
//! plumbing at a scratch work-tree and index via `GIT_DIR` /
//! `GIT_WORK_TREE` / `GIT_INDEX_FILE`, so export/import/checkout operations
//! against the shared object store never clobber the real working tree or
//! each other's staging state. The rest of the engine calls these narrow
//! helpers and never constructs git invocations directly, keeping the git
//! dependency swappable for an embedded plumbing library.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::trace;

use crate::error::{EngineError, Result};

/// Paths for git plumbing against a scratch work-tree and index.
#[derive(Clone, Debug)]
pub struct GitEnv {
    repo_root: PathBuf,
    work_tree: PathBuf,
    index_file: PathBuf,
}

/// Author/committer overrides applied to a commit via git env vars.
#[derive(Clone, Debug, Default)]
pub struct CommitMeta {
    /// `GIT_AUTHOR_NAME`
    pub author_name: String,
    /// `GIT_AUTHOR_EMAIL`
    pub author_email: String,
    /// `GIT_AUTHOR_DATE`
    pub author_date: String,
    /// `GIT_COMMITTER_NAME`
    pub committer_name: String,
    /// `GIT_COMMITTER_EMAIL`
    pub committer_email: String,
    /// `GIT_COMMITTER_DATE`
    pub committer_date: String,
}

impl CommitMeta {
    fn env_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("GIT_AUTHOR_NAME", self.author_name.as_str()),
            ("GIT_AUTHOR_EMAIL", self.author_email.as_str()),
            ("GIT_AUTHOR_DATE", self.author_date.as_str()),
            ("GIT_COMMITTER_NAME", self.committer_name.as_str()),
            ("GIT_COMMITTER_EMAIL", self.committer_email.as_str()),
            ("GIT_COMMITTER_DATE", self.committer_date.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .collect()
    }
}

/// Parsed metadata for one git commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitInfo {
    /// Parent commit SHAs.
    pub parents: Vec<String>,
    /// Commit subject line.
    pub subject: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Author date (ISO strict).
    pub author_date: String,
}

impl GitEnv {
    /// Create an environment for `repo_root`'s object store with the given
    /// scratch work-tree and index file.
    #[must_use]
    pub fn new(repo_root: &Path, work_tree: &Path, index_file: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            work_tree: work_tree.to_path_buf(),
            index_file: index_file.to_path_buf(),
        }
    }

    /// The path of the repository's `.git` directory.
    #[must_use]
    pub fn git_dir(&self) -> PathBuf {
        self.repo_root.join(".git")
    }

    /// The scratch work-tree path.
    #[must_use]
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    fn command(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.work_tree)
            .env("GIT_DIR", self.git_dir())
            .env("GIT_WORK_TREE", &self.work_tree)
            .env("GIT_INDEX_FILE", &self.index_file);
        for (key, value) in extra_env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run a git subcommand, failing on non-zero exit.
    pub fn run(&self, args: &[&str]) -> Result<()> {
        trace!(?args, "git run");
        let output = self
            .command(args, &[])
            .output()
            .map_err(|e| spawn_error(args, &e))?;
        if output.status.success() {
            return Ok(());
        }
        Err(git_error(args, &output))
    }

    /// Run a git subcommand and return its trimmed stdout.
    pub fn output(&self, args: &[&str]) -> Result<String> {
        self.output_with_env(args, &[])
    }

    /// Run a git subcommand with extra env vars and return trimmed stdout.
    pub fn output_with_env(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Result<String> {
        trace!(?args, "git output");
        let output = self
            .command(args, extra_env)
            .output()
            .map_err(|e| spawn_error(args, &e))?;
        if !output.status.success() {
            return Err(git_error(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    // -- queries ----------------------------------------------------------

    /// True if `sha` names an object in the repository.
    #[must_use]
    pub fn commit_exists(&self, sha: &str) -> bool {
        self.run(&["cat-file", "-t", sha]).is_ok()
    }

    /// True if `refs/heads/<branch>` exists.
    #[must_use]
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.ref_sha(&format!("refs/heads/{branch}")).is_some()
    }

    /// The SHA a ref points at, or `None` when the ref does not exist.
    #[must_use]
    pub fn ref_sha(&self, ref_name: &str) -> Option<String> {
        self.output(&["show-ref", "--verify", "--hash", ref_name])
            .ok()
            .filter(|sha| !sha.is_empty())
    }

    /// Write the scratch index to a tree object, returning the tree SHA.
    pub fn write_tree(&self) -> Result<String> {
        self.output(&["write-tree"])
    }

    /// Read a file's content at a ref, or `None` when the ref/path is absent.
    pub fn show_file_at_ref(&self, ref_name: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let object = format!("{ref_name}:{path}");
        match self.output(&["show", &object]) {
            Ok(content) => Ok(Some(content.into_bytes())),
            Err(EngineError::Git { stderr, .. }) if is_missing_object(&stderr) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True if `ancestor` is an ancestor of `descendant`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.run(&["merge-base", "--is-ancestor", ancestor, descendant])
            .is_ok()
    }

    /// All commits reachable from `ref_name`, topo-ordered oldest first.
    pub fn rev_list(&self, ref_name: &str) -> Result<Vec<String>> {
        let out = self.output(&["rev-list", "--topo-order", "--reverse", ref_name])?;
        if out.is_empty() {
            return Ok(Vec::new());
        }
        Ok(out.lines().map(str::to_owned).collect())
    }

    /// Parse parents, author, and subject for a commit.
    pub fn read_commit_info(&self, sha: &str) -> Result<CommitInfo> {
        let out = self.output(&[
            "show",
            "-s",
            "--format=%H%n%P%n%an%n%ae%n%ad%n%s",
            "--date=iso-strict",
            sha,
        ])?;
        let lines: Vec<&str> = out.lines().collect();
        // An empty subject drops the trailing line after trimming.
        if lines.len() < 5 {
            return Err(EngineError::Git {
                command: format!("show -s {sha}"),
                stderr: format!("unexpected commit info output: {out:?}"),
            });
        }
        let parents = lines[1]
            .split_whitespace()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        Ok(CommitInfo {
            parents,
            author_name: lines[2].to_owned(),
            author_email: lines[3].to_owned(),
            author_date: lines[4].to_owned(),
            subject: lines.get(5).copied().unwrap_or_default().to_owned(),
        })
    }

    // -- mutations --------------------------------------------------------

    /// Create a commit object from a tree, message, parents, and identity.
    /// Returns the new commit SHA.
    pub fn commit_tree(
        &self,
        tree_sha: &str,
        message: &str,
        parents: &[String],
        meta: Option<&CommitMeta>,
    ) -> Result<String> {
        let mut args: Vec<&str> = vec!["commit-tree", tree_sha, "-m", message];
        for p in parents {
            args.push("-p");
            args.push(p);
        }
        let env = meta.map(CommitMeta::env_pairs).unwrap_or_default();
        self.output_with_env(&args, &env)
    }

    /// Point a ref at a SHA (single atomic ref update).
    pub fn update_ref(&self, ref_name: &str, sha: &str) -> Result<()> {
        self.run(&["update-ref", ref_name, sha])
    }

    /// Point `refs/heads/<branch>` at a SHA.
    pub fn update_branch_ref(&self, branch: &str, sha: &str) -> Result<()> {
        self.update_ref(&format!("refs/heads/{branch}"), sha)
    }

    /// Delete `refs/heads/<branch>`.
    pub fn delete_branch_ref(&self, branch: &str) -> Result<()> {
        self.run(&["update-ref", "-d", &format!("refs/heads/{branch}")])
    }

    /// Replace the scratch work-tree content with a commit's tree.
    ///
    /// `read-tree` first, so that files deleted between commits become
    /// untracked and `clean` removes them; a pathspec checkout alone would
    /// leave them behind.
    pub fn checkout_tree(&self, commit: &str) -> Result<()> {
        self.run(&["read-tree", commit])?;
        self.run(&["clean", "-fdx"])?;
        self.run(&["checkout-index", "-a", "-f"])
    }
}

// ---------------------------------------------------------------------------
// Plain invocations (no scratch-tree overrides)
// ---------------------------------------------------------------------------

/// Run `git <args...>` in `dir` without the scratch-tree env overrides.
pub fn run_in(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| spawn_error(args, &e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(git_error(args, &output))
}

/// Push a single refspec to a remote.
///
/// Non-fast-forward rejections are classified as
/// [`EngineError::PushRejected`]; every other failure (auth, network,
/// missing repository) surfaces as a plain git error.
pub fn push(repo_dir: &Path, remote: &str, refspec: &str) -> Result<()> {
    let args = ["push", remote, refspec];
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .map_err(|e| spawn_error(&args, &e))?;
    if output.status.success() {
        return Ok(());
    }
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if is_push_rejected(&combined) {
        return Err(EngineError::PushRejected {
            refspec: refspec.to_owned(),
        });
    }
    Err(EngineError::Git {
        command: format!("push {remote} {refspec}"),
        stderr: combined.trim().to_owned(),
    })
}

/// Does git push output indicate a non-fast-forward rejection?
#[must_use]
pub fn is_push_rejected(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("[rejected]")
        || lower.contains("non-fast-forward")
        || lower.contains("fetch first")
        || lower.contains("were rejected")
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("does not exist")
        || stderr.contains("not a valid object name")
        || stderr.contains("invalid object name")
        || stderr.contains("unknown revision")
        || stderr.contains("bad object")
        || stderr.contains("Path")
}

fn git_error(args: &[&str], output: &std::process::Output) -> EngineError {
    let mut message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if message.is_empty() {
        message = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    }
    if message.is_empty() {
        message = format!("exit status {:?}", output.status.code());
    }
    EngineError::Git {
        command: args.join(" "),
        stderr: message,
    }
}

fn spawn_error(args: &[&str], e: &std::io::Error) -> EngineError {
    EngineError::Git {
        command: args.join(" "),
        stderr: format!("failed to spawn git: {e}"),
    }
}
