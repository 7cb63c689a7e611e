//! CLI command implementations.
//!
//! Each submodule is one subcommand: a clap `Args` struct plus a `run`
//! function. Commands locate the enclosing workspace/project from the
//! current directory, call into the engine, and format results for humans.
//! Engine errors are wrapped with `anyhow` context here; the engine itself
//! never prints.

pub mod conflicts;
pub mod drift;
pub mod init;
pub mod log;
pub mod merge;
pub mod remote;
pub mod restore;
pub mod snapshot;
pub mod status;
pub mod ws;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use warren::config::{ProjectConfig, WorkspaceConfig};
use warren::store::find_project_root;
use warren::workspace::{SnapshotIdentity, Workspace};

/// Walk up from the current directory to the enclosing workspace root.
pub fn find_workspace_root() -> Result<PathBuf> {
    let mut dir = std::env::current_dir().context("failed to get current directory")?;
    loop {
        if WorkspaceConfig::exists_at(&dir) {
            return Ok(dir);
        }
        if !dir.pop() {
            bail!(
                "not inside a warren workspace.\n  \
                 To fix: cd into a workspace, or create one:\n    warren ws new <name>"
            );
        }
    }
}

/// Open the workspace enclosing the current directory.
pub fn open_current_workspace() -> Result<Workspace> {
    let root = find_workspace_root()?;
    Workspace::open(&root).with_context(|| format!("failed to open workspace at {}", root.display()))
}

/// Walk up from the current directory to the enclosing project root.
pub fn project_root_from_cwd() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    find_project_root(&cwd).ok_or_else(|| {
        anyhow::anyhow!(
            "not inside a warren project.\n  \
             To fix: run from a project directory, or initialize one:\n    warren init"
        )
    })
}

/// Resolve the identity to record on a snapshot: explicit `--agent` flag,
/// then the `WARREN_AGENT` env var, then the configured author.
pub fn resolve_identity(project_root: &std::path::Path, agent_flag: Option<&str>) -> SnapshotIdentity {
    if let Some(agent) = agent_flag {
        return SnapshotIdentity::agent(agent);
    }
    if let Ok(agent) = std::env::var("WARREN_AGENT")
        && !agent.is_empty()
    {
        return SnapshotIdentity::agent(&agent);
    }
    match ProjectConfig::load_at(project_root) {
        Ok(cfg) => SnapshotIdentity::from_author(&cfg.author),
        Err(_) => SnapshotIdentity::default(),
    }
}

/// Shorten a snapshot ID for display.
#[must_use]
pub fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}
