//! `warren snapshot` — record the current tree.

use anyhow::Result;
use clap::Args;

use super::{open_current_workspace, project_root_from_cwd, resolve_identity, short};

/// Snapshot the current workspace tree
///
/// Hashes every file, stores new content in the project store, and advances
/// the workspace head. Running with an unchanged tree is a no-op that
/// reports the existing head.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Snapshot message
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Record the snapshot as this agent instead of the configured author
    #[arg(long, env = "WARREN_AGENT")]
    pub agent: Option<String>,
}

pub fn run(args: &SnapshotArgs) -> Result<()> {
    let mut ws = open_current_workspace()?;
    let project_root = project_root_from_cwd().unwrap_or_else(|_| ws.root().to_path_buf());
    let identity = resolve_identity(&project_root, args.agent.as_deref());

    let before = ws.config().current_snapshot_id.clone();
    let meta = ws.create_snapshot(&args.message, &identity)?;

    if meta.id == before {
        println!("No changes since {} — nothing to snapshot", short(&meta.id));
    } else {
        println!(
            "Created snapshot {} ({} files, {} bytes)",
            short(&meta.id),
            meta.files,
            meta.size
        );
    }
    Ok(())
}
