//! `warren restore` — roll the workspace tree back to a snapshot.

use anyhow::{Context, Result};
use clap::Args;

use super::{open_current_workspace, short};

/// Restore the workspace tree to a snapshot
///
/// Replaces the working tree with the snapshot's content (state directories
/// are preserved) and moves the head pointer there.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Snapshot ID or unique prefix
    pub snapshot: String,
}

pub fn run(args: &RestoreArgs) -> Result<()> {
    let mut ws = open_current_workspace()?;
    let id = ws
        .store()
        .resolve_snapshot_prefix(&args.snapshot)
        .with_context(|| format!("cannot resolve snapshot '{}'", args.snapshot))?;
    ws.restore(&id)?;
    println!("Restored workspace to {}", short(&id));
    Ok(())
}
