//! `warren drift` — divergence between this workspace and another.

use anyhow::{Context, Result};
use clap::Args;

use warren::drift::compute_divergence;
use warren::workspace::Workspace;

use super::{open_current_workspace, short};

/// Compare this workspace with another one
///
/// Locates the shared ancestor (fork point or DAG merge-base) and reports
/// each side's changes relative to it, plus the paths both sides touched —
/// the cheap pre-check before full conflict analysis.
#[derive(Args, Debug)]
pub struct DriftArgs {
    /// The workspace to compare against
    pub workspace: String,

    /// Compare committed snapshots only, ignoring uncommitted edits
    #[arg(long)]
    pub no_dirty: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &DriftArgs) -> Result<()> {
    let ours = open_current_workspace()?;
    let info = ours
        .store()
        .find_workspace_by_name(&args.workspace)
        .with_context(|| {
            format!(
                "workspace '{}' not found in project.\n  To fix: list workspaces with: warren ws list",
                args.workspace
            )
        })?;
    let theirs = Workspace::open(&info.path)
        .with_context(|| format!("workspace no longer exists at {}", info.path.display()))?;

    let report = compute_divergence(&ours, &theirs, !args.no_dirty)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.has_common_ancestor {
        println!(
            "Common ancestor: {} (ours: {}, theirs: {})",
            short(&report.common_ancestor_id),
            short(&report.our_head),
            short(&report.their_head)
        );
    } else {
        println!("No common ancestor — direct two-way comparison");
    }
    println!("Our changes:    {}", report.our_changes.summary());
    println!("Their changes:  {}", report.their_changes.summary());
    if report.overlapping_paths.is_empty() {
        println!("No overlapping paths");
    } else {
        println!("Overlapping paths (conflict candidates):");
        for path in &report.overlapping_paths {
            println!("  ! {path}");
        }
        println!("Run 'warren conflicts {}' for line-level analysis", report.their_name);
    }
    Ok(())
}
