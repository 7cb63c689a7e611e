//! `warren merge` — merge another workspace's head into this one.

use anyhow::{Context, Result, bail};
use clap::Args;

use warren::merge::{MergeResolution, apply_merge, plan_merge};
use warren::workspace::Workspace;

use super::{open_current_workspace, project_root_from_cwd, resolve_identity, short};

/// Merge another workspace's snapshot history into this workspace
///
/// Computes a three-way plan against the common ancestor. Non-conflicting
/// changes apply automatically; conflicting paths need --ours or --theirs.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// The workspace to merge from
    pub workspace: String,

    /// Keep our version of conflicting paths
    #[arg(long, conflicts_with = "theirs")]
    pub ours: bool,

    /// Take the source version of conflicting paths
    #[arg(long)]
    pub theirs: bool,

    /// Merge even without a common ancestor (two-way merge)
    #[arg(long)]
    pub force: bool,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: &MergeArgs) -> Result<()> {
    let mut ours = open_current_workspace()?;
    let info = ours
        .store()
        .find_workspace_by_name(&args.workspace)
        .with_context(|| format!("workspace '{}' not found in project", args.workspace))?;
    let theirs = Workspace::open(&info.path)?;

    let our_head = ours
        .head()?
        .context("this workspace has no snapshots to merge into")?;
    let their_head = theirs
        .head()?
        .with_context(|| format!("workspace '{}' has no snapshots to merge", args.workspace))?;
    if our_head == their_head {
        println!("Already in sync at {}", short(&our_head));
        return Ok(());
    }
    if ours.store().is_ancestor_of(&their_head, &our_head) {
        println!(
            "Nothing to merge — '{}' ({}) is already in this workspace's history",
            args.workspace,
            short(&their_head)
        );
        return Ok(());
    }

    let plan = plan_merge(ours.store(), theirs.store(), &our_head, &their_head, args.force)?;
    println!("Merge plan (base {}):", short_or_none(&plan.merge_base_id));
    println!("  Apply from '{}':  {} files", args.workspace, plan.to_apply.len());
    println!("  Conflicts:        {} files", plan.conflicts.len());
    println!("  Already in sync:  {} files", plan.in_sync);

    if args.dry_run {
        for action in &plan.conflicts {
            println!("  conflict: {}", action.path);
        }
        return Ok(());
    }

    let resolution = if args.theirs {
        MergeResolution::Theirs
    } else if args.ours {
        MergeResolution::Ours
    } else if plan.conflicts.is_empty() {
        MergeResolution::Ours
    } else {
        for action in &plan.conflicts {
            println!("  conflict: {}", action.path);
        }
        bail!(
            "{} conflicting files.\n  To fix: re-run with --ours or --theirs, or inspect with:\n    warren conflicts {}",
            plan.conflicts.len(),
            args.workspace
        );
    };

    let project_root = project_root_from_cwd().unwrap_or_else(|_| ours.root().to_path_buf());
    let identity = resolve_identity(&project_root, None);
    let message = format!("Merge workspace '{}'", args.workspace);
    let merged = apply_merge(&mut ours, &plan, resolution, &identity, &message)?;
    println!("Merged into {}", short(&merged.id));
    Ok(())
}

fn short_or_none(id: &str) -> &str {
    if id.is_empty() { "(none)" } else { short(id) }
}
