//! `warren export` / `import` / `sync` / `pull` — the git bridge commands.

use anyhow::{Result, bail};
use clap::Args;

use warren::backend::{self, SyncOptions};
use warren::config::ProjectConfig;
use warren::git::{self, DivergenceInfo, ExportOptions};
use warren::merge::{MergeResolution, apply_merge, plan_merge};
use warren::workspace::Workspace;

use super::{project_root_from_cwd, resolve_identity, short};

/// Export workspace snapshots to git branches
///
/// Each workspace becomes a branch named after it. The snapshot→commit
/// mapping in .warren/export/ makes re-export incremental: only new
/// snapshots produce commits.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Initialize a git repository at the project root if none exists
    #[arg(long)]
    pub init: bool,

    /// Discard the mapping and regenerate all commits from scratch
    #[arg(long)]
    pub rebuild: bool,
}

pub fn run_export(args: &ExportArgs) -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let outcome = git::export(
        &project_root,
        ExportOptions {
            init_repo: args.init,
            rebuild: args.rebuild,
        },
    )?;

    for name in &outcome.skipped {
        println!("Skipped workspace '{name}' (no snapshots)");
    }
    for (name, err) in &outcome.errors {
        eprintln!("Failed to export workspace '{name}': {err}");
    }
    if outcome.new_commits > 0 {
        println!(
            "Exported {} new commits across {} workspaces",
            outcome.new_commits, outcome.exported_workspaces
        );
    } else {
        println!("All {} workspaces up to date", outcome.exported_workspaces);
    }
    if !outcome.errors.is_empty() {
        bail!("{} workspaces failed to export", outcome.errors.len());
    }
    Ok(())
}

/// Import new git commits as snapshots
///
/// Replays commits that are not yet in the mapping. Workspace heads advance
/// to branch tips unless local work has diverged, which is reported instead.
#[derive(Args, Debug)]
pub struct ImportArgs {}

pub fn run_import(_args: &ImportArgs) -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let outcome = git::import_incremental(&project_root)?;
    report_import(&outcome.diverged, outcome.new_snapshots);
    for (branch, err) in &outcome.errors {
        eprintln!("Failed to import branch '{branch}': {err}");
    }
    if !outcome.errors.is_empty() {
        bail!("{} branches failed to import", outcome.errors.len());
    }
    Ok(())
}

/// Fetch remote changes and import them
#[derive(Args, Debug)]
pub struct PullArgs {}

pub fn run_pull(_args: &PullArgs) -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let cfg = ProjectConfig::load_at(&project_root)?;
    let backend = backend::from_config(&cfg);
    let outcome = backend.pull(&project_root)?;
    report_import(&outcome.diverged, outcome.new_snapshots);
    Ok(())
}

/// Sync with the remote: export, push, reconcile on rejection
///
/// A rejected push triggers fetch + import; diverged workspaces are merged
/// using the chosen conflict resolution, then the result is pushed once
/// more. Without --ours/--theirs, divergence with conflicting edits fails.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Keep local versions of conflicting paths when merging divergence
    #[arg(long, conflicts_with = "theirs")]
    pub ours: bool,

    /// Take remote versions of conflicting paths when merging divergence
    #[arg(long)]
    pub theirs: bool,
}

pub fn run_sync(args: &SyncArgs) -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let cfg = ProjectConfig::load_at(&project_root)?;
    let backend = backend::from_config(&cfg);

    let resolution = if args.theirs {
        Some(MergeResolution::Theirs)
    } else if args.ours {
        Some(MergeResolution::Ours)
    } else {
        None
    };

    let root_for_identity = project_root.clone();
    let mut opts = SyncOptions {
        on_divergence: Some(Box::new(move |div: &DivergenceInfo| {
            merge_divergence(&root_for_identity, div, resolution)
        })),
    };

    backend.sync(&project_root, &mut opts)?;
    println!("Sync complete");
    Ok(())
}

/// Merge a diverged workspace: local head × imported remote head.
fn merge_divergence(
    project_root: &std::path::Path,
    div: &DivergenceInfo,
    resolution: Option<MergeResolution>,
) -> warren::Result<String> {
    let mut ws = Workspace::open(&div.workspace_root)?;
    let plan = plan_merge(
        ws.store(),
        ws.store(),
        &div.local_head,
        &div.remote_head,
        false,
    )?;

    let resolution = match resolution {
        Some(r) => r,
        None if plan.conflicts.is_empty() => MergeResolution::Ours,
        None => {
            return Err(warren::EngineError::Diverged {
                workspace: div.workspace_name.clone(),
                local_head: div.local_head.clone(),
                remote_head: div.remote_head.clone(),
            });
        }
    };

    let identity = resolve_identity(project_root, None);
    let message = format!("Merge remote changes into '{}'", div.workspace_name);
    let merged = apply_merge(&mut ws, &plan, resolution, &identity, &message)?;
    println!(
        "Merged diverged workspace '{}' -> {}",
        div.workspace_name,
        short(&merged.id)
    );
    Ok(merged.id)
}

fn report_import(diverged: &[DivergenceInfo], new_snapshots: usize) {
    if new_snapshots > 0 {
        println!("Imported {new_snapshots} new snapshots");
    } else {
        println!("Already up to date");
    }
    for div in diverged {
        println!(
            "Workspace '{}' diverged: local {} vs remote {} (base {})",
            div.workspace_name,
            short(&div.local_head),
            short(&div.remote_head),
            short(&div.merge_base)
        );
        println!("  To fix: run 'warren sync --ours' or 'warren sync --theirs', or merge manually");
    }
}
