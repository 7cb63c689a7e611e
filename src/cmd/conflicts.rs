//! `warren conflicts` — line-level three-way conflict analysis.

use anyhow::{Context, Result, bail};
use clap::Args;

use warren::conflict::{WorktreeBlobs, detect};
use warren::dag::{self, SnapshotSource};
use warren::workspace::Workspace;

use super::{open_current_workspace, short};

/// Detect line-level conflicts against another workspace
///
/// Finds the common ancestor of both heads, then reports every file where
/// the two histories changed overlapping lines.
#[derive(Args, Debug)]
pub struct ConflictsArgs {
    /// The workspace to compare against
    pub workspace: String,

    /// Include uncommitted local edits in the analysis
    #[arg(long)]
    pub dirty: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &ConflictsArgs) -> Result<()> {
    let ours = open_current_workspace()?;
    let info = ours
        .store()
        .find_workspace_by_name(&args.workspace)
        .with_context(|| format!("workspace '{}' not found in project", args.workspace))?;
    let theirs = Workspace::open(&info.path)?;

    let our_head = ours.head()?.unwrap_or_default();
    let their_head = theirs.head()?.unwrap_or_default();
    if our_head.is_empty() || their_head.is_empty() {
        bail!("both workspaces need at least one snapshot for conflict analysis");
    }

    let source = SnapshotSource::pair(ours.store(), theirs.store());
    let base_id = dag::merge_base(&source, &our_head, &their_head)
        .context("could not find a common ancestor; both workspaces need shared history")?;
    let base = ours
        .store()
        .load_manifest_for_snapshot(&base_id)
        .or_else(|_| theirs.store().load_manifest_for_snapshot(&base_id))?;

    let their_manifest = theirs.store().load_manifest_for_snapshot(&their_head)?;
    let report = if args.dirty {
        let local = ours.current_manifest()?;
        let local_blobs = WorktreeBlobs::new(ours.root(), &local);
        detect(&base, &local, &their_manifest, ours.store(), &local_blobs, theirs.store())
    } else {
        let local = ours.store().load_manifest_for_snapshot(&our_head)?;
        detect(&base, &local, &their_manifest, ours.store(), ours.store(), theirs.store())
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Base: {}", short(&base_id));
    println!("{}", report.summary());
    for conflict in &report.conflicts {
        println!("\n{}:", conflict.path);
        for hunk in &conflict.hunks {
            println!("  lines {}-{}", hunk.start_line, hunk.end_line);
            for line in &hunk.local_lines {
                println!("    ours:   {line}");
            }
            for line in &hunk.source_lines {
                println!("    theirs: {line}");
            }
        }
    }
    Ok(())
}
