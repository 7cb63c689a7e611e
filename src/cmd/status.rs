//! `warren status` — drift of the live tree against the workspace head.

use anyhow::Result;
use clap::Args;

use warren::drift;
use warren::manifest::Manifest;

use super::{open_current_workspace, short};

/// Show files changed since the last snapshot
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &StatusArgs) -> Result<()> {
    let ws = open_current_workspace()?;

    let (base_manifest, head) = match ws.head()? {
        Some(head) => (ws.store().load_manifest_for_snapshot(&head)?, Some(head)),
        None => (Manifest::empty(), None),
    };

    let current = ws.current_manifest()?;
    let mut report = drift::compare_manifests(&base_manifest, &current);
    if let Some(head) = &head {
        report.base_snapshot_id.clone_from(head);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match head {
        Some(head) => println!("Workspace '{}' at {}", ws.config().workspace_name, short(&head)),
        None => println!("Workspace '{}' has no snapshots yet", ws.config().workspace_name),
    }
    if !report.has_changes() {
        println!("Clean — no changes since last snapshot");
        return Ok(());
    }
    for path in &report.files_added {
        println!("  A {path}");
    }
    for path in &report.files_modified {
        println!("  M {path}");
    }
    for path in &report.files_deleted {
        println!("  D {path}");
    }
    println!("{}", report.summary());
    Ok(())
}
