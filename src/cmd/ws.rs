//! `warren ws` — workspace management.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use warren::config::ProjectMeta;
use warren::store::Store;
use warren::workspace::{Workspace, materialize_manifest};

use super::{project_root_from_cwd, short};

/// Manage workspaces within a project
#[derive(Subcommand, Debug)]
pub enum WsCommands {
    /// Create a new workspace directory under the project
    New(NewArgs),
    /// List the project's workspaces and their heads
    List,
}

/// Arguments for `warren ws new`.
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Workspace name (also the exported branch name)
    pub name: String,

    /// Fork from an existing snapshot (ID or unique prefix); the new
    /// workspace starts with that snapshot's content
    #[arg(long)]
    pub from: Option<String>,
}

pub fn run(cmd: &WsCommands) -> Result<()> {
    match cmd {
        WsCommands::New(args) => run_new(args),
        WsCommands::List => run_list(),
    }
}

fn run_new(args: &NewArgs) -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let project = ProjectMeta::load_at(&project_root)?;
    let store = Store::open_at(&project_root);

    if store.find_workspace_by_name(&args.name).is_ok() {
        bail!(
            "workspace '{}' already exists.\n  To fix: pick another name, or list workspaces:\n    warren ws list",
            args.name
        );
    }

    let base = match &args.from {
        Some(prefix) => store
            .resolve_snapshot_prefix(prefix)
            .with_context(|| format!("cannot fork from '{prefix}'"))?,
        None => String::new(),
    };

    let root = project_root.join(&args.name);
    let ws = Workspace::init(&root, &project.project_id, &args.name, &base)?;

    if !base.is_empty() {
        let manifest = ws.store().load_manifest_for_snapshot(&base)?;
        materialize_manifest(ws.root(), ws.store(), &manifest)?;
        println!(
            "Created workspace '{}' at {} (forked from {})",
            args.name,
            root.display(),
            short(&base)
        );
    } else {
        println!("Created workspace '{}' at {}", args.name, root.display());
    }
    Ok(())
}

fn run_list() -> Result<()> {
    let project_root = project_root_from_cwd()?;
    let store = Store::open_at(&project_root);
    let workspaces = store.list_workspaces()?;
    if workspaces.is_empty() {
        println!("No workspaces. Create one with: warren ws new <name>");
        return Ok(());
    }
    for ws in workspaces {
        let head = if ws.current_snapshot_id.is_empty() {
            "(no snapshots)".to_owned()
        } else {
            short(&ws.current_snapshot_id).to_owned()
        };
        println!("{:<20} {:<14} {}", ws.workspace_name, head, ws.path.display());
    }
    Ok(())
}
