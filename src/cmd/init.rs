//! `warren init` — initialize a project.

use anyhow::{Context, Result, bail};
use clap::Args;

use warren::store::{PROJECT_FILE, STATE_DIR};
use warren::workspace;

/// Initialize a warren project in the current directory
///
/// Creates the `.warren/` state directory (snapshot, manifest, and blob
/// stores) and the project marker. Workspaces are created under the project
/// with `warren ws new <name>`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name (default: the directory name)
    pub name: Option<String>,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    if cwd.join(STATE_DIR).join(PROJECT_FILE).exists() {
        bail!(
            "a warren project already exists here.\n  \
             To fix: create workspaces with: warren ws new <name>"
        );
    }

    let name = args.name.clone().unwrap_or_else(|| {
        cwd.file_name()
            .map_or_else(|| "project".to_owned(), |n| n.to_string_lossy().into_owned())
    });
    let meta = workspace::init_project(&cwd, &name)?;

    println!("Initialized project '{}' ({})", meta.project_name, meta.project_id);
    println!("Next: create a workspace with: warren ws new <name>");
    Ok(())
}
