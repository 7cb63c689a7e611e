use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

/// Content-addressed version control for parallel agent workspaces
///
/// Warren coordinates many AI-agent working copies of one project. Each
/// workspace is an isolated directory with its own snapshot history; all
/// workspaces share one content-addressed store, and the whole snapshot DAG
/// can be exported to (and re-imported from) a real git remote.
///
/// QUICK START:
///
///   warren init                  # in the project directory
///   warren ws new agent-1        # one directory per agent
///   cd agent-1 && warren snapshot -m "first pass"
///
///   warren drift agent-2         # what diverged between two agents?
///   warren conflicts agent-2     # do the edits actually collide?
///   warren merge agent-2 --theirs
///
///   warren export --init         # snapshot DAG -> git branches
///   warren sync                  # push; reconcile if the remote moved
#[derive(Parser)]
#[command(name = "warren")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'warren <command> --help' for details on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a warren project in the current directory
    Init(cmd::init::InitArgs),

    /// Manage workspaces
    #[command(subcommand)]
    Ws(cmd::ws::WsCommands),

    /// Snapshot the current workspace tree
    Snapshot(cmd::snapshot::SnapshotArgs),

    /// Show files changed since the last snapshot
    Status(cmd::status::StatusArgs),

    /// Compare this workspace with another one
    Drift(cmd::drift::DriftArgs),

    /// Detect line-level conflicts against another workspace
    Conflicts(cmd::conflicts::ConflictsArgs),

    /// Show snapshot history, newest first
    Log(cmd::log::LogArgs),

    /// Restore the workspace tree to a snapshot
    Restore(cmd::restore::RestoreArgs),

    /// Merge another workspace's history into this one
    Merge(cmd::merge::MergeArgs),

    /// Export workspace snapshots to git branches
    Export(cmd::remote::ExportArgs),

    /// Import new git commits as snapshots
    Import(cmd::remote::ImportArgs),

    /// Fetch remote changes and import them
    Pull(cmd::remote::PullArgs),

    /// Bidirectional sync with the configured remote
    Sync(cmd::remote::SyncArgs),
}

fn main() -> Result<()> {
    warren::telemetry::init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Init(args) => cmd::init::run(args),
        Commands::Ws(args) => cmd::ws::run(args),
        Commands::Snapshot(args) => cmd::snapshot::run(args),
        Commands::Status(args) => cmd::status::run(args),
        Commands::Drift(args) => cmd::drift::run(args),
        Commands::Conflicts(args) => cmd::conflicts::run(args),
        Commands::Log(args) => cmd::log::run(args),
        Commands::Restore(args) => cmd::restore::run(args),
        Commands::Merge(args) => cmd::merge::run(args),
        Commands::Export(args) => cmd::remote::run_export(args),
        Commands::Import(args) => cmd::remote::run_import(args),
        Commands::Pull(args) => cmd::remote::run_pull(args),
        Commands::Sync(args) => cmd::remote::run_sync(args),
    }
}
