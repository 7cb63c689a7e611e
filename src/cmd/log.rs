//! `warren log` — snapshot history of the current workspace.

use anyhow::Result;
use clap::Args;

use warren::dag::{self, SnapshotSource};

use super::{open_current_workspace, short};

/// Show snapshot history, newest first
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Limit the number of snapshots shown
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    /// Follow first parents only (the workspace's own chain, skipping
    /// merged-in histories)
    #[arg(long)]
    pub first_parent: bool,
}

pub fn run(args: &LogArgs) -> Result<()> {
    let ws = open_current_workspace()?;
    let Some(head) = ws.head()? else {
        println!("No snapshots yet. Create one with: warren snapshot -m \"...\"");
        return Ok(());
    };

    let ordered: Vec<warren::dag::SnapshotNode> = if args.first_parent {
        let mut chain = ws.store().build_workspace_chain(&head, "")?;
        chain.reverse();
        chain
            .iter()
            .filter_map(|id| ws.store().load_snapshot_meta(id).ok())
            .map(|meta| warren::dag::SnapshotNode::from(&meta))
            .collect()
    } else {
        let nodes = dag::load_reachable(&SnapshotSource::single(ws.store()), &[head])?;
        dag::topo_sort(&nodes)
    };

    for node in ordered.iter().take(args.limit) {
        let meta = ws.store().load_snapshot_meta(&node.id)?;
        let who = if !meta.agent.is_empty() {
            format!("agent {}", meta.agent)
        } else if !meta.author_name.is_empty() {
            meta.author_name.clone()
        } else {
            "unknown".to_owned()
        };
        let marker = if meta.parent_snapshot_ids.len() > 1 { "merge" } else { "" };
        println!(
            "{}  {}  {:<24} {} {}",
            short(&node.id),
            meta.created_at,
            who,
            meta.message,
            marker
        );
    }
    if ordered.len() > args.limit {
        println!("... {} more (use -n to show)", ordered.len() - args.limit);
    }
    Ok(())
}
