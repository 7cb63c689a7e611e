//! Snapshot DAG traversal: reachability, topological ordering, merge-base.
//!
//! The DAG is held as an explicit arena (map from ID to node) and every
//! traversal is an explicit worklist with a visited set — no recursion — so
//! memory stays bounded regardless of history depth and the structures stay
//! trivially serializable.

use std::collections::{HashMap, VecDeque};

use chrono::DateTime;

use crate::error::{EngineError, Result};
use crate::store::{SnapshotMeta, Store};

/// Minimal snapshot data needed for DAG traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotNode {
    /// Snapshot ID.
    pub id: String,
    /// Parent snapshot IDs (empty entries removed).
    pub parent_ids: Vec<String>,
    /// Creation time, RFC 3339.
    pub created_at: String,
}

impl From<&SnapshotMeta> for SnapshotNode {
    fn from(meta: &SnapshotMeta) -> Self {
        Self {
            id: meta.id.clone(),
            parent_ids: meta
                .parent_snapshot_ids
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            created_at: meta.created_at.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotSource — two-location metadata lookup
// ---------------------------------------------------------------------------

/// Snapshot metadata resolver that consults up to two store locations.
///
/// Merge-base and import traverse histories that may span a target and a
/// source workspace whose snapshots live in historically-diverged store
/// locations; a record found in either location counts as found.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotSource<'a> {
    target: &'a Store,
    source: Option<&'a Store>,
}

impl<'a> SnapshotSource<'a> {
    /// Resolve from a single store.
    #[must_use]
    pub const fn single(store: &'a Store) -> Self {
        Self {
            target: store,
            source: None,
        }
    }

    /// Resolve from a target store first, then a source store.
    #[must_use]
    pub const fn pair(target: &'a Store, source: &'a Store) -> Self {
        Self {
            target,
            source: Some(source),
        }
    }

    /// Load snapshot metadata from the target location, falling back to the
    /// source location.
    pub fn load(&self, id: &str) -> Result<SnapshotMeta> {
        match self.target.load_snapshot_meta(id) {
            Ok(meta) => Ok(meta),
            Err(first) => match self.source {
                Some(source) => source.load_snapshot_meta(id).map_err(|_| first),
                None => Err(first),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// BFS from `heads` through parent links over an in-memory arena, returning
/// every reachable node. Parents missing from the arena are skipped.
#[must_use]
pub fn collect_reachable(
    heads: &[String],
    nodes: &HashMap<String, SnapshotNode>,
) -> HashMap<String, SnapshotNode> {
    let mut reachable: HashMap<String, SnapshotNode> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for h in heads {
        if nodes.contains_key(h) && !reachable.contains_key(h) {
            reachable.insert(h.clone(), nodes[h].clone());
            queue.push_back(h.clone());
        }
    }

    while let Some(current) = queue.pop_front() {
        let parent_ids = reachable[&current].parent_ids.clone();
        for pid in parent_ids {
            if let Some(node) = nodes.get(&pid)
                && !reachable.contains_key(&pid)
            {
                reachable.insert(pid.clone(), node.clone());
                queue.push_back(pid);
            }
        }
    }

    reachable
}

/// BFS from `heads` through parent links, loading metadata on demand from a
/// [`SnapshotSource`]. Unloadable parents are dropped with a warning —
/// partial lineage is tolerated here; only the heads themselves must load.
pub fn load_reachable(
    source: &SnapshotSource<'_>,
    heads: &[String],
) -> Result<HashMap<String, SnapshotNode>> {
    let mut nodes: HashMap<String, SnapshotNode> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for h in heads {
        if h.is_empty() || nodes.contains_key(h) {
            continue;
        }
        let meta = source.load(h)?;
        nodes.insert(h.clone(), SnapshotNode::from(&meta));
        queue.push_back(h.clone());
    }

    while let Some(current) = queue.pop_front() {
        let parent_ids = nodes[&current].parent_ids.clone();
        for pid in parent_ids {
            if nodes.contains_key(&pid) {
                continue;
            }
            match source.load(&pid) {
                Ok(meta) => {
                    nodes.insert(pid.clone(), SnapshotNode::from(&meta));
                    queue.push_back(pid);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(snapshot = %pid, "snapshot metadata missing, dropping from traversal");
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(nodes)
}

// ---------------------------------------------------------------------------
// Topological ordering
// ---------------------------------------------------------------------------

/// Topologically sort an arena of snapshots, children strictly before
/// parents (tips first).
///
/// Kahn's algorithm: a node's indegree is the number of *other* nodes in the
/// set that list it as a parent, so indegree-0 nodes are the heads. Ties
/// among ready nodes are broken by `created_at` descending (newest first),
/// then by ID, making the ordering fully deterministic.
#[must_use]
pub fn topo_sort(nodes: &HashMap<String, SnapshotNode>) -> Vec<SnapshotNode> {
    let mut indegree: HashMap<&str, usize> = nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for node in nodes.values() {
        for pid in &node.parent_ids {
            if let Some(deg) = indegree.get_mut(pid.as_str()) {
                *deg += 1;
            }
        }
    }

    let mut ready: Vec<&SnapshotNode> = indegree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(id, _)| &nodes[*id])
        .collect();
    sort_newest_first(&mut ready);

    let mut result = Vec::with_capacity(nodes.len());
    while let Some(current) = ready.pop() {
        result.push(current.clone());
        for pid in &current.parent_ids {
            let Some(deg) = indegree.get_mut(pid.as_str()) else {
                continue;
            };
            *deg -= 1;
            if *deg == 0 {
                ready.push(&nodes[pid.as_str()]);
                sort_newest_first(&mut ready);
            }
        }
    }

    result
}

/// Sort so that the newest node sits at the *end* (popped first).
fn sort_newest_first(ready: &mut [&SnapshotNode]) {
    ready.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ---------------------------------------------------------------------------
// Merge-base
// ---------------------------------------------------------------------------

/// Find the nearest common ancestor of two snapshot heads.
///
/// BFS from `target_head` builds a distance map; BFS from `source_head`
/// scores every intersection by `source_dist + target_dist` and keeps the
/// minimum, breaking score ties by preferring the ancestor with the most
/// recent `created_at`. The source-side BFS stops expanding once the current
/// frontier distance exceeds the best score found — with BFS's monotonically
/// non-decreasing frontier distance no better ancestor can appear past that
/// point.
pub fn merge_base(
    source: &SnapshotSource<'_>,
    target_head: &str,
    source_head: &str,
) -> Result<String> {
    if target_head.is_empty() || source_head.is_empty() {
        return Err(EngineError::NotFound {
            kind: "snapshot",
            id: "(empty head)".to_owned(),
        });
    }

    // Distance map from the target head.
    let mut target_dist: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(target_head.to_owned(), 0)]);
    while let Some((id, dist)) = queue.pop_front() {
        if target_dist.contains_key(&id) {
            continue;
        }
        let meta = load_for_ancestry(source, &id)?;
        target_dist.insert(id, dist);
        for parent in &meta.parent_snapshot_ids {
            if !parent.is_empty() && !target_dist.contains_key(parent) {
                queue.push_back((parent.clone(), dist + 1));
            }
        }
    }

    // BFS from the source head, scoring intersections.
    let mut best_id: Option<String> = None;
    let mut best_score = usize::MAX;
    let mut best_time: Option<DateTime<chrono::FixedOffset>> = None;

    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::from([(source_head.to_owned(), 0)]);
    while let Some((id, dist)) = queue.pop_front() {
        if seen.contains(&id) {
            continue;
        }
        if best_id.is_some() && dist > best_score {
            break;
        }
        seen.insert(id.clone());
        let meta = load_for_ancestry(source, &id)?;

        if let Some(&tdist) = target_dist.get(&id) {
            let score = dist + tdist;
            let time = DateTime::parse_from_rfc3339(&meta.created_at).ok();
            let better = score < best_score
                || (score == best_score
                    && match (&time, &best_time) {
                        (Some(t), Some(bt)) => t > bt,
                        (Some(_), None) => true,
                        _ => false,
                    });
            if best_id.is_none() || better {
                best_score = score;
                best_id = Some(id.clone());
                best_time = time;
            }
        }

        for parent in &meta.parent_snapshot_ids {
            if !parent.is_empty() && !seen.contains(parent) {
                queue.push_back((parent.clone(), dist + 1));
            }
        }
    }

    best_id.ok_or_else(|| EngineError::NoCommonAncestor {
        target: target_head.to_owned(),
        source_head: source_head.to_owned(),
    })
}

/// Load a record during ancestor search, mapping any failure to
/// [`EngineError::MissingAncestorMetadata`] — merge-base never tolerates
/// holes in the histories it walks.
fn load_for_ancestry(source: &SnapshotSource<'_>, id: &str) -> Result<SnapshotMeta> {
    source
        .load(id)
        .map_err(|_| EngineError::MissingAncestorMetadata { id: id.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::compute_snapshot_id;

    /// Write a snapshot with real content-addressed identity into a store.
    fn write_snap(store: &Store, parents: &[&str], created_at: &str) -> String {
        let parent_ids: Vec<String> = parents.iter().map(|p| (*p).to_owned()).collect();
        let manifest_hash = "0".repeat(64);
        let id = compute_snapshot_id(&manifest_hash, &parent_ids, "", "", created_at);
        store
            .write_snapshot_meta(&SnapshotMeta {
                id: id.clone(),
                workspace_id: "ws-test".to_owned(),
                manifest_hash,
                parent_snapshot_ids: parent_ids,
                created_at: created_at.to_owned(),
                ..SnapshotMeta::default()
            })
            .unwrap();
        id
    }

    fn arena(store: &Store, heads: &[&str]) -> HashMap<String, SnapshotNode> {
        let src = SnapshotSource::single(store);
        let heads: Vec<String> = heads.iter().map(|h| (*h).to_owned()).collect();
        load_reachable(&src, &heads).unwrap()
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        store.ensure_dirs().unwrap();
        (dir, store)
    }

    #[test]
    fn topo_sort_puts_every_parent_after_its_children() {
        let (_dir, store) = temp_store();
        let root = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let a = write_snap(&store, &[&root], "2026-01-01T00:01:00Z");
        let b = write_snap(&store, &[&root], "2026-01-01T00:02:00Z");
        let merge = write_snap(&store, &[&a, &b], "2026-01-01T00:03:00Z");

        let nodes = arena(&store, &[&merge]);
        let order = topo_sort(&nodes);
        let pos: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        for node in &order {
            for parent in &node.parent_ids {
                assert!(
                    pos[parent.as_str()] > pos[node.id.as_str()],
                    "parent {parent} must come after child {}",
                    node.id
                );
            }
        }
        assert_eq!(order.len(), 4);
        assert_eq!(order[0].id, merge);
        assert_eq!(order[3].id, root);
    }

    #[test]
    fn topo_sort_breaks_ties_newest_first() {
        let (_dir, store) = temp_store();
        let a = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let b = write_snap(&store, &[], "2026-01-02T00:00:00Z");

        let nodes = arena(&store, &[&a, &b]);
        let order = topo_sort(&nodes);
        assert_eq!(order[0].id, b, "newest tip first");
        assert_eq!(order[1].id, a);
    }

    #[test]
    fn collect_reachable_bounds_history() {
        let (_dir, store) = temp_store();
        let root = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let a = write_snap(&store, &[&root], "2026-01-01T00:01:00Z");
        let _stray = write_snap(&store, &[], "2026-01-01T00:05:00Z");

        let nodes = arena(&store, &[&a]);
        let reachable = collect_reachable(&[a.clone()], &nodes);
        assert_eq!(reachable.len(), 2);
        assert!(reachable.contains_key(&root));
        assert!(reachable.contains_key(&a));
    }

    #[test]
    fn merge_base_of_head_with_itself_is_itself() {
        let (_dir, store) = temp_store();
        let a = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let b = write_snap(&store, &[&a], "2026-01-01T00:01:00Z");
        let c = write_snap(&store, &[&b], "2026-01-01T00:02:00Z");

        let src = SnapshotSource::single(&store);
        assert_eq!(merge_base(&src, &c, &c).unwrap(), c);
    }

    #[test]
    fn merge_base_of_diamond_arms_is_the_fork_point() {
        let (_dir, store) = temp_store();
        let c = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let a = write_snap(&store, &[&c], "2026-01-01T00:01:00Z");
        let b = write_snap(&store, &[&c], "2026-01-01T00:02:00Z");
        let _m = write_snap(&store, &[&a, &b], "2026-01-01T00:03:00Z");

        let src = SnapshotSource::single(&store);
        assert_eq!(merge_base(&src, &a, &b).unwrap(), c);
        assert_eq!(merge_base(&src, &b, &a).unwrap(), c);
    }

    #[test]
    fn merge_base_of_ancestor_and_descendant_is_the_ancestor() {
        let (_dir, store) = temp_store();
        let a = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let b = write_snap(&store, &[&a], "2026-01-01T00:01:00Z");
        let c = write_snap(&store, &[&b], "2026-01-01T00:02:00Z");

        let src = SnapshotSource::single(&store);
        assert_eq!(merge_base(&src, &a, &c).unwrap(), a);
        assert_eq!(merge_base(&src, &c, &a).unwrap(), a);
    }

    #[test]
    fn merge_base_ties_prefer_more_recent_ancestor() {
        // Two disjoint-distance common ancestors with equal combined score:
        //   old ← x ← target        old ← y ← source
        //   new ← x                 new ← y
        // Both `old` and `new` score 2; the newer one must win.
        let (_dir, store) = temp_store();
        let old = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let new = write_snap(&store, &[], "2026-06-01T00:00:00Z");
        let x = write_snap(&store, &[&old, &new], "2026-06-02T00:00:00Z");
        let y = write_snap(&store, &[&old, &new], "2026-06-03T00:00:00Z");

        let src = SnapshotSource::single(&store);
        assert_eq!(merge_base(&src, &x, &y).unwrap(), new);
    }

    #[test]
    fn merge_base_errors_without_common_history() {
        let (_dir, store) = temp_store();
        let a = write_snap(&store, &[], "2026-01-01T00:00:00Z");
        let b = write_snap(&store, &[], "2026-01-01T00:01:00Z");

        let src = SnapshotSource::single(&store);
        let err = merge_base(&src, &a, &b).unwrap_err();
        assert!(matches!(err, EngineError::NoCommonAncestor { .. }));
    }

    #[test]
    fn merge_base_surfaces_missing_metadata() {
        let (_dir, store) = temp_store();
        let ghost_parent = "f".repeat(64);
        let manifest_hash = "0".repeat(64);
        let id = compute_snapshot_id(
            &manifest_hash,
            std::slice::from_ref(&ghost_parent),
            "",
            "",
            "2026-01-01T00:00:00Z",
        );
        store
            .write_snapshot_meta(&SnapshotMeta {
                id: id.clone(),
                workspace_id: "ws".to_owned(),
                manifest_hash,
                parent_snapshot_ids: vec![ghost_parent],
                created_at: "2026-01-01T00:00:00Z".to_owned(),
                ..SnapshotMeta::default()
            })
            .unwrap();

        let src = SnapshotSource::single(&store);
        // The target-side BFS loads the full ancestry up front, so the hole
        // behind the head surfaces before any intersection is scored.
        let err = merge_base(&src, &id, &id).unwrap_err();
        match err {
            EngineError::MissingAncestorMetadata { .. } => {}
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn merge_base_resolves_across_two_stores() {
        let (_dir_t, target_store) = temp_store();
        let (_dir_s, source_store) = temp_store();

        // Shared root lives only in the target store; each side's tip lives
        // only in its own store.
        let root = write_snap(&target_store, &[], "2026-01-01T00:00:00Z");
        let ours = write_snap(&target_store, &[&root], "2026-01-01T00:01:00Z");

        let parent_ids = vec![root.clone()];
        let manifest_hash = "0".repeat(64);
        let theirs = compute_snapshot_id(&manifest_hash, &parent_ids, "", "", "2026-01-01T00:02:00Z");
        source_store
            .write_snapshot_meta(&SnapshotMeta {
                id: theirs.clone(),
                workspace_id: "ws-other".to_owned(),
                manifest_hash,
                parent_snapshot_ids: parent_ids,
                created_at: "2026-01-01T00:02:00Z".to_owned(),
                ..SnapshotMeta::default()
            })
            .unwrap();

        let src = SnapshotSource::pair(&target_store, &source_store);
        assert_eq!(merge_base(&src, &ours, &theirs).unwrap(), root);
    }
}
