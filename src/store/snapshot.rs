//! Snapshot metadata records and content-addressed snapshot IDs.
//!
//! Snapshots are immutable, write-once records keyed by ID. The ID is
//! derived deterministically from the snapshot's identity fields, so
//! re-deriving the same logical snapshot (e.g. during a rebuild or a
//! re-import of the same git history) yields the same ID — the system's
//! idempotency anchor.

use std::fs;

use serde::{Deserialize, Serialize};

use super::{Store, atomic_write_file};
use crate::error::{EngineError, Result};
use crate::hash;

/// Snapshot metadata. The canonical snapshot record used everywhere.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Content-addressed snapshot ID (64-char hex).
    pub id: String,
    /// Owning workspace ID.
    pub workspace_id: String,
    /// Owning workspace name, for display.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_name: String,
    /// Content hash of the snapshot's manifest.
    pub manifest_hash: String,
    /// Ordered parent snapshot IDs: 0 = root, 1 = linear, 2+ = merge.
    #[serde(default)]
    pub parent_snapshot_ids: Vec<String>,
    /// Human author name, when the snapshot was made by a person.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author_name: String,
    /// Human author email.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author_email: String,
    /// Agent name, when the snapshot was made by an AI agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent: String,
    /// Snapshot message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// File count at snapshot time.
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub files: usize,
    /// Total file bytes at snapshot time.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub size: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_usize(n: &usize) -> bool {
    *n == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

/// Derive a content-addressed snapshot ID from the snapshot's identity
/// fields. Deterministic: identical inputs always produce the identical
/// 64-char lowercase hex ID. Parent order does not matter (parents are
/// sorted into the preimage).
#[must_use]
pub fn compute_snapshot_id(
    manifest_hash: &str,
    parent_snapshot_ids: &[String],
    author_name: &str,
    author_email: &str,
    created_at: &str,
) -> String {
    let mut sorted: Vec<&str> = parent_snapshot_ids
        .iter()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .collect();
    sorted.sort_unstable();

    let mut preimage = String::from("snapshot\0");
    preimage.push_str(&format!("manifest_hash {manifest_hash}\n"));
    for p in sorted {
        preimage.push_str(&format!("parent {p}\n"));
    }
    preimage.push_str(&format!("author {author_name} {author_email}\n"));
    preimage.push_str(&format!("created_at {created_at}\n"));

    hash::hash_str(&preimage)
}

/// Check whether a snapshot ID matches the content-addressed hash of its
/// identity fields. Legacy random IDs (with a `snap-` prefix) always pass.
#[must_use]
pub fn verify_snapshot_id(meta: &SnapshotMeta) -> bool {
    if !is_content_addressed_id(&meta.id) {
        return true;
    }
    meta.id
        == compute_snapshot_id(
            &meta.manifest_hash,
            &meta.parent_snapshot_ids,
            &meta.author_name,
            &meta.author_email,
            &meta.created_at,
        )
}

/// True for content-addressed snapshot IDs (64-char hex, no legacy prefix).
#[must_use]
pub fn is_content_addressed_id(id: &str) -> bool {
    id.len() == 64 && !id.starts_with("snap-")
}

impl Store {
    /// Read snapshot metadata by ID, verifying content-addressed integrity.
    pub fn load_snapshot_meta(&self, id: &str) -> Result<SnapshotMeta> {
        if id.is_empty() {
            return Err(EngineError::NotFound {
                kind: "snapshot",
                id: "(empty id)".to_owned(),
            });
        }
        let path = self.snapshots_dir().join(format!("{id}.meta.json"));
        let data = fs::read(&path).map_err(|_| EngineError::NotFound {
            kind: "snapshot",
            id: id.to_owned(),
        })?;
        let meta: SnapshotMeta = serde_json::from_slice(&data).map_err(|e| EngineError::Corrupt {
            kind: "snapshot",
            id: id.to_owned(),
            detail: format!("invalid metadata JSON: {e}"),
        })?;
        if !verify_snapshot_id(&meta) {
            return Err(EngineError::Corrupt {
                kind: "snapshot",
                id: id.to_owned(),
                detail: "ID does not match content-addressed identity fields".to_owned(),
            });
        }
        Ok(meta)
    }

    /// Write a snapshot record. Snapshots are write-once: an existing record
    /// with the same ID is left untouched (the ID is content-addressed, so
    /// an identical ID means an identical record).
    pub fn write_snapshot_meta(&self, meta: &SnapshotMeta) -> Result<()> {
        if meta.id.is_empty() {
            return Err(EngineError::Corrupt {
                kind: "snapshot",
                id: String::new(),
                detail: "snapshot metadata missing ID".to_owned(),
            });
        }
        let path = self.snapshots_dir().join(format!("{}.meta.json", meta.id));
        if path.exists() {
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(meta).map_err(|e| EngineError::Corrupt {
            kind: "snapshot",
            id: meta.id.clone(),
            detail: format!("failed to serialize: {e}"),
        })?;
        atomic_write_file(&path, &data)
    }

    /// Check whether a snapshot record exists.
    #[must_use]
    pub fn snapshot_exists(&self, id: &str) -> bool {
        self.snapshots_dir().join(format!("{id}.meta.json")).exists()
    }

    /// List the IDs of every snapshot in this store.
    pub fn list_snapshot_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.snapshots_dir()) {
            Ok(e) => e,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::io(
                    format!("failed to read {}", self.snapshots_dir().display()),
                    e,
                ));
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| EngineError::io("failed to read snapshots dir".to_owned(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".meta.json") {
                ids.push(id.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve a snapshot ID prefix to a full ID. Errors on no match or on
    /// an ambiguous prefix.
    pub fn resolve_snapshot_prefix(&self, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            return Err(EngineError::NotFound {
                kind: "snapshot",
                id: "(empty prefix)".to_owned(),
            });
        }
        let matches: Vec<String> = self
            .list_snapshot_ids()?
            .into_iter()
            .filter(|id| id.starts_with(prefix))
            .collect();
        match matches.len() {
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            0 => Err(EngineError::NotFound {
                kind: "snapshot",
                id: prefix.to_owned(),
            }),
            _ => Err(EngineError::Corrupt {
                kind: "snapshot",
                id: prefix.to_owned(),
                detail: format!("ambiguous prefix: {}", matches.join(", ")),
            }),
        }
    }

    /// The most recent snapshot ID for a workspace (by `created_at`), or
    /// `None` when the workspace has no snapshots.
    pub fn latest_snapshot_for_workspace(&self, workspace_id: &str) -> Result<Option<String>> {
        let mut latest: Option<(String, String)> = None;
        for id in self.list_snapshot_ids()? {
            let Ok(meta) = self.load_snapshot_meta(&id) else {
                continue;
            };
            if !workspace_id.is_empty() && meta.workspace_id != workspace_id {
                continue;
            }
            if latest.as_ref().is_none_or(|(t, _)| meta.created_at > *t) {
                latest = Some((meta.created_at.clone(), meta.id));
            }
        }
        Ok(latest.map(|(_, id)| id))
    }

    /// Resolve a snapshot ID to its manifest hash.
    pub fn manifest_hash_for_snapshot(&self, id: &str) -> Result<String> {
        let meta = self.load_snapshot_meta(id)?;
        if meta.manifest_hash.is_empty() {
            return Err(EngineError::Corrupt {
                kind: "snapshot",
                id: id.to_owned(),
                detail: "metadata missing manifest hash".to_owned(),
            });
        }
        Ok(meta.manifest_hash)
    }

    /// Load the manifest a snapshot points at.
    pub fn load_manifest_for_snapshot(&self, id: &str) -> Result<crate::manifest::Manifest> {
        let hash = self.manifest_hash_for_snapshot(id)?;
        self.load_manifest(&hash)
    }

    /// Walk the first-parent chain from `head_id` back to `stop_id`
    /// (inclusive), returning the chain in forward order. Stops at a root or
    /// an unloadable record; errors on a cycle.
    pub fn build_workspace_chain(&self, head_id: &str, stop_id: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = head_id.to_owned();
        loop {
            if !seen.insert(current.clone()) {
                return Err(EngineError::Corrupt {
                    kind: "snapshot",
                    id: current,
                    detail: "cycle detected in snapshot history".to_owned(),
                });
            }
            chain.push(current.clone());
            if current == stop_id {
                break;
            }
            let Ok(meta) = self.load_snapshot_meta(&current) else {
                break;
            };
            match meta.parent_snapshot_ids.first() {
                Some(parent) if !parent.is_empty() => current = parent.clone(),
                _ => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// True if `ancestor` is reachable from `start` by walking parent links
    /// (BFS over all parents). A snapshot is its own ancestor.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: &str, start: &str) -> bool {
        if ancestor.is_empty() || start.is_empty() {
            return false;
        }
        if ancestor == start {
            return true;
        }
        let mut seen = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::from([start.to_owned()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Ok(meta) = self.load_snapshot_meta(&current) else {
                continue;
            };
            for parent in &meta.parent_snapshot_ids {
                if parent.is_empty() {
                    continue;
                }
                if parent == ancestor {
                    return true;
                }
                if !seen.contains(parent) {
                    queue.push_back(parent.clone());
                }
            }
        }
        false
    }
}
