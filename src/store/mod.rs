//! The shared project store: snapshots, manifests, and blobs.
//!
//! All workspaces under one project share a single content-addressed store
//! under `<project>/.warren/`. Workspaces that predate the shared store (or
//! run standalone) carry their own store in the workspace directory —
//! [`Store::open_from_workspace`] resolves whichever location applies, and
//! DAG traversal code accepts a pair of stores so snapshots remain
//! addressable from either historical location.

mod registry;
mod snapshot;

pub use registry::WorkspaceInfo;
pub use snapshot::{SnapshotMeta, compute_snapshot_id, is_content_addressed_id, verify_snapshot_id};

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::manifest::Manifest;

/// Name of the state directory holding the store and all machine state.
pub const STATE_DIR: &str = ".warren";

/// File inside [`STATE_DIR`] that marks a project root.
pub const PROJECT_FILE: &str = "project.json";

/// Typed access to one store location (snapshots, manifests, blobs).
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
    snapshots_dir: PathBuf,
    manifests_dir: PathBuf,
    blobs_dir: PathBuf,
}

impl Store {
    /// Open the store rooted at the given project (or standalone workspace)
    /// directory. Does not touch the filesystem.
    #[must_use]
    pub fn open_at(root: &Path) -> Self {
        let base = root.join(STATE_DIR);
        Self {
            root: root.to_path_buf(),
            snapshots_dir: base.join("snapshots"),
            manifests_dir: base.join("manifests"),
            blobs_dir: base.join("blobs"),
        }
    }

    /// Open the store for a workspace by walking up to the containing
    /// project root. Falls back to the workspace directory itself when no
    /// project marker is found (standalone mode).
    #[must_use]
    pub fn open_from_workspace(workspace_root: &Path) -> Self {
        find_project_root(workspace_root)
            .map_or_else(|| Self::open_at(workspace_root), |root| Self::open_at(&root))
    }

    /// The directory this store is rooted at.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshots directory.
    #[must_use]
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    /// Create the snapshots/manifests/blobs directories if needed.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.snapshots_dir, &self.manifests_dir, &self.blobs_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| EngineError::io(format!("failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }

    // -- blobs ------------------------------------------------------------

    /// Read a blob's content by hash.
    pub fn read_blob(&self, hash: &str) -> Result<Vec<u8>> {
        if hash.is_empty() {
            return Err(EngineError::NotFound {
                kind: "blob",
                id: "(empty hash)".to_owned(),
            });
        }
        fs::read(self.blobs_dir.join(hash)).map_err(|_| EngineError::NotFound {
            kind: "blob",
            id: hash.to_owned(),
        })
    }

    /// Write content to the blob store under the given hash. Content-addressed:
    /// an existing blob is left untouched.
    pub fn write_blob(&self, hash: &str, content: &[u8]) -> Result<()> {
        if hash.is_empty() {
            return Err(EngineError::NotFound {
                kind: "blob",
                id: "(empty hash)".to_owned(),
            });
        }
        let path = self.blobs_dir.join(hash);
        if path.exists() {
            return Ok(());
        }
        fs::write(&path, content)
            .map_err(|e| EngineError::io(format!("failed to write blob {hash}"), e))
    }

    /// Check whether a blob exists.
    #[must_use]
    pub fn blob_exists(&self, hash: &str) -> bool {
        self.blobs_dir.join(hash).exists()
    }

    // -- manifests --------------------------------------------------------

    /// Read and parse a manifest by content hash.
    pub fn load_manifest(&self, hash: &str) -> Result<Manifest> {
        let data = self.load_manifest_json(hash)?;
        Manifest::from_json(&data).map_err(|_| EngineError::Corrupt {
            kind: "manifest",
            id: hash.to_owned(),
            detail: "invalid manifest JSON".to_owned(),
        })
    }

    /// Read a manifest's raw canonical JSON by content hash.
    pub fn load_manifest_json(&self, hash: &str) -> Result<Vec<u8>> {
        if hash.is_empty() {
            return Err(EngineError::NotFound {
                kind: "manifest",
                id: "(empty hash)".to_owned(),
            });
        }
        fs::read(self.manifests_dir.join(format!("{hash}.json"))).map_err(|_| {
            EngineError::NotFound {
                kind: "manifest",
                id: hash.to_owned(),
            }
        })
    }

    /// Serialize and store a manifest, returning its content hash. Skips the
    /// write when the hash already exists.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<String> {
        let hash = manifest.hash()?;
        let path = self.manifests_dir.join(format!("{hash}.json"));
        if path.exists() {
            return Ok(hash);
        }
        atomic_write_file(&path, &manifest.to_canonical_json()?)?;
        Ok(hash)
    }

    /// Check whether a manifest exists.
    #[must_use]
    pub fn manifest_exists(&self, hash: &str) -> bool {
        self.manifests_dir.join(format!("{hash}.json")).exists()
    }
}

/// Walk up from `start` looking for a directory containing
/// `.warren/project.json`.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(STATE_DIR).join(PROJECT_FILE).is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Write `data` to `path` atomically: temp file in the same directory,
/// fsync, then rename. Partial writes never replace existing content.
pub fn atomic_write_file(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".warren-tmp-")
        .tempfile_in(dir)
        .map_err(|e| EngineError::io(format!("failed to create temp file in {}", dir.display()), e))?;
    tmp.write_all(data)
        .map_err(|e| EngineError::io("failed to write temp file".to_owned(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| EngineError::io("failed to sync temp file".to_owned(), e))?;
    tmp.persist(path)
        .map_err(|e| EngineError::io(format!("failed to rename into {}", path.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;

    #[test]
    fn blob_round_trip_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        store.ensure_dirs().unwrap();

        let content = b"blob payload";
        let h = hash::hash_bytes(content);
        store.write_blob(&h, content).unwrap();
        assert!(store.blob_exists(&h));
        assert_eq!(store.read_blob(&h).unwrap(), content);

        let missing = store.read_blob("0000").unwrap_err();
        assert!(missing.is_not_found());
    }

    #[test]
    fn write_blob_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        store.ensure_dirs().unwrap();
        let h = hash::hash_bytes(b"x");
        store.write_blob(&h, b"x").unwrap();
        store.write_blob(&h, b"x").unwrap();
        assert_eq!(store.read_blob(&h).unwrap(), b"x");
    }

    #[test]
    fn manifest_round_trip_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        store.ensure_dirs().unwrap();

        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("a.txt"), "alpha").unwrap();
        let m = Manifest::generate(tree.path()).unwrap();

        let h = store.write_manifest(&m).unwrap();
        assert_eq!(h, m.hash().unwrap());
        assert!(store.manifest_exists(&h));
        assert_eq!(store.load_manifest(&h).unwrap(), m);
    }

    #[test]
    fn find_project_root_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        let ws = project.join("agent-1").join("deep");
        fs::create_dir_all(&ws).unwrap();
        fs::create_dir_all(project.join(STATE_DIR)).unwrap();
        fs::write(project.join(STATE_DIR).join(PROJECT_FILE), b"{}").unwrap();

        assert_eq!(find_project_root(&ws).unwrap(), project);
        assert!(find_project_root(dir.path()).is_none());
    }

    #[test]
    fn open_from_workspace_falls_back_to_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_from_workspace(dir.path());
        assert_eq!(store.root(), dir.path());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write_file(&path, b"one").unwrap();
        atomic_write_file(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }
}
