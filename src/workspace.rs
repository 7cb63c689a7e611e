//! Workspace lifecycle: init, snapshot creation, restore.
//!
//! A [`Workspace`] is a mutable pointer into the snapshot DAG: its state
//! (`current_snapshot_id`, `base_snapshot_id`) is loaded from disk when the
//! workspace is opened, mutated only by the operation that owns it, and
//! persisted before the operation returns. Callers serialize access per
//! workspace externally.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{
    self, AuthorConfig, ProjectMeta, WorkspaceConfig, now_rfc3339, stat_cache_path,
};
use crate::error::{EngineError, Result};
use crate::manifest::{EntryType, Manifest};
use crate::stat_cache::StatCache;
use crate::store::{STATE_DIR, SnapshotMeta, Store, WorkspaceInfo, compute_snapshot_id};

/// Who is making a snapshot: a human author, an agent, or anonymous.
#[derive(Clone, Debug, Default)]
pub struct SnapshotIdentity {
    /// Human author name, if any.
    pub author_name: String,
    /// Human author email, if any.
    pub author_email: String,
    /// Agent name, when the snapshot was produced by an AI agent.
    pub agent: String,
}

impl SnapshotIdentity {
    /// Identity from the project's configured author.
    #[must_use]
    pub fn from_author(author: &AuthorConfig) -> Self {
        Self {
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            agent: String::new(),
        }
    }

    /// Identity for a named agent.
    #[must_use]
    pub fn agent(name: &str) -> Self {
        Self {
            author_name: String::new(),
            author_email: String::new(),
            agent: name.to_owned(),
        }
    }
}

/// An opened workspace: root directory, loaded state, and the shared store.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    cfg: WorkspaceConfig,
    store: Store,
}

/// Initialize a new project at `root`: marker, store directories.
pub fn init_project(root: &Path, project_name: &str) -> Result<ProjectMeta> {
    let meta = ProjectMeta {
        project_id: config::generate_project_id(),
        project_name: project_name.to_owned(),
        created_at: now_rfc3339(),
    };
    meta.save_at(root)?;
    Store::open_at(root).ensure_dirs()?;
    info!(project = project_name, id = %meta.project_id, "initialized project");
    Ok(meta)
}

impl Workspace {
    /// Open an existing workspace rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let cfg = WorkspaceConfig::load_at(root)?;
        let store = Store::open_from_workspace(root);
        store.ensure_dirs()?;
        Ok(Self {
            root: root.to_path_buf(),
            cfg,
            store,
        })
    }

    /// Initialize a new workspace directory under a project.
    ///
    /// `base_snapshot_id` records the fork point when the workspace starts
    /// from existing history; pass `""` for a fresh workspace.
    pub fn init(
        root: &Path,
        project_id: &str,
        workspace_name: &str,
        base_snapshot_id: &str,
    ) -> Result<Self> {
        if WorkspaceConfig::exists_at(root) {
            return Err(EngineError::Config {
                path: root.join(STATE_DIR),
                detail: format!("workspace already initialized at {}", root.display()),
            });
        }
        fs::create_dir_all(root)
            .map_err(|e| EngineError::io(format!("failed to create {}", root.display()), e))?;

        let cfg = WorkspaceConfig {
            project_id: project_id.to_owned(),
            workspace_id: config::generate_workspace_id(),
            workspace_name: workspace_name.to_owned(),
            base_snapshot_id: base_snapshot_id.to_owned(),
            current_snapshot_id: base_snapshot_id.to_owned(),
        };
        cfg.save_at(root)?;

        let store = Store::open_from_workspace(root);
        store.ensure_dirs()?;
        store.register_workspace(WorkspaceInfo {
            workspace_id: cfg.workspace_id.clone(),
            workspace_name: cfg.workspace_name.clone(),
            path: root.to_path_buf(),
            current_snapshot_id: cfg.current_snapshot_id.clone(),
            base_snapshot_id: cfg.base_snapshot_id.clone(),
            created_at: now_rfc3339(),
        })?;
        info!(workspace = workspace_name, id = %cfg.workspace_id, "initialized workspace");

        Ok(Self {
            root: root.to_path_buf(),
            cfg,
            store,
        })
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The workspace's loaded state.
    #[must_use]
    pub const fn config(&self) -> &WorkspaceConfig {
        &self.cfg
    }

    /// The shared store this workspace resolves against.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The current head snapshot ID, falling back to the newest stored
    /// snapshot for this workspace when the head pointer is unset.
    pub fn head(&self) -> Result<Option<String>> {
        if !self.cfg.current_snapshot_id.is_empty() {
            return Ok(Some(self.cfg.current_snapshot_id.clone()));
        }
        self.store
            .latest_snapshot_for_workspace(&self.cfg.workspace_id)
    }

    /// Create a snapshot of the workspace's current tree.
    ///
    /// Does a full hashing pass (the stat cache is rebuilt from the result,
    /// not consulted), stores new blobs and the manifest, derives the
    /// content-addressed snapshot ID, and advances the workspace head.
    ///
    /// Idempotent: when the tree is unchanged from the current head, the head
    /// snapshot is returned and nothing new is written.
    pub fn create_snapshot(
        &mut self,
        message: &str,
        identity: &SnapshotIdentity,
    ) -> Result<SnapshotMeta> {
        let parents = match self.head()? {
            Some(head) => vec![head],
            None => Vec::new(),
        };
        self.create_snapshot_with_parents(message, identity, parents)
    }

    /// Create a snapshot with explicit parents (used by merge resolution to
    /// record two-parent merge snapshots).
    pub fn create_snapshot_with_parents(
        &mut self,
        message: &str,
        identity: &SnapshotIdentity,
        parents: Vec<String>,
    ) -> Result<SnapshotMeta> {
        let manifest = Manifest::generate(&self.root)?;
        let manifest_hash = manifest.hash()?;

        // Unchanged tree relative to a single parent head: reuse it.
        if let [single] = parents.as_slice()
            && let Ok(head_meta) = self.store.load_snapshot_meta(single)
            && head_meta.manifest_hash == manifest_hash
        {
            debug!(snapshot = %single, "tree unchanged, reusing head snapshot");
            return Ok(head_meta);
        }

        self.store.write_manifest(&manifest)?;
        for f in manifest.file_entries() {
            if self.store.blob_exists(&f.hash) {
                continue;
            }
            let content = fs::read(self.root.join(&f.path))
                .map_err(|e| EngineError::io(format!("failed to read {}", f.path), e))?;
            self.store.write_blob(&f.hash, &content)?;
        }

        let created_at = now_rfc3339();
        let id = compute_snapshot_id(
            &manifest_hash,
            &parents,
            &identity.author_name,
            &identity.author_email,
            &created_at,
        );
        let meta = SnapshotMeta {
            id: id.clone(),
            workspace_id: self.cfg.workspace_id.clone(),
            workspace_name: self.cfg.workspace_name.clone(),
            manifest_hash,
            parent_snapshot_ids: parents,
            author_name: identity.author_name.clone(),
            author_email: identity.author_email.clone(),
            agent: identity.agent.clone(),
            message: message.to_owned(),
            created_at,
            files: manifest.file_count(),
            size: manifest.total_size(),
        };
        self.store.write_snapshot_meta(&meta)?;

        self.advance_head(&id)?;
        if self.cfg.base_snapshot_id.is_empty() {
            self.cfg.base_snapshot_id = id.clone();
            self.cfg.save_at(&self.root)?;
        }

        StatCache::rebuild_from_manifest(&self.root, &manifest, &stat_cache_path(&self.root));
        info!(snapshot = %id, files = meta.files, "created snapshot");
        Ok(meta)
    }

    /// Point the workspace head at `snapshot_id`, persisting state and the
    /// project registry.
    pub fn advance_head(&mut self, snapshot_id: &str) -> Result<()> {
        self.cfg.current_snapshot_id = snapshot_id.to_owned();
        self.cfg.save_at(&self.root)?;
        self.store.register_workspace(WorkspaceInfo {
            workspace_id: self.cfg.workspace_id.clone(),
            workspace_name: self.cfg.workspace_name.clone(),
            path: self.root.clone(),
            current_snapshot_id: snapshot_id.to_owned(),
            base_snapshot_id: self.cfg.base_snapshot_id.clone(),
            created_at: String::new(),
        })
    }

    /// Restore the workspace tree to a snapshot's content and move the head
    /// there.
    pub fn restore(&mut self, snapshot_id: &str) -> Result<()> {
        let manifest = self.store.load_manifest_for_snapshot(snapshot_id)?;
        materialize_manifest(&self.root, &self.store, &manifest)?;
        self.advance_head(snapshot_id)?;
        StatCache::rebuild_from_manifest(&self.root, &manifest, &stat_cache_path(&self.root));
        Ok(())
    }

    /// Generate the manifest of the live tree, stat-cache accelerated.
    pub fn current_manifest(&self) -> Result<Manifest> {
        Manifest::generate_with_cache(&self.root, &stat_cache_path(&self.root))
    }
}

/// Materialize a manifest into `root` from the store's blobs: files not in
/// the manifest are removed (never touching `.git` or `.warren`), then every
/// entry is written with its recorded mode.
pub fn materialize_manifest(root: &Path, store: &Store, manifest: &Manifest) -> Result<()> {
    let should_exist: std::collections::HashSet<&str> =
        manifest.entries.iter().map(|e| e.path.as_str()).collect();

    // Remove files that shouldn't exist.
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let rel = match path.strip_prefix(root) {
                Ok(r) => r.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if rel.starts_with(".git") || rel.starts_with(STATE_DIR) {
                continue;
            }
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if meta.is_dir() {
                stack.push(path);
            } else if !should_exist.contains(rel.as_str()) {
                let _ = fs::remove_file(&path);
            }
        }
    }

    // Entries are sorted by path, so parent directories come first.
    for entry in &manifest.entries {
        let target_path = root.join(&entry.path);
        match entry.entry_type {
            EntryType::Dir => {
                fs::create_dir_all(&target_path).map_err(|e| {
                    EngineError::io(format!("failed to create {}", target_path.display()), e)
                })?;
            }
            EntryType::File => {
                if let Some(parent) = target_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        EngineError::io(format!("failed to create {}", parent.display()), e)
                    })?;
                }
                let content = store.read_blob(&entry.hash)?;
                fs::write(&target_path, content).map_err(|e| {
                    EngineError::io(format!("failed to write {}", target_path.display()), e)
                })?;
                set_mode(&target_path, entry.mode);
            }
            EntryType::Symlink => {
                let _ = fs::remove_file(&target_path);
                if let Some(target) = &entry.target {
                    make_symlink(target, &target_path)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| EngineError::io(format!("failed to create symlink {}", link.display()), e))
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, link: &Path) -> Result<()> {
    Err(EngineError::io(
        format!("symlinks unsupported on this platform: {}", link.display()),
        std::io::Error::from(std::io::ErrorKind::Unsupported),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_workspace(name: &str) -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let project = init_project(dir.path(), "demo").unwrap();
        let ws_root = dir.path().join(name);
        let ws = Workspace::init(&ws_root, &project.project_id, name, "").unwrap();
        (dir, ws)
    }

    #[test]
    fn init_registers_workspace_in_project() {
        let (_dir, ws) = project_with_workspace("agent-1");
        let listed = ws.store().list_workspaces().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].workspace_name, "agent-1");
    }

    #[test]
    fn double_init_fails() {
        let (dir, ws) = project_with_workspace("agent-1");
        let err = Workspace::init(ws.root(), "p", "agent-1", "").unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
        drop(dir);
    }

    #[test]
    fn snapshot_advances_head_and_sets_base() {
        let (_dir, mut ws) = project_with_workspace("agent-1");
        fs::write(ws.root().join("a.txt"), "hello").unwrap();

        let snap = ws
            .create_snapshot("first", &SnapshotIdentity::agent("robo"))
            .unwrap();
        assert!(snap.parent_snapshot_ids.is_empty());
        assert_eq!(ws.config().current_snapshot_id, snap.id);
        assert_eq!(ws.config().base_snapshot_id, snap.id);
        assert_eq!(snap.agent, "robo");

        // Registry tracks the new head too.
        let info = ws.store().find_workspace_by_name("agent-1").unwrap();
        assert_eq!(info.current_snapshot_id, snap.id);
    }

    #[test]
    fn snapshot_of_unchanged_tree_reuses_head() {
        let (_dir, mut ws) = project_with_workspace("agent-1");
        fs::write(ws.root().join("a.txt"), "hello").unwrap();

        let first = ws
            .create_snapshot("first", &SnapshotIdentity::default())
            .unwrap();
        let second = ws
            .create_snapshot("no-op", &SnapshotIdentity::default())
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ws.store().list_snapshot_ids().unwrap().len(), 1);
    }

    #[test]
    fn successive_snapshots_chain_parents() {
        let (_dir, mut ws) = project_with_workspace("agent-1");
        fs::write(ws.root().join("a.txt"), "v1").unwrap();
        let s1 = ws.create_snapshot("v1", &SnapshotIdentity::default()).unwrap();

        fs::write(ws.root().join("a.txt"), "v2").unwrap();
        let s2 = ws.create_snapshot("v2", &SnapshotIdentity::default()).unwrap();

        assert_eq!(s2.parent_snapshot_ids, vec![s1.id.clone()]);
        // Base stays at the fork point.
        assert_eq!(ws.config().base_snapshot_id, s1.id);
    }

    #[test]
    fn restore_rolls_tree_and_head_back() {
        let (_dir, mut ws) = project_with_workspace("agent-1");
        fs::write(ws.root().join("a.txt"), "v1").unwrap();
        fs::write(ws.root().join("keep.txt"), "kept").unwrap();
        let s1 = ws.create_snapshot("v1", &SnapshotIdentity::default()).unwrap();

        fs::write(ws.root().join("a.txt"), "v2").unwrap();
        fs::write(ws.root().join("extra.txt"), "extra").unwrap();
        ws.create_snapshot("v2", &SnapshotIdentity::default()).unwrap();

        ws.restore(&s1.id).unwrap();
        assert_eq!(fs::read_to_string(ws.root().join("a.txt")).unwrap(), "v1");
        assert_eq!(fs::read_to_string(ws.root().join("keep.txt")).unwrap(), "kept");
        assert!(!ws.root().join("extra.txt").exists());
        assert_eq!(ws.config().current_snapshot_id, s1.id);
    }

    #[test]
    fn materialize_preserves_state_dirs() {
        let (_dir, mut ws) = project_with_workspace("agent-1");
        fs::write(ws.root().join("a.txt"), "v1").unwrap();
        let s1 = ws.create_snapshot("v1", &SnapshotIdentity::default()).unwrap();
        ws.restore(&s1.id).unwrap();
        assert!(WorkspaceConfig::exists_at(ws.root()));
    }

    #[test]
    fn snapshots_from_two_workspaces_share_the_project_store() {
        let dir = tempfile::tempdir().unwrap();
        let project = init_project(dir.path(), "demo").unwrap();
        let mut a = Workspace::init(&dir.path().join("a"), &project.project_id, "a", "").unwrap();
        let mut b = Workspace::init(&dir.path().join("b"), &project.project_id, "b", "").unwrap();

        fs::write(a.root().join("f.txt"), "from a").unwrap();
        let sa = a.create_snapshot("a", &SnapshotIdentity::default()).unwrap();
        fs::write(b.root().join("f.txt"), "from b").unwrap();
        let sb = b.create_snapshot("b", &SnapshotIdentity::default()).unwrap();

        // Both snapshot records resolve through either workspace's store.
        assert!(a.store().snapshot_exists(&sb.id));
        assert!(b.store().snapshot_exists(&sa.id));
    }
}
