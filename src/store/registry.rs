//! Project-level workspace registry.
//!
//! Each workspace is recorded as a separate JSON file under
//! `.warren/workspaces/<workspace-id>.json`, so concurrent updates from
//! different workspaces never contend on a shared file. Registration uses
//! upsert-merge semantics: empty fields in the incoming record never clobber
//! existing values.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Store, atomic_write_file};
use crate::error::{EngineError, Result};

/// A workspace registered in the project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    /// Stable workspace ID (`ws-<hex>`).
    pub workspace_id: String,
    /// Human-facing workspace name; also the exported branch name.
    pub workspace_name: String,
    /// Absolute path of the workspace directory.
    pub path: PathBuf,
    /// The workspace's current head snapshot, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_snapshot_id: String,
    /// The fork-point snapshot this workspace was created from, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_snapshot_id: String,
    /// Registration time, RFC 3339 UTC.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

impl Store {
    fn workspaces_dir(&self) -> PathBuf {
        self.root().join(super::STATE_DIR).join("workspaces")
    }

    fn workspace_file(&self, workspace_id: &str) -> PathBuf {
        self.workspaces_dir().join(format!("{workspace_id}.json"))
    }

    fn load_workspace_file(&self, workspace_id: &str) -> Result<WorkspaceInfo> {
        let path = self.workspace_file(workspace_id);
        let data = fs::read(&path).map_err(|_| EngineError::NotFound {
            kind: "workspace",
            id: workspace_id.to_owned(),
        })?;
        serde_json::from_slice(&data).map_err(|e| EngineError::Corrupt {
            kind: "workspace",
            id: workspace_id.to_owned(),
            detail: format!("invalid registry JSON: {e}"),
        })
    }

    fn save_workspace_file(&self, info: &WorkspaceInfo) -> Result<()> {
        let dir = self.workspaces_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::io(format!("failed to create {}", dir.display()), e))?;
        let data = serde_json::to_vec_pretty(info).map_err(|e| EngineError::Corrupt {
            kind: "workspace",
            id: info.workspace_id.clone(),
            detail: format!("failed to serialize: {e}"),
        })?;
        atomic_write_file(&self.workspace_file(&info.workspace_id), &data)
    }

    /// Upsert a workspace entry by ID. Empty incoming fields preserve
    /// whatever the registry already holds.
    pub fn register_workspace(&self, info: WorkspaceInfo) -> Result<()> {
        let mut merged = match self.load_workspace_file(&info.workspace_id) {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => return self.save_workspace_file(&info),
            Err(e) => return Err(e),
        };
        if !info.workspace_name.is_empty() {
            merged.workspace_name = info.workspace_name;
        }
        if !info.path.as_os_str().is_empty() {
            merged.path = info.path;
        }
        if !info.current_snapshot_id.is_empty() {
            merged.current_snapshot_id = info.current_snapshot_id;
        }
        if !info.base_snapshot_id.is_empty() {
            merged.base_snapshot_id = info.base_snapshot_id;
        }
        if !info.created_at.is_empty() {
            merged.created_at = info.created_at;
        }
        self.save_workspace_file(&merged)
    }

    /// Point a registered workspace's head at a new snapshot.
    pub fn update_workspace_head(&self, workspace_id: &str, snapshot_id: &str) -> Result<()> {
        let mut info = self.load_workspace_file(workspace_id)?;
        info.current_snapshot_id = snapshot_id.to_owned();
        self.save_workspace_file(&info)
    }

    /// Find a registered workspace by name.
    pub fn find_workspace_by_name(&self, name: &str) -> Result<WorkspaceInfo> {
        for info in self.list_workspaces()? {
            if info.workspace_name == name {
                return Ok(info);
            }
        }
        Err(EngineError::NotFound {
            kind: "workspace",
            id: name.to_owned(),
        })
    }

    /// Find a registered workspace by ID.
    pub fn find_workspace_by_id(&self, workspace_id: &str) -> Result<WorkspaceInfo> {
        self.load_workspace_file(workspace_id)
    }

    /// List all registered workspaces, sorted by name.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        let entries = match fs::read_dir(self.workspaces_dir()) {
            Ok(e) => e,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::io("failed to read workspace registry".to_owned(), e));
            }
        };
        let mut result = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| EngineError::io("failed to read workspace registry".to_owned(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            match self.load_workspace_file(id) {
                Ok(info) => result.push(info),
                // A half-written registry entry shouldn't take down listing.
                Err(e) => tracing::warn!(workspace = id, error = %e, "skipping unreadable registry entry"),
            }
        }
        result.sort_by(|a, b| a.workspace_name.cmp(&b.workspace_name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, name: &str) -> WorkspaceInfo {
        WorkspaceInfo {
            workspace_id: id.to_owned(),
            workspace_name: name.to_owned(),
            path: PathBuf::from(format!("/tmp/{name}")),
            ..WorkspaceInfo::default()
        }
    }

    #[test]
    fn register_then_find_by_name_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        store.register_workspace(info("ws-a", "alpha")).unwrap();
        store.register_workspace(info("ws-b", "beta")).unwrap();

        assert_eq!(
            store.find_workspace_by_name("alpha").unwrap().workspace_id,
            "ws-a"
        );
        assert_eq!(
            store.find_workspace_by_id("ws-b").unwrap().workspace_name,
            "beta"
        );
        assert!(store.find_workspace_by_name("gamma").unwrap_err().is_not_found());
    }

    #[test]
    fn upsert_preserves_existing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());

        let mut first = info("ws-a", "alpha");
        first.current_snapshot_id = "head-1".to_owned();
        first.base_snapshot_id = "base-1".to_owned();
        store.register_workspace(first).unwrap();

        // Re-register with only a head update; base must survive.
        let mut update = info("ws-a", String::new().as_str());
        update.path = PathBuf::new();
        update.current_snapshot_id = "head-2".to_owned();
        store.register_workspace(update).unwrap();

        let loaded = store.find_workspace_by_id("ws-a").unwrap();
        assert_eq!(loaded.workspace_name, "alpha");
        assert_eq!(loaded.current_snapshot_id, "head-2");
        assert_eq!(loaded.base_snapshot_id, "base-1");
    }

    #[test]
    fn update_head_requires_registration() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        assert!(store.update_workspace_head("ws-x", "s1").unwrap_err().is_not_found());

        store.register_workspace(info("ws-x", "x")).unwrap();
        store.update_workspace_head("ws-x", "s1").unwrap();
        assert_eq!(
            store.find_workspace_by_id("ws-x").unwrap().current_snapshot_id,
            "s1"
        );
    }

    #[test]
    fn list_is_sorted_by_name_and_empty_when_unused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path());
        assert!(store.list_workspaces().unwrap().is_empty());

        store.register_workspace(info("ws-2", "zeta")).unwrap();
        store.register_workspace(info("ws-1", "alpha")).unwrap();
        let names: Vec<String> = store
            .list_workspaces()
            .unwrap()
            .into_iter()
            .map(|w| w.workspace_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
