//! Project and workspace configuration.
//!
//! Two layers, deliberately separate:
//!
//! - **Machine state** (JSON): the project marker `.warren/project.json` and
//!   per-workspace `.warren/config.json` holding the workspace's identity and
//!   its mutable position in the snapshot DAG (`current_snapshot_id`,
//!   `base_snapshot_id`). State is loaded, mutated, and persisted within the
//!   scope of one operation — the engine holds no process-wide singletons.
//! - **User config** (`warren.toml` at the project root): author identity and
//!   remote backend selection. Missing file means all defaults; unknown
//!   fields are rejected.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::store::{PROJECT_FILE, STATE_DIR, atomic_write_file};

/// Name of the user-editable project config file.
pub const PROJECT_CONFIG_FILE: &str = "warren.toml";

/// Name of the per-workspace state file under [`STATE_DIR`].
pub const WORKSPACE_CONFIG_FILE: &str = "config.json";

/// Name of the per-workspace stat cache file under [`STATE_DIR`].
pub const STAT_CACHE_FILE: &str = "stat-cache.json";

// ---------------------------------------------------------------------------
// Machine state
// ---------------------------------------------------------------------------

/// The project marker stored at `.warren/project.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Stable project ID.
    pub project_id: String,
    /// Human-facing project name.
    pub project_name: String,
    /// Creation time, RFC 3339 UTC.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

impl ProjectMeta {
    /// Load the project marker from a project root.
    pub fn load_at(project_root: &Path) -> Result<Self> {
        let path = project_root.join(STATE_DIR).join(PROJECT_FILE);
        let data = fs::read(&path).map_err(|e| EngineError::Config {
            path: path.clone(),
            detail: format!("failed to read: {e}"),
        })?;
        serde_json::from_slice(&data).map_err(|e| EngineError::Config {
            path,
            detail: format!("invalid project JSON: {e}"),
        })
    }

    /// Write the project marker under `project_root`.
    pub fn save_at(&self, project_root: &Path) -> Result<()> {
        let dir = project_root.join(STATE_DIR);
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::io(format!("failed to create {}", dir.display()), e))?;
        let data = serde_json::to_vec_pretty(self).map_err(|e| EngineError::Config {
            path: dir.join(PROJECT_FILE),
            detail: format!("failed to serialize: {e}"),
        })?;
        atomic_write_file(&dir.join(PROJECT_FILE), &data)
    }
}

/// Per-workspace state: identity plus the workspace's mutable position in
/// the snapshot DAG. The only mutable entity in the data model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Owning project ID.
    pub project_id: String,
    /// Stable workspace ID (`ws-<hex>`).
    pub workspace_id: String,
    /// Workspace name; doubles as the exported git branch name.
    pub workspace_name: String,
    /// Fork-point snapshot this workspace was created from, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_snapshot_id: String,
    /// Current head snapshot, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_snapshot_id: String,
}

impl WorkspaceConfig {
    /// Load workspace state from a workspace root.
    pub fn load_at(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join(STATE_DIR).join(WORKSPACE_CONFIG_FILE);
        let data = fs::read(&path).map_err(|e| EngineError::Config {
            path: path.clone(),
            detail: format!("failed to read: {e}"),
        })?;
        serde_json::from_slice(&data).map_err(|e| EngineError::Config {
            path,
            detail: format!("invalid workspace JSON: {e}"),
        })
    }

    /// Write workspace state under `workspace_root`.
    pub fn save_at(&self, workspace_root: &Path) -> Result<()> {
        let dir = workspace_root.join(STATE_DIR);
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::io(format!("failed to create {}", dir.display()), e))?;
        let data = serde_json::to_vec_pretty(self).map_err(|e| EngineError::Config {
            path: dir.join(WORKSPACE_CONFIG_FILE),
            detail: format!("failed to serialize: {e}"),
        })?;
        atomic_write_file(&dir.join(WORKSPACE_CONFIG_FILE), &data)
    }

    /// True if a workspace is initialized at `root`.
    #[must_use]
    pub fn exists_at(root: &Path) -> bool {
        root.join(STATE_DIR).join(WORKSPACE_CONFIG_FILE).is_file()
    }
}

/// Path of a workspace's stat cache file.
#[must_use]
pub fn stat_cache_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(STATE_DIR).join(STAT_CACHE_FILE)
}

// ---------------------------------------------------------------------------
// User config (warren.toml)
// ---------------------------------------------------------------------------

/// Top-level user configuration, parsed from `warren.toml` at the project
/// root. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Snapshot author identity.
    #[serde(default)]
    pub author: AuthorConfig,

    /// Remote backend settings.
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl ProjectConfig {
    /// Load `warren.toml` from a project root.
    pub fn load_at(project_root: &Path) -> Result<Self> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(EngineError::Config {
                    path,
                    detail: format!("failed to read: {e}"),
                });
            }
        };
        toml::from_str(&content).map_err(|e| EngineError::Config {
            path,
            detail: e.to_string(),
        })
    }
}

/// Author identity recorded on snapshots made by a human.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorConfig {
    /// Author name.
    #[serde(default)]
    pub name: String,
    /// Author email.
    #[serde(default)]
    pub email: String,
}

impl AuthorConfig {
    /// True when neither name nor email is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }
}

/// Remote backend settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Which backend handles push/pull/sync.
    #[serde(default)]
    pub backend: BackendKind,
    /// Git remote name (default: `"origin"`).
    #[serde(default = "default_remote_name")]
    pub name: String,
    /// Repository slug (`owner/repo`) for hosted backends.
    #[serde(default)]
    pub repo: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            name: default_remote_name(),
            repo: String::new(),
        }
    }
}

fn default_remote_name() -> String {
    "origin".to_owned()
}

/// The remote backend kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local git repository only — export, no remote.
    #[default]
    Git,
    /// Git repository synced with a GitHub remote.
    Github,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::Github => write!(f, "github"),
        }
    }
}

// ---------------------------------------------------------------------------
// ID and timestamp helpers
// ---------------------------------------------------------------------------

/// Generate a fresh workspace ID (`ws-<16 hex>`).
#[must_use]
pub fn generate_workspace_id() -> String {
    format!("ws-{}", random_hex(8))
}

/// Generate a fresh project ID (`proj-<16 hex>`).
#[must_use]
pub fn generate_project_id() -> String {
    format!("proj-{}", random_hex(8))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

/// The current time as an RFC 3339 UTC string (second precision), the
/// timestamp format used in all persisted records.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
