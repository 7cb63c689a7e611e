//! Error types for the warren engine.
//!
//! [`EngineError`] is the single error type returned by the core modules
//! (store, dag, conflict, drift, git bridge). It uses rich enum variants so
//! callers can match on specific failure modes (missing snapshot, push
//! rejection, divergence) without parsing error messages. The CLI layer wraps
//! these with `anyhow` context.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by warren engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A requested snapshot, manifest, or blob was not found.
    ///
    /// Always surfaced for the entity the caller asked for. Parent
    /// resolution during export/import deliberately tolerates missing
    /// parents by omission instead of raising this.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of record was missing ("snapshot", "manifest", "blob").
        kind: &'static str,
        /// The identifier that could not be resolved.
        id: String,
    },

    /// A persisted record exists but its content is invalid.
    ///
    /// Load sites for *caches* (stat cache, git mapping) degrade to an empty
    /// structure instead of returning this; it is reserved for records whose
    /// corruption cannot be papered over (snapshot metadata, manifests).
    #[error("corrupt {kind} record `{id}`: {detail}")]
    Corrupt {
        /// What kind of record was corrupt.
        kind: &'static str,
        /// The identifier of the corrupt record.
        id: String,
        /// Why it failed to load or verify.
        detail: String,
    },

    /// Two snapshot heads share no common ancestor.
    #[error("no common ancestor found between snapshots {target} and {source_head}")]
    NoCommonAncestor {
        /// The target-side head.
        target: String,
        /// The source-side head.
        source_head: String,
    },

    /// Metadata for a snapshot traversed during merge-base search could not
    /// be loaded from either workspace's store.
    #[error("missing snapshot metadata for {id} during ancestor search")]
    MissingAncestorMetadata {
        /// The snapshot whose record was unloadable.
        id: String,
    },

    /// A git subprocess exited with a failure status.
    #[error("git {command}: {stderr}")]
    Git {
        /// The git subcommand and arguments that were run.
        command: String,
        /// Captured stderr (trimmed), or the spawn error text.
        stderr: String,
    },

    /// A push was rejected by the remote (non-fast-forward).
    ///
    /// Classified separately from [`EngineError::Git`] so that sync can
    /// trigger the fetch/import/merge/retry path. Any other push failure
    /// (auth, network, missing repository) stays a plain `Git` error and is
    /// never retried.
    #[error("push rejected for '{refspec}' (non-fast-forward)")]
    PushRejected {
        /// The refspec whose push was rejected.
        refspec: String,
    },

    /// A workspace head has diverged from its remote branch and no merge
    /// callback was supplied to resolve it.
    #[error(
        "workspace '{workspace}' has diverged from remote (local {local_head}, remote {remote_head}); re-run sync with a merge resolution"
    )]
    Diverged {
        /// The diverged workspace's name.
        workspace: String,
        /// Local head snapshot ID.
        local_head: String,
        /// Remote head snapshot ID (freshly imported).
        remote_head: String,
    },

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error in '{}': {detail}", path.display())]
    Config {
        /// Path to the offending file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// An I/O error occurred, wrapped with the operation that hit it.
    #[error("{context}: {source}")]
    Io {
        /// What the engine was doing when the error occurred.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Wrap an I/O error with operation context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error represents a missing entity (as opposed to
    /// a corrupt or failing one).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
