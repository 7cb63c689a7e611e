//! The git bridge: map the snapshot DAG onto git commits/branches and back.
//!
//! - [`env`] — the narrow subprocess wrapper; the only place git command
//!   lines are built.
//! - [`mapping`] — persistent snapshot↔commit mapping and export metadata.
//! - [`export`] — snapshots → commits/branches.
//! - [`import`] — commits → snapshots, with divergence detection.
//!
//! Push/pull/sync orchestration over these lives in [`crate::backend`].

pub mod env;
pub mod export;
pub mod import;
pub mod mapping;

pub use env::{CommitInfo, CommitMeta, GitEnv};
pub use export::{ExportOptions, ExportOutcome, agent_email, export, is_agent_email};
pub use import::{DivergenceInfo, ImportOutcome, import_incremental, import_incremental_from};
pub use mapping::{ExportMeta, ExportWorkspaceMeta, GitMapping, META_REF};
