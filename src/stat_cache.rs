//! Stat cache for fast manifest regeneration.
//!
//! Skips SHA-256 hashing for files whose stat metadata (mtime, size, mode,
//! inode) is unchanged since the last generation, modeled after git's index
//! stat cache. The cache is best-effort: a missing or corrupt cache file
//! degrades to an empty cache, and save failures are logged and ignored —
//! correctness never depends on it.
//!
//! The one subtle rule is the "racily clean" defense: a stat match is only
//! trusted when the file's mtime is *strictly earlier* than the cache's own
//! `written_at` timestamp. A file modified in the same timestamp quantum as
//! the cache write could match on stat while differing in content, so such
//! entries are forced to miss and rehash.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::manifest::Manifest;

/// Stat metadata and content hash for a single file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatCacheEntry {
    /// Modification time in unix nanoseconds.
    pub mtime: i64,
    /// File size in bytes.
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
    /// Inode number (0 on platforms without one).
    pub inode: u64,
    /// SHA-256 content hash recorded when the entry was last verified.
    pub hash: String,
}

/// On-disk stat cache: entries keyed by workspace-relative path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatCache {
    /// Unix nanoseconds when the cache file was last written.
    pub written_at: i64,
    /// Entries keyed by relative path.
    pub entries: BTreeMap<String, StatCacheEntry>,
}

impl StatCache {
    /// Read a stat cache from disk. Missing or corrupt files yield an empty
    /// cache — never an error.
    ///
    /// The effective `written_at` is clamped to the cache file's own mtime:
    /// file mtimes come from the kernel's coarse clock, so comparing a
    /// precise wall-clock stamp against them would under-detect races. The
    /// cache file's mtime lives in the same clock domain as the mtimes being
    /// checked.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let Ok(data) = fs::read(path) else {
            return Self::default();
        };
        let mut cache: Self = match serde_json::from_slice(&data) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stat cache corrupt, starting empty");
                return Self::default();
            }
        };
        if let Ok(meta) = fs::symlink_metadata(path) {
            cache.written_at = cache.written_at.min(mtime_nanos(&meta));
        }
        cache
    }

    /// Write the cache to disk, stamping `written_at` with the current time.
    /// Failures are logged and ignored.
    pub fn save(&mut self, path: &Path) {
        self.written_at = now_nanos();
        let Ok(data) = serde_json::to_vec(self) else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(path, data) {
            warn!(path = %path.display(), error = %e, "failed to write stat cache");
        }
    }

    /// Check whether a file's stat metadata matches its cached entry.
    /// Returns the cached hash on a hit, `None` on a miss.
    ///
    /// Hit conditions, all required:
    ///  1. an entry exists for `rel_path`
    ///  2. size, mode, and inode match exactly
    ///  3. mtime matches exactly
    ///  4. mtime is strictly earlier than `written_at` (not racily clean)
    #[must_use]
    pub fn lookup(&self, rel_path: &str, meta: &fs::Metadata) -> Option<&str> {
        let entry = self.entries.get(rel_path)?;
        let mtime = mtime_nanos(meta);

        if entry.size != meta.len() || entry.mode != mode_bits(meta) || entry.inode != inode(meta) {
            return None;
        }
        if entry.mtime != mtime {
            return None;
        }
        if mtime >= self.written_at {
            debug!(path = rel_path, "stat cache entry racily clean, rehashing");
            return None;
        }
        Some(&entry.hash)
    }

    /// Record a file's current stat metadata and hash.
    pub fn update(&mut self, rel_path: &str, meta: &fs::Metadata, hash: &str) {
        self.entries.insert(
            rel_path.to_owned(),
            StatCacheEntry {
                mtime: mtime_nanos(meta),
                size: meta.len(),
                mode: mode_bits(meta),
                inode: inode(meta),
                hash: hash.to_owned(),
            },
        );
    }

    /// Drop entries whose path fails the predicate (files no longer present).
    pub fn retain_paths(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    /// Populate a fresh cache from a just-generated manifest and write it to
    /// `cache_path`. Called after snapshot creation (which does full hashing)
    /// so subsequent status/drift checks benefit immediately. Files that
    /// cannot be stat'ed are skipped.
    pub fn rebuild_from_manifest(root: &Path, manifest: &Manifest, cache_path: &Path) {
        let mut cache = Self::default();
        for f in manifest.file_entries() {
            let abs = root.join(&f.path);
            let Ok(meta) = fs::symlink_metadata(&abs) else {
                continue;
            };
            cache.update(&f.path, &meta, &f.hash);
        }
        cache.save(cache_path);
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
}

fn mtime_nanos(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

#[cfg(unix)]
fn inode(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &fs::Metadata) -> u64 {
    0
}
