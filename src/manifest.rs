//! Deterministic, content-addressed file-tree manifests.
//!
//! A [`Manifest`] describes one workspace tree: every file, directory, and
//! symlink under the root (minus ignored paths), with SHA-256 content hashes
//! for regular files. Entries are sorted by `(path, entry_type)` so that the
//! serialized JSON — and therefore the manifest hash — is byte-identical for
//! identical trees regardless of filesystem iteration order or OS.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::hash;
use crate::ignore::Matcher;
use crate::stat_cache::StatCache;

/// Current manifest format version tag.
pub const MANIFEST_VERSION: &str = "2";

// ---------------------------------------------------------------------------
// FileEntry
// ---------------------------------------------------------------------------

/// The kind of a manifest entry.
///
/// The derived `Ord` (declaration order) is part of the canonical sort key,
/// so variants must not be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file: hashed over its full byte content.
    File,
    /// Directory: mode only, never hashed.
    Dir,
    /// Symbolic link: records its target, never hashed.
    Symlink,
}

/// One row of a manifest.
///
/// Invariant: a manifest never contains two entries with the same
/// `(path, entry_type)` pair. The generator upholds this by construction
/// (each filesystem object yields exactly one entry).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// POSIX-relative path, forward-slash normalized.
    pub path: String,
    /// SHA-256 content hash. Empty for directories and symlinks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
    /// Optional modification time (unix seconds). Omitted by default so that
    /// manifests stay reproducible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<i64>,
    /// Symlink target, present only for symlink entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A complete, sorted description of a workspace tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version tag.
    pub version: String,
    /// Entries sorted by `(path, entry_type)` ascending.
    pub entries: Vec<FileEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::empty()
    }
}

impl Manifest {
    /// An empty manifest (used as the merge base when no ancestor exists).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION.to_owned(),
            entries: Vec::new(),
        }
    }

    /// Generate a manifest for `root`, hashing every regular file.
    pub fn generate(root: &Path) -> Result<Self> {
        Self::generate_inner(root, &mut |abs, _rel, _meta| {
            hash::hash_file(abs).map_err(|e| EngineError::io(format!("failed to hash {}", abs.display()), e))
        })
    }

    /// Generate a manifest for `root` using the stat cache at `cache_path`
    /// to skip hashing files whose stat metadata proves them unchanged.
    ///
    /// On return the cache has been pruned of departed files and written back
    /// (best-effort; save failures are logged and ignored).
    pub fn generate_with_cache(root: &Path, cache_path: &Path) -> Result<Self> {
        let mut cache = StatCache::load(cache_path);

        let manifest = Self::generate_inner(root, &mut |abs, rel, meta| {
            if let Some(cached) = cache.lookup(rel, meta) {
                return Ok(cached.to_owned());
            }
            let h = hash::hash_file(abs)
                .map_err(|e| EngineError::io(format!("failed to hash {}", abs.display()), e))?;
            cache.update(rel, meta, &h);
            Ok(h)
        })?;

        let present: std::collections::HashSet<&str> = manifest
            .file_entries()
            .map(|f| f.path.as_str())
            .collect();
        cache.retain_paths(|p| present.contains(p));
        cache.save(cache_path);

        Ok(manifest)
    }

    fn generate_inner(
        root: &Path,
        hash_fn: &mut dyn FnMut(&Path, &str, &fs::Metadata) -> Result<String>,
    ) -> Result<Self> {
        let matcher = Matcher::load_from_dir(root);
        let mut entries = Vec::new();

        // Explicit worklist; no recursion, no reliance on readdir order.
        let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let read = fs::read_dir(&dir)
                .map_err(|e| EngineError::io(format!("failed to read directory {}", dir.display()), e))?;
            for item in read {
                let item = item
                    .map_err(|e| EngineError::io(format!("failed to read directory {}", dir.display()), e))?;
                let abs = item.path();
                let rel = relative_slash_path(root, &abs)?;

                let meta = fs::symlink_metadata(&abs)
                    .map_err(|e| EngineError::io(format!("failed to stat {}", abs.display()), e))?;
                let file_type = meta.file_type();

                if file_type.is_symlink() {
                    if matcher.is_ignored(&rel, false) {
                        continue;
                    }
                    let target = fs::read_link(&abs)
                        .map_err(|e| EngineError::io(format!("failed to read symlink {}", abs.display()), e))?;
                    entries.push(FileEntry {
                        entry_type: EntryType::Symlink,
                        path: rel,
                        hash: String::new(),
                        size: meta.len(),
                        mode: permission_bits(&meta),
                        mod_time: None,
                        target: Some(target.to_string_lossy().replace('\\', "/")),
                    });
                } else if file_type.is_dir() {
                    // Directory-only patterns prune the whole subtree.
                    if matcher.is_ignored(&rel, true) {
                        continue;
                    }
                    entries.push(FileEntry {
                        entry_type: EntryType::Dir,
                        path: rel,
                        hash: String::new(),
                        size: 0,
                        mode: permission_bits(&meta),
                        mod_time: None,
                        target: None,
                    });
                    stack.push(abs);
                } else if file_type.is_file() {
                    if matcher.is_ignored(&rel, false) {
                        continue;
                    }
                    let content_hash = hash_fn(&abs, &rel, &meta)?;
                    entries.push(FileEntry {
                        entry_type: EntryType::File,
                        path: rel,
                        hash: content_hash,
                        size: meta.len(),
                        mode: permission_bits(&meta),
                        mod_time: None,
                        target: None,
                    });
                }
                // Sockets, fifos, devices are not tracked.
            }
        }

        entries.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.entry_type.cmp(&b.entry_type))
        });

        Ok(Self {
            version: MANIFEST_VERSION.to_owned(),
            entries,
        })
    }

    /// Serialize to the canonical JSON form used for hashing and storage.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| EngineError::Corrupt {
            kind: "manifest",
            id: String::new(),
            detail: format!("failed to serialize: {e}"),
        })
    }

    /// Parse a manifest from its JSON serialization.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| EngineError::Corrupt {
            kind: "manifest",
            id: String::new(),
            detail: format!("failed to parse: {e}"),
        })
    }

    /// The manifest's content hash: SHA-256 of the canonical JSON.
    pub fn hash(&self) -> Result<String> {
        Ok(hash::hash_bytes(&self.to_canonical_json()?))
    }

    /// Iterate over regular-file entries only.
    pub fn file_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::File)
    }

    /// Look up the file entry at `path`, if one exists.
    #[must_use]
    pub fn file_entry(&self, path: &str) -> Option<&FileEntry> {
        self.entries
            .iter()
            .find(|e| e.entry_type == EntryType::File && e.path == path)
    }

    /// Number of regular files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.file_entries().count()
    }

    /// Total size of all regular files in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.file_entries().map(|f| f.size).sum()
    }

    /// Compare two manifests, returning sorted path lists of files added,
    /// modified, and deleted going from `base` to `current`.
    ///
    /// Symlinks participate by target comparison; directories are ignored
    /// (mode-only changes are not tracked as drift).
    #[must_use]
    pub fn diff(base: &Self, current: &Self) -> ManifestDiff {
        let base_map = content_map(base);
        let current_map = content_map(current);

        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut deleted = Vec::new();

        for (path, fingerprint) in &current_map {
            match base_map.get(path) {
                None => added.push((*path).to_owned()),
                Some(base_fp) if base_fp != fingerprint => modified.push((*path).to_owned()),
                Some(_) => {}
            }
        }
        for path in base_map.keys() {
            if !current_map.contains_key(path) {
                deleted.push((*path).to_owned());
            }
        }

        added.sort();
        modified.sort();
        deleted.sort();

        ManifestDiff {
            added,
            modified,
            deleted,
        }
    }
}

/// The result of diffing two manifests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Paths present in `current` but not `base`.
    pub added: Vec<String>,
    /// Paths present in both with differing content.
    pub modified: Vec<String>,
    /// Paths present in `base` but not `current`.
    pub deleted: Vec<String>,
}

impl ManifestDiff {
    /// True if any path changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// All changed paths (added + modified), as a set for overlap checks.
    #[must_use]
    pub fn changed_paths(&self) -> std::collections::BTreeSet<String> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .cloned()
            .collect()
    }
}

/// Map of path → content fingerprint for non-directory entries.
fn content_map(m: &Manifest) -> BTreeMap<&str, &str> {
    let mut map = BTreeMap::new();
    for e in &m.entries {
        match e.entry_type {
            EntryType::File => {
                map.insert(e.path.as_str(), e.hash.as_str());
            }
            EntryType::Symlink => {
                map.insert(e.path.as_str(), e.target.as_deref().unwrap_or(""));
            }
            EntryType::Dir => {}
        }
    }
    map
}

fn relative_slash_path(root: &Path, abs: &Path) -> Result<String> {
    let rel = abs.strip_prefix(root).map_err(|_| {
        EngineError::io(
            format!("path {} escapes root {}", abs.display(), root.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}
