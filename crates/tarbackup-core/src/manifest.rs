//! Snapshot manifests
//!
//! Every snapshot records the complete tree as it was when the backup ran,
//! not only the files its own archive holds. `stored_in` points at the
//! snapshot whose archive carries each file's bytes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Name of the manifest entry inside every archive
pub const MANIFEST_ENTRY: &str = ".tarbackup/manifest.json";

/// One file as recorded in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Size in bytes
    pub size: u64,
    /// Modification time, unix seconds
    pub mtime: i64,
    /// Unix permission bits
    pub mode: u32,
    /// SHA256 of the content
    pub sha256: String,
    /// Snapshot whose archive contains the content
    pub stored_in: Uuid,
}

/// Archive path -> entry, ordered so listings are stable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, entry: ManifestEntry) {
        self.entries.insert(path, entry);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all file sizes
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Every snapshot this manifest depends on
    #[must_use]
    pub fn stored_in_ids(&self) -> BTreeSet<Uuid> {
        self.entries.values().map(|e| e.stored_in).collect()
    }

    /// Entries whose content lives in the given snapshot's archive
    pub fn entries_stored_in(&self, id: Uuid) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter().filter(move |(_, e)| e.stored_in == id)
    }

    /// Restrict to a path or directory prefix. `docs` matches `docs` and
    /// everything under `docs/`, but not `docs2/`.
    #[must_use]
    pub fn filter_prefix(&self, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self.clone();
        }
        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| {
                path.as_str() == prefix
                    || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
            })
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect();
        Self { entries }
    }
}
