//! Change detection between a fresh scan and the previous manifest

use crate::manifest::{Manifest, ManifestEntry};
use crate::scan::ScannedFile;
use crate::util::hash_file;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// How files are compared against the previous manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectMode {
    /// Size and mtime
    #[default]
    Metadata,
    /// SHA256 of the content
    Checksum,
}

/// Classification of one scanned file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Added,
    Modified,
    Unchanged,
}

/// A scanned file together with its classification
#[derive(Debug, Clone)]
pub struct FileChange {
    pub file: ScannedFile,
    pub change: Change,
    /// Entry from the previous manifest, if the path existed there
    pub previous: Option<ManifestEntry>,
    /// Content hash, only known up front in checksum mode
    pub sha256: Option<String>,
}

/// Everything that differs from the previous snapshot
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// All scanned files, in archive-path order
    pub files: Vec<FileChange>,
    /// Paths in the previous manifest that no longer exist
    pub deleted: Vec<String>,
}

impl ChangeSet {
    fn count(&self, change: Change) -> u64 {
        self.files.iter().filter(|f| f.change == change).count() as u64
    }

    #[must_use]
    pub fn added(&self) -> u64 {
        self.count(Change::Added)
    }

    #[must_use]
    pub fn modified(&self) -> u64 {
        self.count(Change::Modified)
    }

    #[must_use]
    pub fn unchanged(&self) -> u64 {
        self.count(Change::Unchanged)
    }

    /// True when nothing was added, modified or deleted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.files.iter().all(|f| f.change == Change::Unchanged)
    }

    /// Files that need to be written into a new incremental archive
    pub fn pending(&self) -> impl Iterator<Item = &FileChange> {
        self.files.iter().filter(|f| f.change != Change::Unchanged)
    }

    /// Bytes that an incremental archive would hold
    #[must_use]
    pub fn pending_bytes(&self) -> u64 {
        self.pending().map(|f| f.file.size).sum()
    }
}

/// Compare a scan against the previous manifest
#[must_use]
pub fn detect_changes(
    scanned: Vec<ScannedFile>,
    previous: Option<&Manifest>,
    mode: DetectMode,
) -> ChangeSet {
    let hashes: Vec<Option<String>> = match mode {
        DetectMode::Metadata => vec![None; scanned.len()],
        DetectMode::Checksum => scanned
            .par_iter()
            .map(|file| match hash_file(&file.source_path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::warn!(path = %file.archive_path, error = %e, "Failed to hash file");
                    None
                }
            })
            .collect(),
    };

    let mut seen = HashSet::with_capacity(scanned.len());
    let files: Vec<FileChange> = scanned
        .into_iter()
        .zip(hashes)
        .map(|(file, sha256)| {
            seen.insert(file.archive_path.clone());
            let prev = previous.and_then(|m| m.get(&file.archive_path)).cloned();
            let change = match &prev {
                None => Change::Added,
                Some(entry) => {
                    let same = match (mode, &sha256) {
                        (DetectMode::Checksum, Some(hash)) => *hash == entry.sha256,
                        (DetectMode::Checksum, None) => false,
                        (DetectMode::Metadata, _) => {
                            entry.size == file.size && entry.mtime == file.mtime
                        }
                    };
                    if same {
                        Change::Unchanged
                    } else {
                        Change::Modified
                    }
                }
            };
            FileChange {
                file,
                change,
                previous: prev,
                sha256,
            }
        })
        .collect();

    let deleted = previous
        .map(|m| {
            m.entries
                .keys()
                .filter(|path| !seen.contains(*path))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    ChangeSet { files, deleted }
}
