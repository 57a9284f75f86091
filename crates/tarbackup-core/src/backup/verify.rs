//! Archive integrity checks

use crate::archive::{for_each_entry, ArchiveError};
use crate::manifest::{Manifest, ManifestEntry, MANIFEST_ENTRY};
use crate::snapshot::{short_id, Snapshot};
use crate::storage::{Database, DatabaseError, SnapshotStore};
use crate::util::{hash_file, HashingReader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use uuid::Uuid;

/// One thing wrong with a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum VerifyProblem {
    ArchiveMissing { path: PathBuf },
    ArchiveChecksum { expected: String, actual: String },
    Unreadable { error: String },
    MissingEntry { path: String },
    SizeMismatch { path: String, expected: u64, actual: u64 },
    ContentMismatch { path: String, expected: String, actual: String },
    UnexpectedEntry { path: String },
    ManifestMissing,
    ManifestMismatch,
    MissingDependency { snapshot_id: Uuid },
}

impl fmt::Display for VerifyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveMissing { path } => write!(f, "archive missing: {}", path.display()),
            Self::ArchiveChecksum { expected, actual } => {
                write!(f, "archive checksum mismatch: expected {expected}, got {actual}")
            }
            Self::Unreadable { error } => write!(f, "archive unreadable: {error}"),
            Self::MissingEntry { path } => write!(f, "missing entry: {path}"),
            Self::SizeMismatch { path, expected, actual } => {
                write!(f, "size mismatch for {path}: expected {expected}, got {actual}")
            }
            Self::ContentMismatch { path, .. } => write!(f, "content mismatch for {path}"),
            Self::UnexpectedEntry { path } => write!(f, "unexpected entry: {path}"),
            Self::ManifestMissing => f.write_str("embedded manifest missing"),
            Self::ManifestMismatch => f.write_str("embedded manifest differs from catalog"),
            Self::MissingDependency { snapshot_id } => {
                write!(f, "depends on snapshot {} which is gone", short_id(*snapshot_id))
            }
        }
    }
}

/// Result of verifying one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub snapshot_id: Uuid,
    pub entries_checked: u64,
    pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check a snapshot's archive against its catalog record, and that every
/// snapshot it depends on is still catalogued
///
/// # Errors
/// Returns an error only if the catalog cannot be queried; archive damage
/// is reported as problems
pub fn verify_snapshot(db: &Database, snapshot: &Snapshot) -> Result<VerifyReport, DatabaseError> {
    let mut report = VerifyReport {
        snapshot_id: snapshot.id,
        entries_checked: 0,
        problems: Vec::new(),
    };

    let store = SnapshotStore::new(db.connection());
    for id in snapshot.manifest.stored_in_ids() {
        if id != snapshot.id && store.get(id)?.is_none() {
            report
                .problems
                .push(VerifyProblem::MissingDependency { snapshot_id: id });
        }
    }

    let archive = &snapshot.archive_path;
    if !archive.exists() {
        report.problems.push(VerifyProblem::ArchiveMissing {
            path: archive.clone(),
        });
        return Ok(report);
    }

    match hash_file(archive) {
        Ok(actual) if actual != snapshot.archive_sha256 => {
            report.problems.push(VerifyProblem::ArchiveChecksum {
                expected: snapshot.archive_sha256.clone(),
                actual,
            });
        }
        Ok(_) => {}
        Err(e) => {
            report.problems.push(VerifyProblem::Unreadable {
                error: e.to_string(),
            });
            return Ok(report);
        }
    }

    check_entries(snapshot, &mut report);

    if report.is_ok() {
        tracing::debug!(snapshot = %snapshot.short_id(), "Verified");
    } else {
        tracing::warn!(
            snapshot = %snapshot.short_id(),
            problems = report.problems.len(),
            "Verification failed"
        );
    }
    Ok(report)
}

fn check_entries(snapshot: &Snapshot, report: &mut VerifyReport) {
    let mut expected: BTreeMap<&String, &ManifestEntry> =
        snapshot.manifest.entries_stored_in(snapshot.id).collect();
    let mut embedded: Option<Manifest> = None;
    let mut problems = Vec::new();
    let mut checked = 0;

    let walk = for_each_entry(&snapshot.archive_path, |name, entry| -> Result<(), ArchiveError> {
        if name == MANIFEST_ENTRY {
            let mut json = Vec::new();
            entry.read_to_end(&mut json)?;
            embedded = Some(serde_json::from_slice(&json)?);
            return Ok(());
        }

        let Some(want) = expected.remove(&name.to_string()) else {
            problems.push(VerifyProblem::UnexpectedEntry {
                path: name.to_string(),
            });
            return Ok(());
        };

        let mut reader = HashingReader::new(entry);
        io::copy(&mut reader, &mut io::sink())?;
        let (actual, size) = reader.finish();
        checked += 1;

        if size != want.size {
            problems.push(VerifyProblem::SizeMismatch {
                path: name.to_string(),
                expected: want.size,
                actual: size,
            });
        } else if actual != want.sha256 {
            problems.push(VerifyProblem::ContentMismatch {
                path: name.to_string(),
                expected: want.sha256.clone(),
                actual,
            });
        }
        Ok(())
    });

    if let Err(e) = walk {
        problems.push(VerifyProblem::Unreadable {
            error: e.to_string(),
        });
    }

    for path in expected.into_keys() {
        problems.push(VerifyProblem::MissingEntry { path: path.clone() });
    }

    match embedded {
        None => problems.push(VerifyProblem::ManifestMissing),
        Some(manifest) if manifest != snapshot.manifest => {
            problems.push(VerifyProblem::ManifestMismatch);
        }
        Some(_) => {}
    }

    report.entries_checked = checked;
    report.problems.extend(problems);
}
