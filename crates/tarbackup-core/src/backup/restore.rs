//! Restoring snapshots
//!
//! A snapshot's manifest names, for every file, the archive that holds its
//! bytes. Restoring therefore reads the snapshot's own archive plus every
//! ancestor archive it still depends on, each exactly once.

use crate::archive::{for_each_entry, ArchiveError};
use crate::manifest::{ManifestEntry, MANIFEST_ENTRY};
use crate::snapshot::Snapshot;
use crate::storage::{Database, DatabaseError, SnapshotStore};
use crate::util::{safe_join, HashingReader, PathError};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Errors during restore
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Catalog error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Path security error: {0}")]
    PathSecurity(#[from] PathError),

    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Snapshot {0} needed for this restore is no longer in the catalog")]
    SnapshotMissing(Uuid),

    #[error("{path} is missing from archive {archive}")]
    MissingEntry { path: String, archive: PathBuf },

    #[error("Hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Refusing to overwrite existing file: {0}")]
    WouldOverwrite(PathBuf),

    #[error("No files in the snapshot match '{0}'")]
    NothingToRestore(String),
}

/// Knobs for a restore
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Only restore this file or directory (archive path)
    pub prefix: Option<String>,
    /// Replace files that already exist in the target
    pub overwrite: bool,
}

/// Files to pull from one archive
#[derive(Debug, Clone)]
pub struct RestoreGroup {
    pub snapshot_id: Uuid,
    pub archive_path: PathBuf,
    pub entries: BTreeMap<String, ManifestEntry>,
}

/// Archives a restore will read, with the entries taken from each
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub snapshot_id: Uuid,
    pub groups: Vec<RestoreGroup>,
}

impl RestorePlan {
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }
}

/// Outcome of a completed restore
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RestoreReport {
    pub files_restored: u64,
    pub bytes_restored: u64,
    pub archives_read: usize,
}

/// Work out which archives hold the files of a snapshot
///
/// # Errors
/// Returns an error if a needed snapshot is gone from the catalog or
/// nothing matches the prefix
pub fn plan_restore(
    db: &Database,
    snapshot: &Snapshot,
    prefix: Option<&str>,
) -> Result<RestorePlan, RestoreError> {
    let manifest = match prefix {
        Some(prefix) => snapshot.manifest.filter_prefix(prefix),
        None => snapshot.manifest.clone(),
    };
    if manifest.is_empty() {
        return Err(RestoreError::NothingToRestore(
            prefix.unwrap_or_default().to_string(),
        ));
    }

    let store = SnapshotStore::new(db.connection());
    let mut groups: BTreeMap<Uuid, RestoreGroup> = BTreeMap::new();

    for (path, entry) in manifest.entries {
        if !groups.contains_key(&entry.stored_in) {
            let archive_path = if entry.stored_in == snapshot.id {
                snapshot.archive_path.clone()
            } else {
                store
                    .get(entry.stored_in)?
                    .ok_or(RestoreError::SnapshotMissing(entry.stored_in))?
                    .archive_path
            };
            groups.insert(
                entry.stored_in,
                RestoreGroup {
                    snapshot_id: entry.stored_in,
                    archive_path,
                    entries: BTreeMap::new(),
                },
            );
        }
        if let Some(group) = groups.get_mut(&entry.stored_in) {
            group.entries.insert(path, entry);
        }
    }

    Ok(RestorePlan {
        snapshot_id: snapshot.id,
        groups: groups.into_values().collect(),
    })
}

/// Restore a snapshot into `target`, creating it if needed. Every restored
/// file is hashed as it is written and checked against the manifest.
///
/// # Errors
/// Returns an error if an archive is missing or damaged, a file would be
/// overwritten without `overwrite`, or a path would escape `target`
pub fn restore_snapshot(
    db: &Database,
    snapshot: &Snapshot,
    target: &Path,
    options: &RestoreOptions,
) -> Result<RestoreReport, RestoreError> {
    let plan = plan_restore(db, snapshot, options.prefix.as_deref())?;

    for group in &plan.groups {
        if !group.archive_path.exists() {
            return Err(RestoreError::ArchiveNotFound(group.archive_path.clone()));
        }
    }

    // Check every destination before touching anything, the target included
    for group in &plan.groups {
        for path in group.entries.keys() {
            let dest = safe_join(target, Path::new(path))?;
            if !options.overwrite && fs::symlink_metadata(&dest).is_ok() {
                return Err(RestoreError::WouldOverwrite(dest));
            }
        }
    }

    fs::create_dir_all(target)?;
    let target = target.canonicalize()?;

    let mut report = RestoreReport::default();
    for group in &plan.groups {
        restore_group(group, &target, &mut report)?;
        report.archives_read += 1;
    }

    tracing::info!(
        snapshot = %snapshot.short_id(),
        files = report.files_restored,
        archives = report.archives_read,
        target = %target.display(),
        "Restore complete"
    );
    Ok(report)
}

/// `target` must already be canonical
fn restore_group(
    group: &RestoreGroup,
    target: &Path,
    report: &mut RestoreReport,
) -> Result<(), RestoreError> {
    let mut remaining = group.entries.clone();

    for_each_entry(&group.archive_path, |name, entry| -> Result<(), RestoreError> {
        if name == MANIFEST_ENTRY {
            return Ok(());
        }
        let Some(expected) = remaining.remove(name) else {
            return Ok(());
        };

        let dest = safe_join(target, Path::new(name))?;
        create_parent_within(target, &dest)?;

        // Replace the old file or link itself, never what a link points at
        if let Ok(existing) = fs::symlink_metadata(&dest) {
            if !existing.is_dir() {
                fs::remove_file(&dest)?;
            }
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(&dest)?;

        let mut reader = HashingReader::new(entry);
        io::copy(&mut reader, &mut file)?;
        let (actual, _) = reader.finish();
        if actual != expected.sha256 {
            drop(file);
            if let Err(e) = fs::remove_file(&dest) {
                tracing::warn!(path = %dest.display(), error = %e, "Failed to remove damaged file");
            }
            return Err(RestoreError::HashMismatch {
                path: name.to_string(),
                expected: expected.sha256,
                actual,
            });
        }

        if let Some(mtime) = mtime_to_system(expected.mtime) {
            file.set_modified(mtime)?;
        }
        set_mode(&file, expected.mode)?;

        tracing::debug!(path = %name, "Restored");
        report.files_restored += 1;
        report.bytes_restored += expected.size;
        Ok(())
    })?;

    if let Some(path) = remaining.into_keys().next() {
        return Err(RestoreError::MissingEntry {
            path,
            archive: group.archive_path.clone(),
        });
    }
    Ok(())
}

/// Create the parent directories of `dest`, refusing any that a symlink
/// would place outside `root`
fn create_parent_within(root: &Path, dest: &Path) -> Result<(), RestoreError> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    let escapes = || RestoreError::PathSecurity(PathError::EscapesRoot(dest.display().to_string()));

    // New directories land under the deepest ancestor that already exists
    let mut existing = parent;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(up) => existing = up,
            None => break,
        }
    }
    if !existing.canonicalize()?.starts_with(root) {
        return Err(escapes());
    }

    fs::create_dir_all(parent)?;
    if !parent.canonicalize()?.starts_with(root) {
        return Err(escapes());
    }
    Ok(())
}

fn mtime_to_system(secs: i64) -> Option<SystemTime> {
    let secs = u64::try_from(secs).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}
