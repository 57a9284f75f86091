//! Running a backup

use crate::archive::{archive_file_name, ArchiveError, ArchiveWriter};
use crate::changes::{detect_changes, Change, ChangeSet, DetectMode, FileChange};
use crate::config::Config;
use crate::manifest::{Manifest, ManifestEntry};
use crate::scan::{scan_set, ScanError};
use crate::set::BackupSet;
use crate::snapshot::{Snapshot, SnapshotKind, SnapshotStats};
use crate::storage::{Database, DatabaseError, SnapshotStore};
use crate::util::hash_file;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors during a backup run
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Catalog error: {0}")]
    Database(#[from] DatabaseError),
}

/// Knobs for a single run
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Take a full snapshot even if an incremental would do
    pub full: bool,
    /// Write a snapshot even when nothing changed
    pub force: bool,
    /// Report what would happen without writing anything
    pub dry_run: bool,
    pub mode: DetectMode,
    pub description: Option<String>,
}

/// What a dry run would have done
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub kind: SnapshotKind,
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
    pub unchanged: u64,
    pub files_to_store: u64,
    pub bytes_to_store: u64,
}

/// Result of [`run_backup`]
#[derive(Debug)]
pub enum BackupOutcome {
    Created(Box<Snapshot>),
    /// Nothing changed since `latest`; no archive was written
    Unchanged { latest: Box<Snapshot> },
    DryRun(DryRunReport),
}

/// Scan a set, compare it with its latest snapshot and write a new archive
///
/// # Errors
/// Returns an error if scanning, archiving or recording the snapshot fails.
/// A partially written archive is removed.
pub fn run_backup(
    db: &Database,
    set: &BackupSet,
    config: &Config,
    archive_root: &Path,
    options: &BackupOptions,
) -> Result<BackupOutcome, BackupError> {
    let scan = scan_set(set, &config.default_excludes)?;
    let store = SnapshotStore::new(db.connection());
    let latest = store.latest_for_set(set.id)?;

    let changes = detect_changes(scan.files, latest.as_ref().map(|s| &s.manifest), options.mode);
    let kind = choose_kind(latest.as_ref(), config, options);

    // An explicit full run always writes; reaching the chain limit alone does not
    if changes.is_empty() && !options.force && !options.full {
        if let Some(latest) = latest {
            tracing::info!(set = %set.name, latest = %latest.short_id(), "No changes since last snapshot");
            return Ok(BackupOutcome::Unchanged {
                latest: Box::new(latest),
            });
        }
    }

    if options.dry_run {
        return Ok(BackupOutcome::DryRun(dry_run_report(kind, &changes)));
    }

    let mut snapshot = match (kind, &latest) {
        (SnapshotKind::Incremental, Some(parent)) => {
            Snapshot::incremental(parent, PathBuf::new())
        }
        _ => Snapshot::full(set.id, set.name.clone(), PathBuf::new()),
    };
    if let Some(description) = &options.description {
        snapshot = snapshot.with_description(description.clone());
    }
    snapshot.archive_path = archive_root.join(&set.name).join(archive_file_name(
        &set.name,
        snapshot.kind,
        snapshot.id,
        snapshot.created_at,
    ));

    tracing::info!(
        set = %set.name,
        kind = %snapshot.kind,
        archive = %snapshot.archive_path.display(),
        "Writing snapshot"
    );

    let mut writer = ArchiveWriter::create(&snapshot.archive_path, config.compression_level)?;
    let written = match write_files(&mut writer, &changes, snapshot.id, kind) {
        Ok(written) => written,
        Err(e) => {
            writer.abandon();
            return Err(e.into());
        }
    };
    if let Err(e) = writer.append_manifest(&written.manifest) {
        writer.abandon();
        return Err(e.into());
    }

    snapshot.stats = SnapshotStats {
        files_total: written.manifest.len() as u64,
        files_stored: writer.files(),
        bytes_stored: writer.bytes(),
        added: changes.added(),
        modified: changes.modified(),
        deleted: changes.deleted.len() as u64,
        unchanged: changes.unchanged(),
        skipped: scan.skipped + written.skipped,
    };
    snapshot.manifest = written.manifest;

    let archive_path = writer.finish()?;
    let recorded = hash_file(&archive_path)
        .map_err(BackupError::from)
        .and_then(|sha| {
            snapshot.archive_sha256 = sha;
            store.create(&snapshot).map_err(BackupError::from)
        });
    if let Err(e) = recorded {
        if let Err(remove_err) = fs::remove_file(&archive_path) {
            tracing::warn!(
                path = %archive_path.display(),
                error = %remove_err,
                "Failed to remove unrecorded archive"
            );
        }
        return Err(e);
    }

    tracing::info!(
        id = %snapshot.short_id(),
        files = snapshot.stats.files_total,
        stored = snapshot.stats.files_stored,
        bytes = snapshot.stats.bytes_stored,
        "Snapshot created"
    );

    Ok(BackupOutcome::Created(Box::new(snapshot)))
}

fn choose_kind(latest: Option<&Snapshot>, config: &Config, options: &BackupOptions) -> SnapshotKind {
    match latest {
        None => SnapshotKind::Full,
        Some(_) if options.full => SnapshotKind::Full,
        Some(parent) if parent.chain_depth >= config.max_incrementals => {
            tracing::debug!(depth = parent.chain_depth, "Chain limit reached, taking a full snapshot");
            SnapshotKind::Full
        }
        Some(_) => SnapshotKind::Incremental,
    }
}

fn dry_run_report(kind: SnapshotKind, changes: &ChangeSet) -> DryRunReport {
    let (files_to_store, bytes_to_store) = match kind {
        SnapshotKind::Full => (
            changes.files.len() as u64,
            changes.files.iter().map(|f| f.file.size).sum(),
        ),
        SnapshotKind::Incremental => (changes.pending().count() as u64, changes.pending_bytes()),
    };
    DryRunReport {
        kind,
        added: changes.added(),
        modified: changes.modified(),
        deleted: changes.deleted.len() as u64,
        unchanged: changes.unchanged(),
        files_to_store,
        bytes_to_store,
    }
}

struct Written {
    manifest: Manifest,
    skipped: u64,
}

fn write_files(
    writer: &mut ArchiveWriter,
    changes: &ChangeSet,
    snapshot_id: Uuid,
    kind: SnapshotKind,
) -> Result<Written, ArchiveError> {
    let mut manifest = Manifest::new();
    let mut skipped = 0;

    for change in &changes.files {
        let path = &change.file.archive_path;
        let store = kind == SnapshotKind::Full || change.change != Change::Unchanged;

        if !store {
            if let Some(entry) = carried_forward(change) {
                manifest.insert(path.clone(), entry);
            }
            continue;
        }

        match writer.append_file(path, &change.file.source_path) {
            Ok(stored) => {
                tracing::debug!(path = %path, change = ?change.change, "Stored");
                manifest.insert(
                    path.clone(),
                    ManifestEntry {
                        size: stored.size,
                        mtime: stored.mtime,
                        mode: stored.mode,
                        sha256: stored.sha256,
                        stored_in: snapshot_id,
                    },
                );
            }
            Err(ArchiveError::SourceUnreadable { path: source, source: e }) => {
                skipped += 1;
                match (&change.previous, kind) {
                    (Some(previous), SnapshotKind::Incremental) => {
                        tracing::warn!(path = %source.display(), error = %e, "Unreadable, keeping previous version");
                        manifest.insert(path.clone(), previous.clone());
                    }
                    _ => {
                        tracing::warn!(path = %source.display(), error = %e, "Unreadable, skipped");
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Written { manifest, skipped })
}

/// Entry for a file whose content stays in an earlier archive
fn carried_forward(change: &FileChange) -> Option<ManifestEntry> {
    change.previous.as_ref().map(|previous| ManifestEntry {
        size: change.file.size,
        mtime: change.file.mtime,
        mode: change.file.mode,
        sha256: previous.sha256.clone(),
        stored_in: previous.stored_in,
    })
}
