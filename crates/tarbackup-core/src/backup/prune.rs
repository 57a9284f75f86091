//! Retention: dropping old snapshots without breaking newer ones

use crate::set::BackupSet;
use crate::snapshot::Snapshot;
use crate::storage::{Database, DatabaseError, SnapshotStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors during pruning
#[derive(Error, Debug)]
pub enum PruneError {
    #[error("Refusing to prune every snapshot; keep at least one")]
    KeepZero,

    #[error("Catalog error: {0}")]
    Database(#[from] DatabaseError),
}

/// Which snapshots stay and which go
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Newest first
    pub keep: Vec<Uuid>,
    /// Newest first
    pub remove: Vec<Uuid>,
}

/// A snapshot removed (or, in a dry run, removable)
#[derive(Debug, Clone, Serialize)]
pub struct PrunedSnapshot {
    pub id: Uuid,
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
}

/// Outcome of [`prune_set`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub kept: usize,
    pub removed: Vec<PrunedSnapshot>,
    pub bytes_freed: u64,
    pub dry_run: bool,
}

/// Keep the newest `keep` snapshots and everything they depend on.
///
/// `snapshots` must be one set's snapshots, newest first. A kept
/// incremental pins its parent chain and every snapshot its manifest
/// stores content in.
#[must_use]
pub fn plan_prune(snapshots: &[Snapshot], keep: usize) -> PrunePlan {
    let by_id: HashMap<Uuid, &Snapshot> = snapshots.iter().map(|s| (s.id, s)).collect();
    let mut pinned: HashSet<Uuid> = HashSet::new();
    let mut pending: Vec<Uuid> = snapshots.iter().take(keep).map(|s| s.id).collect();

    // Walk outwards from the kept snapshots; anything reachable through a
    // parent link or a manifest's `stored_in` is needed for a restore
    while let Some(id) = pending.pop() {
        if !pinned.insert(id) {
            continue;
        }
        let Some(snapshot) = by_id.get(&id) else {
            continue;
        };
        pending.extend(snapshot.parent_id);
        pending.extend(snapshot.manifest.stored_in_ids());
    }

    let (keep, remove): (Vec<&Snapshot>, Vec<&Snapshot>) =
        snapshots.iter().partition(|s| pinned.contains(&s.id));

    PrunePlan {
        keep: keep.into_iter().map(|s| s.id).collect(),
        remove: remove.into_iter().map(|s| s.id).collect(),
    }
}

/// Apply [`plan_prune`] to a set: delete archives and catalog records
///
/// # Errors
/// Returns an error if `keep` is zero or the catalog cannot be updated.
/// An archive that is already gone is only logged.
pub fn prune_set(
    db: &Database,
    set: &BackupSet,
    keep: usize,
    dry_run: bool,
) -> Result<PruneReport, PruneError> {
    if keep == 0 {
        return Err(PruneError::KeepZero);
    }

    let store = SnapshotStore::new(db.connection());
    let snapshots = store.list_for_set(set.id)?;
    let plan = plan_prune(&snapshots, keep);
    let remove: HashSet<Uuid> = plan.remove.iter().copied().collect();

    let mut report = PruneReport {
        kept: plan.keep.len(),
        dry_run,
        ..PruneReport::default()
    };

    for snapshot in snapshots.iter().filter(|s| remove.contains(&s.id)) {
        let archive_bytes = if dry_run {
            fs::metadata(&snapshot.archive_path)
                .map(|m| m.len())
                .unwrap_or(0)
        } else {
            // Catalog first: a failed delete leaves the archive it still names
            store.delete(snapshot.id)?;
            let freed = remove_archive(snapshot);
            tracing::info!(snapshot = %snapshot.short_id(), "Pruned");
            freed
        };

        report.bytes_freed += archive_bytes;
        report.removed.push(PrunedSnapshot {
            id: snapshot.id,
            archive_path: snapshot.archive_path.clone(),
            archive_bytes,
        });
    }

    Ok(report)
}

/// Delete a snapshot's archive file, logging instead of failing if it is
/// already gone. Returns the bytes freed.
pub fn remove_archive(snapshot: &Snapshot) -> u64 {
    let bytes = fs::metadata(&snapshot.archive_path)
        .map(|m| m.len())
        .unwrap_or(0);
    match fs::remove_file(&snapshot.archive_path) {
        Ok(()) => bytes,
        Err(e) => {
            tracing::warn!(
                path = %snapshot.archive_path.display(),
                error = %e,
                "Could not remove archive"
            );
            0
        }
    }
}
