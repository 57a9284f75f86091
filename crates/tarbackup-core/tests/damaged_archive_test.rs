//! Restore and verify against archives that were altered after writing
//!
//! Each test rebuilds a snapshot's archive with one entry changed, dropped
//! or added, then checks that restore refuses it and verify names it.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tarbackup_core::archive::{for_each_entry, ArchiveError};
use tarbackup_core::backup::{
    restore_snapshot, run_backup, verify_snapshot, BackupOptions, BackupOutcome, RestoreError,
    RestoreOptions, VerifyProblem,
};
use tarbackup_core::manifest::MANIFEST_ENTRY;
use tarbackup_core::storage::{Database, SetStore};
use tarbackup_core::util::hash_file;
use tarbackup_core::{BackupSet, Config, Manifest, Snapshot};
use tempfile::TempDir;

fn snapshot_of_small_tree() -> (TempDir, Database, Snapshot) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let source = tmp.path().join("home");
    fs::create_dir_all(source.join("docs")).unwrap();
    fs::write(source.join("docs/todo.txt"), "buy milk\n").unwrap();
    fs::write(source.join("docs/plan.txt"), "step one\n").unwrap();

    let db = Database::in_memory().unwrap();
    let set = BackupSet::new("home".to_string(), vec![source.canonicalize().unwrap()]);
    SetStore::new(db.connection()).create(&set).unwrap();

    let archives = tmp.path().join("archives");
    let snapshot = match run_backup(&db, &set, &Config::default(), &archives, &BackupOptions::default())
        .unwrap()
    {
        BackupOutcome::Created(snapshot) => *snapshot,
        other => panic!("Expected a new snapshot, got {other:?}"),
    };
    (tmp, db, snapshot)
}

/// Rebuild an archive in place. `edit` may replace an entry's bytes or
/// drop the entry; `extra` entries go just before the manifest.
fn rewrite_archive(
    path: &Path,
    mut edit: impl FnMut(&str, Vec<u8>) -> Option<Vec<u8>>,
    extra: &[(&str, &[u8])],
) {
    let mut entries = Vec::new();
    for_each_entry(path, |name, entry| -> Result<(), ArchiveError> {
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push((name.to_string(), data));
        Ok(())
    })
    .unwrap();

    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut append = |name: &str, data: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data).unwrap();
    };

    for (name, data) in entries {
        if name == MANIFEST_ENTRY {
            for (extra_name, extra_data) in extra {
                append(extra_name, extra_data);
            }
        }
        if let Some(data) = edit(&name, data) {
            append(&name, &data);
        }
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Record the rebuilt archive's checksum so only entry-level damage shows
fn accept_archive(snapshot: &mut Snapshot) {
    snapshot.archive_sha256 = hash_file(&snapshot.archive_path).unwrap();
}

fn restore_into(tmp: &TempDir, db: &Database, snapshot: &Snapshot) -> Result<PathBuf, RestoreError> {
    let target = tmp.path().join("restore");
    restore_snapshot(db, snapshot, &target, &RestoreOptions::default()).map(|_| target)
}

#[test]
fn test_altered_content_fails_restore_and_verify() {
    let (tmp, db, mut snapshot) = snapshot_of_small_tree();

    // Same length, different bytes
    rewrite_archive(
        &snapshot.archive_path,
        |name, data| Some(if name == "home/docs/todo.txt" { b"buy MILK\n".to_vec() } else { data }),
        &[],
    );
    accept_archive(&mut snapshot);

    let err = restore_into(&tmp, &db, &snapshot).unwrap_err();
    assert!(
        matches!(&err, RestoreError::HashMismatch { path, .. } if path == "home/docs/todo.txt"),
        "unexpected error: {err}"
    );
    assert!(!tmp.path().join("restore/home/docs/todo.txt").exists());

    let report = verify_snapshot(&db, &snapshot).unwrap();
    assert_eq!(report.problems.len(), 1, "{:?}", report.problems);
    assert!(matches!(
        &report.problems[0],
        VerifyProblem::ContentMismatch { path, .. } if path == "home/docs/todo.txt"
    ));
}

#[test]
fn test_dropped_entry_fails_restore_and_verify() {
    let (tmp, db, mut snapshot) = snapshot_of_small_tree();

    rewrite_archive(
        &snapshot.archive_path,
        |name, data| (name != "home/docs/plan.txt").then_some(data),
        &[],
    );
    accept_archive(&mut snapshot);

    let err = restore_into(&tmp, &db, &snapshot).unwrap_err();
    assert!(
        matches!(&err, RestoreError::MissingEntry { path, .. } if path == "home/docs/plan.txt"),
        "unexpected error: {err}"
    );

    let report = verify_snapshot(&db, &snapshot).unwrap();
    assert_eq!(
        report.problems,
        vec![VerifyProblem::MissingEntry {
            path: "home/docs/plan.txt".to_string()
        }]
    );
}

#[test]
fn test_extra_entry_is_reported_but_not_restored() {
    let (tmp, db, mut snapshot) = snapshot_of_small_tree();

    rewrite_archive(
        &snapshot.archive_path,
        |_, data| Some(data),
        &[("home/docs/stowaway.txt", b"not mine")],
    );
    accept_archive(&mut snapshot);

    let report = verify_snapshot(&db, &snapshot).unwrap();
    assert_eq!(
        report.problems,
        vec![VerifyProblem::UnexpectedEntry {
            path: "home/docs/stowaway.txt".to_string()
        }]
    );

    // Restore only takes what the manifest names
    let target = restore_into(&tmp, &db, &snapshot).unwrap();
    assert!(target.join("home/docs/todo.txt").exists());
    assert!(!target.join("home/docs/stowaway.txt").exists());
}

#[test]
fn test_embedded_manifest_drift_is_reported() {
    let (_tmp, db, mut snapshot) = snapshot_of_small_tree();

    rewrite_archive(
        &snapshot.archive_path,
        |name, data| {
            if name != MANIFEST_ENTRY {
                return Some(data);
            }
            let mut manifest: Manifest = serde_json::from_slice(&data).unwrap();
            if let Some(entry) = manifest.entries.get_mut("home/docs/todo.txt") {
                entry.mtime += 3600;
            }
            Some(serde_json::to_vec_pretty(&manifest).unwrap())
        },
        &[],
    );
    accept_archive(&mut snapshot);

    let report = verify_snapshot(&db, &snapshot).unwrap();
    assert_eq!(report.problems, vec![VerifyProblem::ManifestMismatch]);
    assert_eq!(report.entries_checked, 2);
}
