//! Source tree scanning

use crate::exclude::ExcludeMatcher;
use crate::set::{BackupSet, SetError};
use crate::util::to_archive_path;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that abort a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source directory is missing: {0}")]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Set(#[from] SetError),

    #[error(transparent)]
    Pattern(#[from] crate::exclude::PatternError),
}

/// A regular file found under a source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// `label/relative/path`
    pub archive_path: String,
    /// Absolute path on disk
    pub source_path: PathBuf,
    pub size: u64,
    pub mtime: i64,
    pub mode: u32,
}

/// Result of scanning every source of a set
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Files in archive-path order
    pub files: Vec<ScannedFile>,
    /// Entries that could not be read
    pub skipped: u64,
}

/// Walk all sources of a set, applying its excludes plus `extra_excludes`
pub fn scan_set(set: &BackupSet, extra_excludes: &[String]) -> Result<ScanOutcome, ScanError> {
    let patterns: Vec<&String> = set.excludes.iter().chain(extra_excludes).collect();
    let matcher = ExcludeMatcher::new(&patterns)?;

    let mut outcome = ScanOutcome::default();
    for (label, root) in set.root_labels()? {
        if !root.is_dir() {
            return Err(ScanError::SourceMissing(root.to_path_buf()));
        }
        scan_root(&label, root, &matcher, &mut outcome);
    }

    outcome
        .files
        .sort_by(|a, b| a.archive_path.cmp(&b.archive_path));
    tracing::debug!(
        set = %set.name,
        files = outcome.files.len(),
        skipped = outcome.skipped,
        "Scan complete"
    );
    Ok(outcome)
}

fn scan_root(label: &str, root: &Path, matcher: &ExcludeMatcher, outcome: &mut ScanOutcome) {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                return true;
            };
            let Ok(archive_path) = to_archive_path(label, relative) else {
                // Reported as skipped below
                return true;
            };
            let name = entry.file_name().to_string_lossy();
            let excluded = matcher.is_excluded(&archive_path, &name);
            if excluded {
                tracing::debug!(path = %archive_path, "Excluded");
            }
            !excluded
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                outcome.skipped += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let archive_path = match to_archive_path(label, relative) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping file with non UTF-8 name");
                outcome.skipped += 1;
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %archive_path, error = %e, "Skipping file without metadata");
                outcome.skipped += 1;
                continue;
            }
        };

        outcome.files.push(ScannedFile {
            archive_path,
            source_path: entry.into_path(),
            size: metadata.len(),
            mtime: mtime_secs(&metadata),
            mode: file_mode(&metadata),
        });
    }
}

/// Modification time in unix seconds (0 when unavailable)
#[must_use]
pub fn mtime_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("notes/drafts")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("notes/todo.txt"), "buy milk").unwrap();
        fs::write(root.join("notes/drafts/letter.txt"), "dear").unwrap();
        fs::write(root.join("notes/scratch.tmp"), "junk").unwrap();
        fs::write(root.join(".cache/blob"), "cached").unwrap();
    }

    fn set_for(root: &Path, excludes: &[&str]) -> BackupSet {
        BackupSet::new("t".to_string(), vec![root.to_path_buf()])
            .with_excludes(excludes.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_scan_lists_files_with_label() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("home");
        make_tree(&root);

        let outcome = scan_set(&set_for(&root, &[]), &[]).unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.archive_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "home/.cache/blob",
                "home/notes/drafts/letter.txt",
                "home/notes/scratch.tmp",
                "home/notes/todo.txt",
            ]
        );
        assert_eq!(outcome.files[3].size, 8);
    }

    #[test]
    fn test_scan_applies_set_and_extra_excludes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("home");
        make_tree(&root);

        let outcome = scan_set(
            &set_for(&root, &["*.tmp"]),
            &[".cache".to_string(), "home/notes/drafts".to_string()],
        )
        .unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.archive_path.as_str()).collect();
        assert_eq!(paths, vec!["home/notes/todo.txt"]);
    }

    #[test]
    fn test_scan_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = scan_set(&set_for(&dir.path().join("gone"), &[]), &[]);
        assert!(matches!(result, Err(ScanError::SourceMissing(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("home");
        make_tree(&root);
        std::os::unix::fs::symlink(root.join("notes/todo.txt"), root.join("link.txt")).unwrap();

        let outcome = scan_set(&set_for(&root, &[]), &[]).unwrap();
        assert!(outcome.files.iter().all(|f| f.archive_path != "home/link.txt"));
    }
}
