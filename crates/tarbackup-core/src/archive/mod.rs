//! tar.gz snapshot archives
//!
//! An archive holds the files a snapshot stored, each under its archive
//! path, followed by the snapshot manifest at [`MANIFEST_ENTRY`].
//!
//! [`MANIFEST_ENTRY`]: crate::manifest::MANIFEST_ENTRY

pub mod reader;
pub mod writer;

use crate::snapshot::{short_id, SnapshotKind};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub use reader::{for_each_entry, read_manifest};
pub use writer::{ArchiveWriter, StoredFile};

/// Errors reading or writing archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File changed while it was being archived: {0}")]
    FileChanged(String),

    #[error("Archive entry has an invalid path: {0}")]
    InvalidEntryPath(String),

    #[error("Archive has no manifest: {0}")]
    ManifestMissing(PathBuf),

    #[error("Archive already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// `<set>-<YYYYmmdd-HHMMSS>-<full|incr>-<id8>.tar.gz`
#[must_use]
pub fn archive_file_name(
    set_name: &str,
    kind: SnapshotKind,
    id: Uuid,
    created_at: DateTime<Utc>,
) -> String {
    format!(
        "{set_name}-{}-{}-{}.tar.gz",
        created_at.format("%Y%m%d-%H%M%S"),
        kind.file_tag(),
        short_id(id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_file_name() {
        let id = Uuid::parse_str("0123abcd-0000-4000-8000-000000000000").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(
            archive_file_name("home", SnapshotKind::Incremental, id, at),
            "home-20240309-140500-incr-0123abcd.tar.gz"
        );
    }
}
