//! Snapshot records

use crate::manifest::Manifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Whether an archive holds every file or only the changes since its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Full,
    Incremental,
}

impl SnapshotKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }

    /// Short tag used in archive file names
    #[must_use]
    pub fn file_tag(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incr",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!("Unknown snapshot kind: {other}")),
        }
    }
}

/// Counters describing one backup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Files in the manifest
    pub files_total: u64,
    /// Files written into this snapshot's archive
    pub files_stored: u64,
    /// Uncompressed bytes written into this snapshot's archive
    pub bytes_stored: u64,
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
    pub unchanged: u64,
    /// Files that could not be read
    pub skipped: u64,
}

/// One backup run: its archive plus the manifest of the tree it captured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier
    pub id: Uuid,
    /// Owning backup set
    pub set_id: Uuid,
    /// Set name at the time of the backup
    pub set_name: String,
    pub kind: SnapshotKind,
    /// Previous snapshot in the chain (incrementals only)
    pub parent_id: Option<Uuid>,
    /// 0 for a full snapshot, parent depth + 1 otherwise
    pub chain_depth: u32,
    /// Optional user message
    pub description: Option<String>,
    /// Path to the tar.gz archive
    pub archive_path: PathBuf,
    /// SHA256 of the archive file as written
    pub archive_sha256: String,
    pub manifest: Manifest,
    pub stats: SnapshotStats,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a full snapshot record
    #[must_use]
    pub fn full(set_id: Uuid, set_name: String, archive_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            set_id,
            set_name,
            kind: SnapshotKind::Full,
            parent_id: None,
            chain_depth: 0,
            description: None,
            archive_path,
            archive_sha256: String::new(),
            manifest: Manifest::new(),
            stats: SnapshotStats::default(),
            created_at: Utc::now(),
        }
    }

    /// Create an incremental snapshot record on top of `parent`
    #[must_use]
    pub fn incremental(parent: &Snapshot, archive_path: PathBuf) -> Self {
        Self {
            kind: SnapshotKind::Incremental,
            parent_id: Some(parent.id),
            chain_depth: parent.chain_depth + 1,
            ..Self::full(parent.set_id, parent.set_name.clone(), archive_path)
        }
    }

    /// Set a description for this snapshot
    #[must_use]
    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// First eight hex digits of the id, as shown in listings
    #[must_use]
    pub fn short_id(&self) -> String {
        short_id(self.id)
    }
}

/// First eight hex digits of an id
#[must_use]
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_links_to_parent() {
        let full = Snapshot::full(Uuid::new_v4(), "home".to_string(), PathBuf::from("a.tar.gz"));
        let incr = Snapshot::incremental(&full, PathBuf::from("b.tar.gz"));
        let next = Snapshot::incremental(&incr, PathBuf::from("c.tar.gz"));

        assert_eq!(incr.kind, SnapshotKind::Incremental);
        assert_eq!(incr.parent_id, Some(full.id));
        assert_eq!(incr.set_id, full.set_id);
        assert_eq!(next.chain_depth, 2);
        assert_ne!(incr.id, full.id);
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [SnapshotKind::Full, SnapshotKind::Incremental] {
            assert_eq!(kind.as_str().parse::<SnapshotKind>().unwrap(), kind);
        }
        assert!("weekly".parse::<SnapshotKind>().is_err());
    }

    #[test]
    fn test_short_id_length() {
        let snap = Snapshot::full(Uuid::new_v4(), "x".to_string(), PathBuf::new());
        assert_eq!(snap.short_id().len(), 8);
        assert!(snap.id.simple().to_string().starts_with(&snap.short_id()));
    }
}
