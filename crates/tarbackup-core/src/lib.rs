//! tarbackup core - backup sets, tar.gz snapshots, and the catalog
//!
//! This crate provides change detection, archive creation, restore,
//! verification and retention for tar-based backups, plus the `SQLite`
//! catalog that records sets and snapshots.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod archive;
pub mod backup;
pub mod changes;
pub mod config;
pub mod exclude;
pub mod manifest;
pub mod scan;
pub mod set;
pub mod snapshot;
pub mod storage;
pub mod util;

pub use config::Config;
pub use manifest::{Manifest, ManifestEntry};
pub use set::BackupSet;
pub use snapshot::{Snapshot, SnapshotKind};
