//! Catalog storage (`SQLite`)

pub mod db;
pub mod migrations;
pub mod sets;
pub mod snapshots;

pub use db::{Database, DatabaseError};
pub use sets::SetStore;
pub use snapshots::{SnapshotStore, SnapshotSummary};
