//! Snapshot storage operations

use crate::snapshot::{Snapshot, SnapshotKind};
use crate::storage::db::DatabaseError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use uuid::Uuid;

/// Shortest id prefix accepted by [`SnapshotStore::find`]
pub const MIN_PREFIX_LEN: usize = 4;

/// Snapshot storage operations
pub struct SnapshotStore<'a> {
    conn: &'a Connection,
}

impl<'a> SnapshotStore<'a> {
    /// Create a new snapshot store
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a new snapshot
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be stored
    pub fn create(&self, snapshot: &Snapshot) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| DatabaseError::Corrupt(format!("Failed to serialize snapshot: {e}")))?;

        self.conn.execute(
            r"
            INSERT INTO snapshots (id, set_id, parent_id, kind, description, archive_path, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                snapshot.id.to_string(),
                snapshot.set_id.to_string(),
                snapshot.parent_id.map(|id| id.to_string()),
                snapshot.kind.as_str(),
                snapshot.description,
                snapshot.archive_path.display().to_string(),
                json,
                sortable_timestamp(snapshot.created_at),
            ],
        )?;

        Ok(())
    }

    /// Get a snapshot by ID
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be retrieved
    pub fn get(&self, id: Uuid) -> Result<Option<Snapshot>, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM snapshots WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| parse_snapshot(&json)).transpose()
    }

    /// Look a snapshot up by full id or by a unique prefix of at least
    /// [`MIN_PREFIX_LEN`] hex digits
    ///
    /// # Errors
    /// Returns an error if the prefix matches several snapshots
    pub fn find(&self, identifier: &str) -> Result<Option<Snapshot>, DatabaseError> {
        if let Ok(id) = Uuid::parse_str(identifier) {
            return self.get(id);
        }

        let prefix: String = identifier
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        if prefix.len() < MIN_PREFIX_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            r"
            SELECT data FROM snapshots
            WHERE replace(id, '-', '') LIKE ?1 || '%'
            LIMIT 2
            ",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }

        match matches.len() {
            0 => Ok(None),
            1 => parse_snapshot(&matches[0]).map(Some),
            _ => Err(DatabaseError::AmbiguousId(identifier.to_string())),
        }
    }

    /// Most recent snapshot of a set
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be retrieved
    pub fn latest_for_set(&self, set_id: Uuid) -> Result<Option<Snapshot>, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row(
                r"
                SELECT data FROM snapshots
                WHERE set_id = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
                ",
                params![set_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| parse_snapshot(&json)).transpose()
    }

    /// All snapshots of a set with their manifests, newest first
    ///
    /// # Errors
    /// Returns an error if the snapshots cannot be listed
    pub fn list_for_set(&self, set_id: Uuid) -> Result<Vec<Snapshot>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT data FROM snapshots
            WHERE set_id = ?1
            ORDER BY created_at DESC, rowid DESC
            ",
        )?;
        let rows = stmt.query_map(params![set_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(parse_snapshot(&row?)?);
        }
        Ok(snapshots)
    }

    /// Summaries of every snapshot (optionally of one set), newest first
    ///
    /// # Errors
    /// Returns an error if the snapshots cannot be listed
    pub fn list_summaries(&self, set_id: Option<Uuid>) -> Result<Vec<SnapshotSummary>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT s.id, s.set_id, b.name, s.parent_id, s.kind, s.description,
                   s.archive_path, s.created_at,
                   json_extract(s.data, '$.stats.files_total'),
                   json_extract(s.data, '$.stats.files_stored'),
                   json_extract(s.data, '$.stats.bytes_stored')
            FROM snapshots s
            JOIN backup_sets b ON b.id = s.set_id
            WHERE ?1 IS NULL OR s.set_id = ?1
            ORDER BY s.created_at DESC, s.rowid DESC
            ",
        )?;

        let rows = stmt.query_map(params![set_id.map(|id| id.to_string())], read_summary_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_summary()?);
        }
        Ok(summaries)
    }

    /// Delete a snapshot record (does not delete the archive file)
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be deleted
    pub fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let deleted = self.conn.execute(
            "DELETE FROM snapshots WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(deleted > 0)
    }
}

/// Snapshot summary (without the manifest)
#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub set_id: Uuid,
    pub set_name: String,
    pub parent_id: Option<Uuid>,
    pub kind: SnapshotKind,
    pub description: Option<String>,
    pub archive_path: PathBuf,
    pub files_total: u64,
    pub files_stored: u64,
    pub bytes_stored: u64,
    pub created_at: DateTime<Utc>,
}

struct SummaryRow {
    id: String,
    set_id: String,
    set_name: String,
    parent_id: Option<String>,
    kind: String,
    description: Option<String>,
    archive_path: String,
    created_at: String,
    files_total: Option<i64>,
    files_stored: Option<i64>,
    bytes_stored: Option<i64>,
}

fn read_summary_row(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        id: row.get(0)?,
        set_id: row.get(1)?,
        set_name: row.get(2)?,
        parent_id: row.get(3)?,
        kind: row.get(4)?,
        description: row.get(5)?,
        archive_path: row.get(6)?,
        created_at: row.get(7)?,
        files_total: row.get(8)?,
        files_stored: row.get(9)?,
        bytes_stored: row.get(10)?,
    })
}

impl SummaryRow {
    fn into_summary(self) -> Result<SnapshotSummary, DatabaseError> {
        let count = |v: Option<i64>| v.and_then(|n| u64::try_from(n).ok()).unwrap_or(0);

        Ok(SnapshotSummary {
            id: parse_uuid(&self.id)?,
            set_id: parse_uuid(&self.set_id)?,
            set_name: self.set_name,
            parent_id: self.parent_id.as_deref().map(parse_uuid).transpose()?,
            kind: self.kind.parse().map_err(DatabaseError::Corrupt)?,
            description: self.description,
            archive_path: PathBuf::from(self.archive_path),
            files_total: count(self.files_total),
            files_stored: count(self.files_stored),
            bytes_stored: count(self.bytes_stored),
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| DatabaseError::Corrupt(format!("Invalid datetime: {e}")))?
                .with_timezone(&Utc),
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Corrupt(format!("Invalid UUID: {e}")))
}

fn parse_snapshot(json: &str) -> Result<Snapshot, DatabaseError> {
    serde_json::from_str(json)
        .map_err(|e| DatabaseError::Corrupt(format!("Failed to parse snapshot: {e}")))
}

/// Fixed-width timestamp so `ORDER BY created_at` is chronological
fn sortable_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
