//! Database migrations

use rusqlite::Connection;

use super::db::DatabaseError;

const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
///
/// # Errors
/// Returns an error if migrations fail
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "Catalog version {version} is newer than this build supports ({CURRENT_VERSION})"
        )));
    }

    if version < 1 {
        migrate_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", CURRENT_VERSION)?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        r"
        -- Backup sets
        -- Full set definition as JSON in data column
        CREATE TABLE IF NOT EXISTS backup_sets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Snapshots
        -- Snapshot record including its manifest as JSON in data column
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            set_id TEXT NOT NULL REFERENCES backup_sets(id) ON DELETE CASCADE,
            parent_id TEXT,
            kind TEXT NOT NULL,
            description TEXT,
            archive_path TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sets_name ON backup_sets(name);
        CREATE INDEX IF NOT EXISTS idx_snapshots_set ON snapshots(set_id, created_at);
        ",
    )?;

    Ok(())
}
