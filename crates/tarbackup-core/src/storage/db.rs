//! Database connection management

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use super::migrations;

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt catalog record: {0}")]
    Corrupt(String),

    #[error("A backup set named '{0}' already exists")]
    DuplicateName(String),

    #[error("Snapshot id prefix '{0}' is ambiguous")]
    AmbiguousId(String),
}

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a catalog at the given path
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Migration(format!("Cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;

        // Off by default in SQLite; snapshots cascade with their set
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // WAL lets `backup list` run while a backup is writing
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Under WAL, NORMAL only risks the last commit on power loss
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing)
    ///
    /// # Errors
    /// Returns an error if the database cannot be created
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
