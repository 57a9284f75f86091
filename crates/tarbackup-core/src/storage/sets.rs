//! Backup set storage operations (CRUD)

use crate::set::BackupSet;
use crate::storage::db::DatabaseError;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Backup set storage operations
pub struct SetStore<'a> {
    conn: &'a Connection,
}

impl<'a> SetStore<'a> {
    /// Create a new set store
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new backup set
    ///
    /// # Errors
    /// Returns an error if the name is taken or the set cannot be stored
    pub fn create(&self, set: &BackupSet) -> Result<(), DatabaseError> {
        if self.get_by_name(&set.name)?.is_some() {
            return Err(DatabaseError::DuplicateName(set.name.clone()));
        }

        let json = serde_json::to_string(set)
            .map_err(|e| DatabaseError::Corrupt(format!("Failed to serialize set: {e}")))?;

        self.conn.execute(
            r"
            INSERT INTO backup_sets (id, name, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                set.id.to_string(),
                set.name,
                json,
                set.created_at.to_rfc3339(),
                set.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a set by ID
    ///
    /// # Errors
    /// Returns an error if the set cannot be retrieved
    pub fn get(&self, id: Uuid) -> Result<Option<BackupSet>, DatabaseError> {
        self.query_one("SELECT data FROM backup_sets WHERE id = ?1", &id.to_string())
    }

    /// Get a set by name
    ///
    /// # Errors
    /// Returns an error if the set cannot be retrieved
    pub fn get_by_name(&self, name: &str) -> Result<Option<BackupSet>, DatabaseError> {
        self.query_one("SELECT data FROM backup_sets WHERE name = ?1", name)
    }

    fn query_one(&self, sql: &str, key: &str) -> Result<Option<BackupSet>, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;

        json.map(|json| parse_set(&json)).transpose()
    }

    /// List all sets, by name
    ///
    /// # Errors
    /// Returns an error if the sets cannot be listed
    pub fn list(&self) -> Result<Vec<BackupSet>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM backup_sets ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut sets = Vec::new();
        for row in rows {
            sets.push(parse_set(&row?)?);
        }
        Ok(sets)
    }

    /// Update an existing set
    ///
    /// # Errors
    /// Returns an error if the set cannot be updated
    pub fn update(&self, set: &BackupSet) -> Result<bool, DatabaseError> {
        let json = serde_json::to_string(set)
            .map_err(|e| DatabaseError::Corrupt(format!("Failed to serialize set: {e}")))?;

        let updated = self.conn.execute(
            r"
            UPDATE backup_sets SET name = ?2, data = ?3, updated_at = ?4
            WHERE id = ?1
            ",
            params![
                set.id.to_string(),
                set.name,
                json,
                set.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(updated > 0)
    }

    /// Delete a set and, through the foreign key, its snapshot records.
    /// Archive files are left to the caller.
    ///
    /// # Errors
    /// Returns an error if the set cannot be deleted
    pub fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let deleted = self.conn.execute(
            "DELETE FROM backup_sets WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(deleted > 0)
    }
}

fn parse_set(json: &str) -> Result<BackupSet, DatabaseError> {
    serde_json::from_str(json)
        .map_err(|e| DatabaseError::Corrupt(format!("Failed to parse backup set: {e}")))
}
