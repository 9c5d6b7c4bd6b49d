//! Typed query helpers for the `kv_state` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;

impl Database {
    /// Get a key-value state entry.
    pub fn get_state(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Set a key-value state entry (upsert).
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        debug!(key, "set kv_state");
        Ok(())
    }

    /// Remove a key-value state entry. Removing a missing key is not an error.
    pub fn delete_state(&self, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
