//! SQLite-backed key-value store.
//!
//! For embeddings that want durable state without bringing their own
//! storage. One `kv` table, JSON text values, whole-value replace per key.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{CompareError, Result};
use crate::store::KeyValueStore;

/// A [`KeyValueStore`] persisted in a single SQLite table.
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn open(path: &str) -> Result<Self> {
        let db = Connection::open(path).map_err(CompareError::storage)?;
        Self::with_connection(db)
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().map_err(CompareError::storage)?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(CompareError::storage)?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let text: Option<String> = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(CompareError::storage)?;

        match text {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| CompareError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value).map_err(|e| CompareError::Internal {
            message: format!("value encode: {}", e),
        })?;
        self.db
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, text],
            )
            .map_err(CompareError::storage)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(CompareError::storage)?;
        Ok(())
    }
}
