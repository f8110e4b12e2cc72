// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! SQLite-backed key-value store.
//!
//! The production persistence backend: a single database file holding the
//! engine snapshots. WAL journal mode keeps readers from blocking the writer;
//! `synchronous = FULL` makes a committed write durable before `put` returns.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::store::{KvStore, StoreResult};

/// SQL schema for the snapshot table.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQLite-backed [`KvStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.lock();
            let value = conn
                .query_row(
                    "SELECT value FROM snapshots WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    fn put(&self, key: &str, value: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let conn = self.lock();
            conn.execute(
                "INSERT INTO snapshots (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.lock();
            conn.execute("DELETE FROM snapshots WHERE key = ?1", params![key])?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
