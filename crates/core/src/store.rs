// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Durable key-value persistence for engine snapshots.
//!
//! The engine persists two independent snapshots - the mutation queue and the
//! realtime outbound buffer - each under its own key. A completed `put` must
//! be durable before the returned future resolves, so the only unrecoverable
//! loss window after a crash is a single in-flight network call.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value store the sync engine keeps its snapshots in.
///
/// Methods return boxed futures so the engine can await persistence without
/// committing to a particular backend.
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>>;

    /// Durably stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>>;

    /// Removes the value stored under `key`. Removing a missing key is not
    /// an error.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>>;
}

/// In-memory store.
///
/// Used in tests and as the in-process fallback when a durable backend is
/// unavailable; contents do not survive a restart.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.lock().get(&key).cloned()) })
    }

    fn put(&self, key: &str, value: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            self.lock().insert(key, value);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.lock().remove(&key);
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
