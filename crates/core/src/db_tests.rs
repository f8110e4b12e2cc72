// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Tests for the SQLite-backed store.

#![allow(clippy::unwrap_used)]

use super::*;
use crate::store::KvStore;
use tempfile::tempdir;

#[tokio::test]
async fn sqlite_store_put_get_delete() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("sync.db")).unwrap();

    assert_eq!(store.get("queue").await.unwrap(), None);

    store.put("queue", "[]").await.unwrap();
    assert_eq!(store.get("queue").await.unwrap().as_deref(), Some("[]"));

    store.delete("queue").await.unwrap();
    assert_eq!(store.get("queue").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_store_overwrites_existing_key() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("sync.db")).unwrap();

    store.put("buffer", "old").await.unwrap();
    store.put("buffer", "new").await.unwrap();

    assert_eq!(store.get("buffer").await.unwrap().as_deref(), Some("new"));
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sync.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.put("queue", "[1,2,3]").await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
        store.get("queue").await.unwrap().as_deref(),
        Some("[1,2,3]")
    );
}

#[tokio::test]
async fn sqlite_store_keys_are_independent() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("sync.db")).unwrap();

    store.put("queue", "a").await.unwrap();
    store.put("buffer", "b").await.unwrap();
    store.delete("queue").await.unwrap();

    assert_eq!(store.get("buffer").await.unwrap().as_deref(), Some("b"));
}
