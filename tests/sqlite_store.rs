//! SQLite Store Tests
//!
//! Runs `SqliteObjectStore` against a throwaway database and payload
//! directory under `tempfile`.

use bytes::Bytes;
use dav_gateway::{
    models::key::StorageKey,
    services::{
        object_store::{ObjectStore, StoreError, compute_etag},
        sqlite_store::SqliteObjectStore,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SqliteObjectStore {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("meta.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap();
    let store = SqliteObjectStore::new(Arc::new(pool), dir.path().join("objects"));
    store.migrate().await.unwrap();
    store
}

fn key(raw: &str) -> StorageKey {
    StorageKey::new(raw).unwrap()
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

#[tokio::test]
async fn test_put_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let payload = Bytes::from_static(b"%PDF-1.7 not really");

    store
        .put(&key("docs/a.pdf"), payload.clone(), Some("application/pdf".into()))
        .await
        .unwrap();
    let object = store.get(&key("docs/a.pdf")).await.unwrap();

    assert_eq!(object.content, payload);
    assert_eq!(object.size, payload.len() as u64);
    assert_eq!(object.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(object.etag, compute_etag(&payload));
    assert_eq!(count_files(&dir.path().join("objects")), 1);
}

#[tokio::test]
async fn test_overwrite_replaces_payload_and_metadata() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .put(&key("note.txt"), Bytes::from_static(b"first"), None)
        .await
        .unwrap();
    store
        .put(&key("note.txt"), Bytes::from_static(b"second take"), Some("text/plain".into()))
        .await
        .unwrap();

    let object = store.get(&key("note.txt")).await.unwrap();
    assert_eq!(&object.content[..], b"second take");
    assert_eq!(object.size, 11);
    assert_eq!(object.content_type.as_deref(), Some("text/plain"));

    let listed = store.list("").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].size, 11);
    assert_eq!(count_files(&dir.path().join("objects")), 1);
}

#[tokio::test]
async fn test_failed_overwrite_keeps_previous_version() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .put(&key("doc.txt"), Bytes::from_static(b"original"), Some("text/plain".into()))
        .await
        .unwrap();

    sqlx::query(
        "CREATE TRIGGER reject_updates BEFORE UPDATE ON objects
         BEGIN SELECT RAISE(ABORT, 'updates disabled'); END",
    )
    .execute(&*store.db)
    .await
    .unwrap();

    let err = store
        .put(&key("doc.txt"), Bytes::from_static(b"replacement"), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("updates disabled"), "{err}");

    sqlx::query("DROP TRIGGER reject_updates")
        .execute(&*store.db)
        .await
        .unwrap();

    let object = store.get(&key("doc.txt")).await.unwrap();
    assert_eq!(&object.content[..], b"original");
    assert_eq!(object.content_type.as_deref(), Some("text/plain"));
    assert_eq!(count_files(&dir.path().join("objects")), 1);
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let err = store.get(&key("ghost.bin")).await.unwrap_err();

    assert!(matches!(err, StoreError::NotFound(k) if k == "ghost.bin"));
}

#[tokio::test]
async fn test_list_is_prefix_scoped_case_sensitive_and_ordered() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    for raw in ["x/b.txt", "x/a.txt", "X/upper.txt", "xy/c.txt", "x/sub/deep.txt", "root.txt"] {
        store
            .put(&key(raw), Bytes::from_static(b"data"), None)
            .await
            .unwrap();
    }

    let keys: Vec<String> = store
        .list("x/")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(keys, vec!["x/a.txt", "x/b.txt", "x/sub/deep.txt"]);

    assert_eq!(store.list("").await.unwrap().len(), 6);
    assert!(store.list("nothing/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_folder_markers_are_listed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .put(&key("albums/"), Bytes::new(), None)
        .await
        .unwrap();

    let listed = store.list("albums/").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "albums/");
    assert_eq!(listed[0].size, 0);
}

#[tokio::test]
async fn test_delete_is_idempotent_and_removes_payload() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .put(&key("tmp/scratch.bin"), Bytes::from_static(b"scratch"), None)
        .await
        .unwrap();

    store.delete(&key("tmp/scratch.bin")).await.unwrap();
    store.delete(&key("tmp/scratch.bin")).await.unwrap();

    assert!(matches!(
        store.get(&key("tmp/scratch.bin")).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(store.list("tmp/").await.unwrap().is_empty());
    assert_eq!(count_files(&dir.path().join("objects")), 0);
}

#[tokio::test]
async fn test_migrate_twice_and_ping() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .put(&key("kept.txt"), Bytes::from_static(b"kept"), None)
        .await
        .unwrap();

    store.migrate().await.unwrap();
    store.ping().await.unwrap();

    assert_eq!(store.list("").await.unwrap().len(), 1);
}
