//! src/services/sqlite_store.rs
//!
//! SqliteObjectStore — object metadata in SQLite, payloads on local disk
//! sharded beneath `base_path/{shard}/{shard}/{md5(key)}-{version}`. Keys
//! never become filesystem paths, so folder markers and odd characters need
//! no special handling on disk.
//!
//! Every put writes a new payload file and points the row at it; the file it
//! replaces is removed only after the row update commits.

use crate::{
    models::{
        key::StorageKey,
        object::{ObjectEntry, ObjectRow, StoredObject},
    },
    services::object_store::{ObjectStore, StoreError, StoreResult, compute_etag},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl SqliteObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent, so this runs
    /// on each startup as well as in `--migrate` mode.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Fresh payload location for `key`, relative to `base_path`.
    fn payload_name(key: &StorageKey) -> String {
        let digest = md5::compute(key.as_str());
        format!(
            "{:02x}/{:02x}/{:x}-{}",
            digest[0],
            digest[1],
            digest,
            Uuid::new_v4().simple()
        )
    }

    fn payload_path(&self, payload: &str) -> PathBuf {
        self.base_path.join(payload)
    }

    async fn fetch_row(&self, key: &StorageKey) -> StoreResult<ObjectRow> {
        sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, uploaded_at, payload
             FROM objects WHERE key = ?",
        )
        .bind(key.as_str())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Write the payload to a temp file, fsync, then rename into place.
    async fn write_payload(&self, file_path: &Path, content: &[u8]) -> StoreResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(content).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    /// Point the row for `key` at `payload`, returning the payload it
    /// referenced before.
    async fn upsert_row(
        &self,
        key: &StorageKey,
        payload: &str,
        content: &[u8],
        content_type: Option<String>,
    ) -> StoreResult<Option<String>> {
        let mut tx = self.db.begin().await?;

        let previous = sqlx::query_scalar::<_, String>("SELECT payload FROM objects WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO objects (key, content_type, size_bytes, etag, uploaded_at, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at,
                payload = excluded.payload
            "#,
        )
        .bind(key.as_str())
        .bind(content_type)
        .bind(content.len() as i64)
        .bind(compute_etag(content))
        .bind(Utc::now())
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    /// Delete a payload file no row references any more.
    async fn remove_payload(&self, payload: &str) -> StoreResult<()> {
        let file_path = self.payload_path(payload);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Remove empty shard directories up to `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn get(&self, key: &StorageKey) -> StoreResult<StoredObject> {
        let row = self.fetch_row(key).await?;
        let content = match fs::read(self.payload_path(&row.payload)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        Ok(StoredObject {
            key: key.clone(),
            size: content.len() as u64,
            content,
            content_type: row.content_type,
            etag: row.etag,
            uploaded_at: row.uploaded_at,
        })
    }

    async fn put(
        &self,
        key: &StorageKey,
        content: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let payload = Self::payload_name(key);
        let file_path = self.payload_path(&payload);
        self.write_payload(&file_path, &content).await?;

        let previous = match self.upsert_row(key, &payload, &content, content_type).await {
            Ok(previous) => previous,
            Err(err) => {
                // The row still points at the previous payload; only the new
                // file is discarded.
                let _ = fs::remove_file(&file_path).await;
                if let Some(parent) = file_path.parent() {
                    self.prune_empty_dirs(parent).await;
                }
                return Err(err);
            }
        };
        debug!("stored {} ({} bytes)", key, content.len());

        if let Some(previous) = previous {
            if let Err(err) = self.remove_payload(&previous).await {
                warn!("failed to remove replaced payload {}: {}", previous, err);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> StoreResult<()> {
        let payload = sqlx::query_scalar::<_, String>(
            "DELETE FROM objects WHERE key = ? RETURNING payload",
        )
        .bind(key.as_str())
        .fetch_optional(&*self.db)
        .await?;

        match payload {
            Some(payload) => self.remove_payload(&payload).await,
            None => {
                debug!("delete of missing key {} is a no-op", key);
                Ok(())
            }
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        // substr keeps the comparison case-sensitive, unlike LIKE.
        let rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, uploaded_at, payload
             FROM objects
             WHERE substr(key, 1, length(?)) = ?
             ORDER BY key ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(ObjectEntry::from).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(StoreError::Backend(format!("unexpected result: {}", value)));
        }
        fs::metadata(&self.base_path).await?;
        Ok(())
    }
}
