//! Represents an object (file or folder marker) held by the object store.

use crate::models::key::StorageKey;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A stored object with its full payload.
///
/// Created on put and replaced wholesale on overwrite. Handlers use it for a
/// single response and never keep it around.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub key: StorageKey,

    /// Raw payload bytes.
    pub content: Bytes,

    /// Content type recorded at upload time, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size: u64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    pub uploaded_at: DateTime<Utc>,
}

/// One row of a prefix listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata row as persisted in SQLite.
#[derive(Clone, Debug, FromRow)]
pub struct ObjectRow {
    pub key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: String,
    pub uploaded_at: DateTime<Utc>,

    /// Payload file relative to the store's base directory. Each put writes a
    /// fresh file, so the previous version stays intact until the row commits.
    pub payload: String,
}

impl From<ObjectRow> for ObjectEntry {
    fn from(row: ObjectRow) -> Self {
        Self {
            key: row.key,
            size: row.size_bytes.max(0) as u64,
            uploaded_at: row.uploaded_at,
        }
    }
}
