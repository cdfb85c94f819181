//! The object store contract the handlers depend on.

use crate::models::{
    key::StorageKey,
    object::{ObjectEntry, StoredObject},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Flat key-value storage of binary objects.
///
/// - `put` overwrites and must be atomic from the caller's point of view.
/// - `delete` is idempotent: removing a missing key succeeds.
/// - `list` returns every key starting with `prefix`, in no particular order.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &StorageKey) -> StoreResult<StoredObject>;

    async fn put(
        &self,
        key: &StorageKey,
        content: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()>;

    async fn delete(&self, key: &StorageKey) -> StoreResult<()>;

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>>;

    /// Cheap round-trip used by the readiness probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Hex MD5 of a payload, used as the etag.
pub fn compute_etag(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}
