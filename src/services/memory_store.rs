//! In-process object store for ephemeral deployments and tests.

use crate::{
    models::{
        key::StorageKey,
        object::{ObjectEntry, StoredObject},
    },
    services::object_store::{ObjectStore, StoreError, StoreResult, compute_etag},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &StorageKey) -> StoreResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(
        &self,
        key: &StorageKey,
        content: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        let object = StoredObject {
            key: key.clone(),
            size: content.len() as u64,
            etag: compute_etag(&content),
            content,
            content_type,
            uploaded_at: Utc::now(),
        };
        self.objects
            .write()
            .await
            .insert(key.as_str().to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> StoreResult<()> {
        self.objects.write().await.remove(key.as_str());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectEntry {
                key: key.clone(),
                size: object.size,
                uploaded_at: object.uploaded_at,
            })
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
