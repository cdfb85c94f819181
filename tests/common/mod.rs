//! Shared fixtures: substitutable store and cache fakes plus request helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, Response},
};
use dav_gateway::{
    models::{
        key::StorageKey,
        object::{ObjectEntry, StoredObject},
    },
    routes::routes,
    services::{
        background::Detached,
        edge_cache::{CacheLookup, CacheResult, EdgeCache, FillTicket, MemoryEdgeCache},
        memory_store::MemoryObjectStore,
        object_store::{ObjectStore, StoreError, StoreResult},
    },
    state::AppState,
};
use http_body_util::BodyExt;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

pub const BOUNDARY: &str = "gateway-test-boundary";

/// Memory store that fails puts for keys containing `fail_marker` and, when
/// asked, every listing. With `list_hold` set, `list` takes its snapshot,
/// signals `taken`, then waits on `release` before returning it.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryObjectStore,
    pub fail_marker: Option<&'static str>,
    pub fail_list: bool,
    pub list_hold: Option<ListHold>,
}

#[derive(Clone)]
pub struct ListHold {
    pub taken: Arc<Notify>,
    pub release: Arc<Semaphore>,
}

impl ListHold {
    pub fn new() -> Self {
        Self {
            taken: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, key: &StorageKey) -> StoreResult<StoredObject> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &StorageKey,
        content: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        if let Some(marker) = self.fail_marker {
            if key.as_str().contains(marker) {
                return Err(StoreError::Backend(format!("disk full while writing {}", key)));
            }
        }
        self.inner.put(key, content, content_type).await
    }

    async fn delete(&self, key: &StorageKey) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        if self.fail_list {
            return Err(StoreError::Backend("listing backend unavailable".into()));
        }
        let entries = self.inner.list(prefix).await?;
        if let Some(hold) = &self.list_hold {
            hold.taken.notify_one();
            hold.release.acquire().await.expect("hold closed").forget();
        }
        Ok(entries)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Memory cache that records every eviction and can hold evictions until the
/// test releases them.
pub struct RecordingCache {
    pub inner: MemoryEdgeCache,
    pub evictions: Mutex<Vec<String>>,
    pub gate: Option<Arc<Semaphore>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryEdgeCache::new(64),
            evictions: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn evictions(&self) -> Vec<String> {
        self.evictions.lock().unwrap().clone()
    }
}

#[async_trait]
impl EdgeCache for RecordingCache {
    async fn lookup(&self, url: &str) -> CacheLookup {
        self.inner.lookup(url).await
    }

    async fn store(&self, url: &str, ticket: FillTicket, body: Bytes) -> bool {
        self.inner.store(url, ticket, body).await
    }

    async fn evict(&self, url: &str) -> CacheResult<bool> {
        self.evictions.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.inner.evict(url).await
    }
}

pub struct TestApp {
    pub router: Router,
    pub cache: Arc<RecordingCache>,
    pub tasks: Detached,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(FlakyStore::default(), RecordingCache::new())
    }

    pub fn with(store: FlakyStore, cache: RecordingCache) -> Self {
        let cache = Arc::new(cache);
        let tasks = Detached::new();
        let state = AppState::new(Arc::new(store), cache.clone(), tasks.clone());
        Self {
            router: routes::app(state, 10 * 1024 * 1024),
            cache,
            tasks,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn request(&self, method: &str, uri: &str, body: impl Into<Body>) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(body.into())
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, uri: &str, files: &[(&str, &str)]) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(files)))
                .unwrap(),
        )
        .await
    }

    /// Wait until every scheduled background task has finished.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.tasks.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("background tasks did not settle");
    }
}

/// A form with one text field followed by one file part per entry.
pub fn multipart_body(files: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nholiday photos\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    for (filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}
