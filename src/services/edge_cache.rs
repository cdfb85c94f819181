//! Edge response cache for collection listings and the invalidator that
//! keeps it consistent with mutations.
//!
//! Entries are keyed by the canonical listing URL (`/dav`, `/dav/a/b`), so a
//! listing reached through `GET /dav/a/b`, `PROPFIND /a/b` or `GET /a/b/`
//! shares one entry.

use crate::services::background::{Detached, SpawnError};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Proof that a lookup missed, handed back to [`EdgeCache::store`].
///
/// A fill is accepted only if no eviction of the same URL happened since the
/// miss, so a listing rendered from a snapshot taken before a mutation can
/// never be written back after that mutation's eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Bytes),
    Miss(FillTicket),
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn lookup(&self, url: &str) -> CacheLookup;

    /// Insert `body` for `url` if `ticket` is still current. Returns whether
    /// the entry was stored.
    async fn store(&self, url: &str, ticket: FillTicket, body: Bytes) -> bool;

    /// Remove the entry for `url` and invalidate outstanding fill tickets.
    /// Returns whether an entry was present; a missing entry is not an error.
    async fn evict(&self, url: &str) -> CacheResult<bool>;
}

struct CachedListing {
    body: Bytes,
    seq: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CachedListing>,
    /// Outstanding fill ticket per URL, handed out on a miss.
    pending: HashMap<String, u64>,
    next_seq: u64,
}

impl CacheInner {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Bounded in-process cache; at capacity the oldest entry is replaced.
pub struct MemoryEdgeCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl MemoryEdgeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

#[async_trait]
impl EdgeCache for MemoryEdgeCache {
    async fn lookup(&self, url: &str) -> CacheLookup {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(url) {
            return CacheLookup::Hit(entry.body.clone());
        }

        // Abandoned tickets (failed listings) must not grow without bound;
        // dropping one only means that fill is skipped.
        if !inner.pending.contains_key(url) && inner.pending.len() >= self.capacity {
            let oldest = inner
                .pending
                .iter()
                .min_by_key(|(_, seq)| **seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.pending.remove(&oldest);
            }
        }
        let seq = inner.next_seq();
        inner.pending.insert(url.to_string(), seq);
        CacheLookup::Miss(FillTicket(seq))
    }

    async fn store(&self, url: &str, ticket: FillTicket, body: Bytes) -> bool {
        let mut inner = self.inner.write().await;
        if inner.pending.get(url) != Some(&ticket.0) {
            debug!(url = %url, "dropping fill from an outdated snapshot");
            return false;
        }
        inner.pending.remove(url);

        if !inner.entries.contains_key(url) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        let seq = inner.next_seq();
        inner.entries.insert(url.to_string(), CachedListing { body, seq });
        true
    }

    async fn evict(&self, url: &str) -> CacheResult<bool> {
        let mut inner = self.inner.write().await;
        inner.pending.remove(url);
        Ok(inner.entries.remove(url).is_some())
    }
}

/// Schedules evictions as detached tasks.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn EdgeCache>,
    tasks: Detached,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn EdgeCache>, tasks: Detached) -> Self {
        Self { cache, tasks }
    }

    /// Submit an eviction and return immediately. Only fails when the task
    /// queue no longer accepts work; the eviction's own outcome is logged.
    pub fn schedule_evict(&self, url: String) -> CacheResult<()> {
        let cache = self.cache.clone();
        self.tasks.spawn(async move {
            match cache.evict(&url).await {
                Ok(true) => debug!(url = %url, "evicted cached listing"),
                Ok(false) => debug!(url = %url, "no cached listing to evict"),
                Err(err) => warn!(url = %url, error = %err, "cache eviction failed"),
            }
        })?;
        Ok(())
    }
}
