//! Shared handles injected into every handler.

use crate::{
    models::key::StorageKey,
    services::{
        background::Detached,
        edge_cache::{CacheInvalidator, EdgeCache},
        object_store::ObjectStore,
    },
};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub cache: Arc<dyn EdgeCache>,
    pub invalidator: CacheInvalidator,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, cache: Arc<dyn EdgeCache>, tasks: Detached) -> Self {
        let invalidator = CacheInvalidator::new(cache.clone(), tasks);
        Self {
            store,
            cache,
            invalidator,
        }
    }

    /// Fire-and-forget eviction of the listing that shows `key`. A failure to
    /// schedule never affects the mutation's response.
    pub fn evict_parent_listing(&self, key: &StorageKey) {
        let url = key.parent_listing_url();
        if let Err(err) = self.invalidator.schedule_evict(url.clone()) {
            warn!(url = %url, error = %err, "could not schedule cache eviction");
        }
    }
}
