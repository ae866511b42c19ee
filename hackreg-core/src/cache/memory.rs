//! In-process cache store on moka

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheError, CacheKey, CacheStore};
use crate::config::CacheConfig;
use crate::query::RawResult;

/// Bounded, TTL-evicting result cache.
///
/// Entries expire `ttl_secs` after insertion. Concurrent writers to the same
/// key race and the last one wins.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<CacheKey, Arc<RawResult>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        tracing::info!(
            ttl_secs = config.ttl_secs,
            max_entries = config.max_entries,
            "initializing result cache"
        );
        let inner = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self { inner }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RawResult>>, CacheError> {
        Ok(self.inner.get(key).await)
    }

    async fn set(&self, key: CacheKey, value: Arc<RawResult>) -> Result<(), CacheError> {
        self.inner.insert(key, value).await;
        Ok(())
    }
}
