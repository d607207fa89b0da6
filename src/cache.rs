//! Cache abstraction for persisting the serialized pattern dataset.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Storage for serialized pattern datasets.
///
/// Implementations take opaque byte payloads so hosts can plug in whatever
/// store they already run. Entries must expire after the TTL given at
/// write time.
#[async_trait]
pub trait PatternCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

#[derive(Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache used when the host does not supply its own store.
pub struct MemoryCache {
    inner: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let inner = Cache::builder()
            .max_capacity(64)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatternCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.map(|entry| entry.bytes)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let entry = CacheEntry { bytes: value, ttl };
        self.inner.insert(key.to_string(), entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_basic() {
        let cache = MemoryCache::new();

        assert!(cache.get("missing").await.is_none());

        cache
            .set("key", b"payload".to_vec(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("key").await, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_overwrite() {
        let cache = MemoryCache::new();

        cache
            .set("key", b"first".to_vec(), Duration::from_secs(60))
            .await;
        cache
            .set("key", b"second".to_vec(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("key").await, Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new();

        cache
            .set("key", b"payload".to_vec(), Duration::from_millis(50))
            .await;
        assert!(cache.get("key").await.is_some());

        // Wait for expiry
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get("key").await.is_none());
    }
}
