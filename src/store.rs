//! Storage abstraction: `fetch`, `cache`, `update` by key, plus the
//! in-memory implementation bundled with this crate.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::entry::CacheEntry;

/// Storage backend contract. `fetch` never fails observably — a backend
/// error is equivalent to a miss, kept opaque to the middleware.
/// Implementations must serve all three operations safely under concurrent
/// access from background revalidation and foreground requests.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the entry stored under `key`, or `None` on a miss or backend
    /// error.
    async fn fetch(&self, key: &str) -> Option<CacheEntry>;

    /// Stores `entry` under `key` as a new entry, overwriting any existing
    /// entry for that key: at most one entry exists per key at any instant.
    async fn cache(&self, key: &str, entry: CacheEntry);

    /// Semantically a store, distinguished from [`CacheStore::cache`] so a
    /// backend can record revalidation hits separately if it wants to.
    async fn update(&self, key: &str, entry: CacheEntry);
}

/// An in-memory [`CacheStore`] backed by a concurrent hash map. Safe to
/// clone and share across tasks; clones refer to the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the entry stored under `key`, if any. Not part of the core
    /// [`CacheStore`] contract: this crate imposes no destruction policy of
    /// its own beyond supporting deletion, leaving eviction (LRU, TTL,
    /// manual) to the integrator.
    pub fn evict(&self, key: &str) {
        self.entries.remove(key);
    }

    /// The number of entries currently stored. Exposed for eviction-policy
    /// wiring and tests; not part of the core contract.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the store currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn fetch(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    async fn cache(&self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    async fn update(&self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{CachedResponse, SerializableHeaders};
    use http::StatusCode;
    use std::time::SystemTime;

    fn entry(body: &'static str) -> CacheEntry {
        let now = SystemTime::now();
        CacheEntry::new(
            now,
            now,
            CachedResponse {
                status: StatusCode::OK,
                headers: SerializableHeaders::default(),
                body: bytes::Bytes::from_static(body.as_bytes()),
            },
            None,
        )
    }

    #[tokio::test]
    async fn round_trips_cached_entry() {
        let store = InMemoryCacheStore::new();
        store.cache("k", entry("hello")).await;
        let fetched = store.fetch("k").await.expect("entry should be present");
        assert_eq!(&fetched.original_response.body[..], b"hello");
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let store = InMemoryCacheStore::new();
        assert!(store.fetch("missing").await.is_none());
    }

    #[tokio::test]
    async fn cache_overwrites_existing_key() {
        let store = InMemoryCacheStore::new();
        store.cache("k", entry("first")).await;
        store.cache("k", entry("second")).await;
        assert_eq!(store.len(), 1);
        let fetched = store.fetch("k").await.unwrap();
        assert_eq!(&fetched.original_response.body[..], b"second");
    }

    #[tokio::test]
    async fn idempotent_cache_calls() {
        let store = InMemoryCacheStore::new();
        store.cache("k", entry("same")).await;
        store.cache("k", entry("same")).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn evict_removes_entry() {
        let store = InMemoryCacheStore::new();
        store.cache("k", entry("bye")).await;
        store.evict("k");
        assert!(store.fetch("k").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_writes_are_serialized() {
        let store = Arc::new(InMemoryCacheStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.cache(&format!("k{i}"), entry("x")).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 16);
    }
}
