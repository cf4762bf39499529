use super::{CacheEntry, CacheStats};
use crate::models::Suggestion;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::RwLock;

/// Ranked suggestion lists keyed by normalized query.
///
/// Capacity-bounded with least-recently-used eviction; a read of a live entry
/// counts as a use. Expiry is checked lazily when an entry is read.
pub struct SuggestionCache {
    cache: RwLock<LruCache<String, CacheEntry<Vec<Suggestion>>>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
}

impl SuggestionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            stats: RwLock::new(CacheStats::new()),
            ttl,
        }
    }

    /// Live entry for `key`, refreshing its recency. Expired entries are removed.
    pub async fn get(&self, key: &str) -> Option<Vec<Suggestion>> {
        let mut cache = self.cache.write().await;
        let mut stats = self.stats.write().await;

        let expired = match cache.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                stats.record_hit();
                return Some(entry.access().clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            cache.pop(key);
            stats.record_expiration();
        }
        stats.record_miss();
        stats.entries = cache.len();
        None
    }

    /// Store a ranked list with a fresh timestamp
    pub async fn put(&self, key: String, suggestions: Vec<Suggestion>) {
        self.put_if(key, suggestions, || true).await;
    }

    /// Store a ranked list only if `condition` still holds once the write lock
    /// is held. Returns whether the list was stored.
    pub async fn put_if<F>(&self, key: String, suggestions: Vec<Suggestion>, condition: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut cache = self.cache.write().await;
        if !condition() {
            return false;
        }
        let entry = CacheEntry::new(suggestions, self.ttl);

        // push() hands back the displaced LRU entry only when a new key overflows
        if let Some((evicted_key, _)) = cache.push(key.clone(), entry) {
            if evicted_key != key {
                self.stats.write().await.record_eviction();
            }
        }
        self.stats.write().await.entries = cache.len();
        true
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.read().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
        self.stats.write().await.entries = 0;
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().await.clone();
        stats.entries = self.cache.read().await.len();
        stats
    }
}
