//! In-memory TTL memoization for resolution and screening results.
//!
//! Entries are replaced wholesale and only expire; there is no other eviction.
//! Two concurrent misses on one key both run their producer and the last
//! writer wins, which is fine because producers are idempotent.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Defines the behavior of the cache for one lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise, run the producer and write its result to the cache. (Default)
    #[default]
    Use,
    /// Always run the producer, bypassing any cached entry,
    /// and write the new result to the cache.
    Refresh,
    /// Always run the producer and do not read from or write to the cache.
    Bypass,
}

/// Value returned by a memoized lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    pub cache_hit: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> CacheInner<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        self.map
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    fn put(&mut self, key: K, value: V, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let expires_at = Instant::now() + ttl;
        self.map.insert(key, CacheEntry { value, expires_at });
    }
}

/// Thread-safe TTL cache. Clones share the same entries.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Arc<RwLock<CacheInner<K, V>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn default_ttl(&self) -> Duration {
        self.inner.read().await.default_ttl
    }

    pub async fn is_disabled(&self) -> bool {
        self.default_ttl().await == Duration::ZERO
    }

    /// Live value for `key`, if any.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.read().await.get(key)
    }

    /// Stores `value`, replacing any previous entry. No-op when disabled.
    pub async fn put(&self, key: K, value: V, ttl_override: Option<Duration>) {
        let mut inner = self.inner.write().await;
        if inner.default_ttl == Duration::ZERO {
            return;
        }
        inner.put(key, value, ttl_override);
    }

    /// Returns the live entry for `key`, or runs `producer` and stores its
    /// result.
    pub async fn cached<F, Fut>(&self, key: K, mode: CacheMode, producer: F) -> Cached<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let result = self
            .try_cached(key, mode, || async move {
                Ok::<V, std::convert::Infallible>(producer().await)
            })
            .await;
        match result {
            Ok(cached) => cached,
            Err(never) => match never {},
        }
    }

    /// Like [`cached`](Self::cached) for fallible producers. Errors are
    /// returned as-is and never stored.
    pub async fn try_cached<F, Fut, E>(
        &self,
        key: K,
        mode: CacheMode,
        producer: F,
    ) -> Result<Cached<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if mode == CacheMode::Use {
            if let Some(value) = self.get(&key).await {
                debug!(key = ?key, "cache hit");
                return Ok(Cached {
                    value,
                    cache_hit: true,
                });
            }
        }

        debug!(key = ?key, mode = ?mode, "cache miss");
        let value = producer().await?;
        if mode != CacheMode::Bypass {
            self.put(key, value.clone(), None).await;
        }
        Ok(Cached {
            value,
            cache_hit: false,
        })
    }

    /// Remove expired entries.
    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.inner
            .write()
            .await
            .map
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn producer_runs_once_within_ttl_and_again_after_expiry() {
        let cache = TtlCache::<String, u32>::new(Duration::from_millis(100));
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let produce = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            7
        };

        let first = cache.cached("k".to_owned(), CacheMode::Use, produce).await;
        let second = cache.cached("k".to_owned(), CacheMode::Use, produce).await;
        assert_eq!(first.value, 7);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let third = cache.cached("k".to_owned(), CacheMode::Use, produce).await;
        assert!(!third.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_producers_are_not_stored() {
        let cache = TtlCache::<&'static str, u32>::new(Duration::from_secs(60));

        let failed = cache
            .try_cached("k", CacheMode::Use, || async { Err::<u32, &str>("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        assert!(cache.is_empty().await);

        let ok = cache
            .try_cached("k", CacheMode::Use, || async { Ok::<u32, &str>(1) })
            .await
            .expect("producer succeeds");
        assert_eq!(ok.value, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn refresh_replaces_and_bypass_skips_the_store() {
        let cache = TtlCache::<&'static str, u32>::new(Duration::from_secs(60));
        cache.put("k", 1, None).await;

        let refreshed = cache.cached("k", CacheMode::Refresh, || async { 2 }).await;
        assert!(!refreshed.cache_hit);
        assert_eq!(cache.get(&"k").await, Some(2));

        let bypassed = cache.cached("k", CacheMode::Bypass, || async { 3 }).await;
        assert_eq!(bypassed.value, 3);
        assert_eq!(cache.get(&"k").await, Some(2));
    }

    #[tokio::test]
    async fn ttl_override_and_clear_expired() {
        let cache = TtlCache::<&'static str, u32>::new(Duration::from_secs(60));
        cache.put("short", 1, Some(Duration::from_millis(50))).await;
        cache.put("long", 2, None).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(&"short").await.is_none());
        cache.clear_expired().await;
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = TtlCache::<&'static str, u32>::disabled();
        assert!(cache.is_disabled().await);

        cache.put("k", 1, None).await;
        assert!(cache.get(&"k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn cache_mode_default_is_use() {
        assert_eq!(CacheMode::default(), CacheMode::Use);
    }
}
