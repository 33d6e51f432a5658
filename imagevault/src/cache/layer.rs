//! Read-through composition of the TTL cache and request coalescing.

use crate::cache::singleflight::{FlightStats, Group};
use crate::cache::stats::CacheStats;
use crate::cache::ttl::TtlCache;
use std::future::Future;
use std::time::Duration;

/// A read-through cache for one entity kind.
///
/// `get` is memory-only and never blocks on backing I/O. `load` falls
/// through to a loader on miss, coalescing concurrent loads for the same
/// key, and fills the cache only after a successful load - a reader never
/// observes a partially written entry, and failed loads are never cached.
pub struct ReadThrough<V: Clone, E: Clone> {
    cache: TtlCache<V>,
    flights: Group<V, E>,
}

impl<V: Clone, E: Clone> ReadThrough<V, E> {
    /// Create a read-through cache with the given shard count.
    pub fn new(shard_count: usize) -> Self {
        Self {
            cache: TtlCache::new(shard_count),
            flights: Group::new(),
        }
    }

    /// Memory-only lookup.
    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    /// Cached value if present, otherwise run `loader` (coalesced across
    /// concurrent callers) and cache the successful result under `ttl`.
    pub async fn load<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }

        self.flights
            .work(key, || async {
                // Re-check under the flight: a racing fill may have landed
                // between the miss and leadership. Stats-free peek - the
                // miss above already counted this lookup.
                if let Some(value) = self.cache.peek(key) {
                    return Ok(value);
                }
                let value = loader().await?;
                self.cache.set(key, value.clone(), Some(ttl));
                Ok(value)
            })
            .await
    }

    /// Directly fill an entry, e.g. after a write whose result is already
    /// known. Cheaper than invalidate-then-reload.
    pub fn fill(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.cache.set(key, value, Some(ttl));
    }

    /// Remove one entry.
    pub fn del(&self, key: &str) -> bool {
        self.cache.del(key)
    }

    /// Remove every entry in this cache instance.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Drop expired entries; for the background sweep.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Cache hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Coalescing counters.
    pub fn flight_stats(&self) -> FlightStats {
        self.flights.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_load_fills_cache() {
        let layer: ReadThrough<u32, String> = ReadThrough::new(4);

        let value = layer.load("k", TTL, || async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);

        // Subsequent get is a pure memory hit.
        assert_eq!(layer.get("k"), Some(5));
    }

    #[tokio::test]
    async fn test_load_uses_cache_on_second_call() {
        let layer: Arc<ReadThrough<u32, String>> = Arc::new(ReadThrough::new(4));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = layer
                .load("k", TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(9)
                })
                .await
                .unwrap();
            assert_eq!(value, 9);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cold_load_counts_one_miss() {
        let layer: ReadThrough<u32, String> = ReadThrough::new(4);

        layer.load("k", TTL, || async { Ok(5) }).await.unwrap();
        layer.load("k", TTL, || async { Ok(5) }).await.unwrap();

        // One logical miss for the cold load (the in-flight re-check is
        // not counted again), one hit for the warm one.
        let stats = layer.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_error_not_cached() {
        let layer: Arc<ReadThrough<u32, String>> = Arc::new(ReadThrough::new(4));

        let err = layer
            .load("k", TTL, || async { Err("down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert_eq!(layer.get("k"), None);

        // Next load retries the loader and can succeed.
        let value = layer.load("k", TTL, || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_del_forces_reload() {
        let layer: Arc<ReadThrough<u32, String>> = Arc::new(ReadThrough::new(4));
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |layer: Arc<ReadThrough<u32, String>>, calls: Arc<AtomicUsize>| async move {
            layer
                .load("k", TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap()
        };

        load(Arc::clone(&layer), Arc::clone(&calls)).await;
        assert!(layer.del("k"));
        assert_eq!(layer.get("k"), None);
        load(Arc::clone(&layer), Arc::clone(&calls)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fill_avoids_reload() {
        let layer: ReadThrough<u32, String> = ReadThrough::new(4);
        layer.fill("k", 42, TTL);

        let value = layer
            .load("k", TTL, || async { panic!("loader must not run") })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_ttl_expiry_triggers_reload() {
        let layer: Arc<ReadThrough<u32, String>> = Arc::new(ReadThrough::new(4));
        let calls = Arc::new(AtomicUsize::new(0));

        let short = Duration::from_millis(10);
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            layer
                .load("k", short, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap();
            sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let layer: Arc<ReadThrough<u32, String>> = Arc::new(ReadThrough::new(4));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let layer = Arc::clone(&layer);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                layer
                    .load("hot", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        Ok(11)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(11));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
