//! Sharded in-memory cache with per-entry TTL.
//!
//! Keys are opaque strings; values are cloned out, so a value returned to
//! a caller is never mutated in place by the cache. Each cache instance
//! holds one value type - callers instantiate one cache per entity kind
//! rather than storing a dynamic union.
//!
//! Sharding by key hash keeps unrelated keys independent under concurrent
//! access; there is no global lock. Expiry is lazy (checked on access)
//! with an optional [`purge_expired`](TtlCache::purge_expired) sweep for
//! background maintenance.

use crate::cache::stats::CacheStats;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One cached value with its optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Sharded TTL cache.
///
/// `get` consults only memory and never blocks on backing I/O; the
/// read-through miss path lives in [`crate::cache::ReadThrough`].
pub struct TtlCache<V: Clone> {
    shards: Vec<Mutex<HashMap<String, Entry<V>>>>,
    stats: Mutex<CacheStats>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the given number of shards (minimum 1).
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            stats: Mutex::new(CacheStats::new()),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Entry<V>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Look up a live entry. Expired entries are dropped on access and
    /// reported as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut shard = self.shard(key).lock().unwrap();
        let now = Instant::now();

        match shard.get(key) {
            Some(entry) if entry.is_expired(now) => {
                shard.remove(key);
                let mut stats = self.stats.lock().unwrap();
                stats.record_expiration();
                stats.record_miss();
                None
            }
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.lock().unwrap().record_hit();
                Some(value)
            }
            None => {
                self.stats.lock().unwrap().record_miss();
                None
            }
        }
    }

    /// Look up a live entry without touching the hit/miss counters.
    ///
    /// For internal double-checks (e.g. re-reading under a coalesced
    /// flight) that are part of one logical lookup and must not count
    /// twice. Expired entries are treated as absent but left for `get`
    /// or the sweep to collect.
    pub fn peek(&self, key: &str) -> Option<V> {
        let shard = self.shard(key).lock().unwrap();
        let now = Instant::now();
        match shard.get(key) {
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a value. `ttl = None` means the entry never expires on its
    /// own (explicit invalidation only).
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.shard_insert(key.into(), entry);
    }

    fn shard_insert(&self, key: String, entry: Entry<V>) {
        let mut shard = self.shard(&key).lock().unwrap();
        shard.insert(key, entry);
    }

    /// Remove one entry. Returns whether an entry was present.
    pub fn del(&self, key: &str) -> bool {
        let removed = self.shard(key).lock().unwrap().remove(key).is_some();
        if removed {
            self.stats.lock().unwrap().record_invalidations(1);
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut cleared = 0u64;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap();
            cleared += shard.len() as u64;
            shard.clear();
        }
        self.stats.lock().unwrap().record_invalidations(cleared);
    }

    /// Number of entries across all shards, including not-yet-collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap().len())
            .sum()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns the number removed. Intended for
    /// a periodic background sweep.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap();
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired(now));
            purged += before - shard.len();
        }
        if purged > 0 {
            let mut stats = self.stats.lock().unwrap();
            for _ in 0..purged {
                stats.record_expiration();
            }
        }
        purged
    }

    /// Snapshot of hit/miss/expiry counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }
}
