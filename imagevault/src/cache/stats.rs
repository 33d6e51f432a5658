//! Cache statistics tracking.

/// Counters for one cache instance.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing (or only an expired entry).
    pub misses: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    /// Entries removed by explicit invalidation (`del` / `clear`).
    pub invalidations: u64,
}

impl CacheStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub(crate) fn record_invalidations(&mut self, count: u64) {
        self.invalidations += count;
    }

    /// Hit ratio over all lookups (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
