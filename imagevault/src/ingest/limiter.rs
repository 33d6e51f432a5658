//! Concurrency limiter for derivative generation.
//!
//! Image decode and re-encode are CPU and memory heavy; under concurrent
//! uploads an unbounded fan-out would blow past available cores. A shared
//! semaphore bounds the number of in-flight transforms across all
//! uploads. The limiter protects resources, not correctness - it is sized
//! independently of request concurrency, defaulting to the number of
//! available CPU cores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-based limiter for CPU-bound transforms.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `max_concurrent` simultaneous transforms.
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent` is 0.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");

        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a limiter sized to the available CPU cores.
    pub fn with_cpu_cores() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self::new(cores)
    }

    /// Acquire a permit, waiting if the limit is reached. The permit is
    /// released when dropped.
    pub async fn acquire(&self) -> ConcurrencyPermit<'_> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed unexpectedly");

        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);

        ConcurrencyPermit {
            _permit: permit,
            in_flight: &self.in_flight,
        }
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    /// Maximum simultaneous transforms.
    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    /// Transforms currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest concurrency observed, for tuning.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }
}

/// Permit for one transform; counts against the limit while held.
pub struct ConcurrencyPermit<'a> {
    _permit: OwnedSemaphorePermit,
    in_flight: &'a AtomicUsize,
}

impl Drop for ConcurrencyPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_limiter() {
        let limiter = ConcurrencyLimiter::new(3);
        assert_eq!(limiter.max_concurrent(), 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn test_with_cpu_cores_is_positive() {
        let limiter = ConcurrencyLimiter::with_cpu_cores();
        assert!(limiter.max_concurrent() >= 1);
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_zero_concurrency_panics() {
        ConcurrencyLimiter::new(0);
    }

    #[tokio::test]
    async fn test_acquire_releases_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);

        {
            let _p1 = limiter.acquire().await;
            assert_eq!(limiter.in_flight(), 1);
            {
                let _p2 = limiter.acquire().await;
                assert_eq!(limiter.in_flight(), 2);
            }
            assert_eq!(limiter.in_flight(), 1);
        }
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }));
        }

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(limiter.in_flight() <= 2);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.peak_in_flight() <= 2);
    }
}
