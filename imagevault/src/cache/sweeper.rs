//! Background sweep of expired cache entries.
//!
//! Expiry is primarily lazy (checked on access), so entries for keys that
//! are never touched again would otherwise linger. The sweeper runs in a
//! separate thread, periodically purging expired entries from every
//! registered cache, and shuts down cleanly when dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Anything the sweeper can purge expired entries from.
pub trait PurgeExpired: Send + Sync {
    /// Drop expired entries; returns the number removed.
    fn purge_expired(&self) -> usize;
}

/// Periodic expired-entry sweeper.
pub struct CacheSweeper {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl CacheSweeper {
    /// Start the sweeper over the given caches.
    pub fn start(caches: Vec<Arc<dyn PurgeExpired>>, interval_secs: u64) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread_handle = thread::Builder::new()
            .name("cache-sweeper".to_string())
            .spawn(move || {
                Self::run_loop(caches, interval_secs, shutdown_flag);
            })
            .expect("failed to spawn cache sweeper thread");

        info!("cache sweeper started (interval: {}s)", interval_secs);

        Self {
            thread_handle: Some(thread_handle),
            shutdown,
        }
    }

    fn run_loop(caches: Vec<Arc<dyn PurgeExpired>>, interval_secs: u64, shutdown: Arc<AtomicBool>) {
        let interval = Duration::from_secs(interval_secs);

        // Short sleeps keep shutdown responsive.
        let tick = Duration::from_millis(200);
        let mut elapsed = Duration::ZERO;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                debug!("cache sweeper received shutdown signal");
                break;
            }

            thread::sleep(tick);
            elapsed += tick;

            if elapsed >= interval {
                elapsed = Duration::ZERO;
                let purged: usize = caches.iter().map(|cache| cache.purge_expired()).sum();
                if purged > 0 {
                    debug!(purged, "swept expired cache entries");
                }
            }
        }
    }

    /// Signal shutdown and wait for the sweep thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
