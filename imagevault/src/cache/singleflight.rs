//! Request coalescing for backing-store loads.
//!
//! When many callers miss the cache for the same key simultaneously, only
//! one backing call runs - all other callers wait on the same in-flight
//! result. This prevents thundering-herd duplicate database hits for a hot
//! key and duplicate creation races for keys that do not exist yet.
//!
//! # Implementation
//!
//! A per-key table maps in-flight keys to a broadcast sender. The first
//! caller for a key becomes the leader and runs the loader; later callers
//! subscribe to the broadcast and receive an identical `Result`. The entry
//! is removed before the result is broadcast, so a subsequent call for the
//! same key starts a fresh flight. Results are never cached here - the
//! cache layer above decides what to keep.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Clone, Default)]
pub struct FlightStats {
    /// Total calls into the group.
    pub total: u64,
    /// Calls that waited on an existing flight.
    pub coalesced: u64,
    /// Calls that led a new flight.
    pub led: u64,
}

impl FlightStats {
    /// Fraction of calls that were coalesced (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.total as f64
        }
    }
}

/// A group of coalesced loads keyed by opaque string.
///
/// `V` and `E` are both `Clone` because every waiter receives the same
/// value-or-error pair.
pub struct Group<V, E> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<Result<V, E>>>>,
    stats: Mutex<FlightStats>,
}

/// Removes the flight entry if the leader unwinds before broadcasting,
/// so waiters see a closed channel and re-race instead of hanging.
struct FlightGuard<'a, V, E> {
    group: &'a Group<V, E>,
    key: &'a str,
    armed: bool,
}

impl<V, E> Drop for FlightGuard<'_, V, E> {
    fn drop(&mut self) {
        if self.armed {
            self.group.in_flight.lock().unwrap().remove(self.key);
        }
    }
}

impl<V: Clone, E: Clone> Group<V, E> {
    /// Create an empty group.
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            stats: Mutex::new(FlightStats::default()),
        }
    }

    /// Execute `loader` for `key`, coalescing with any in-flight call.
    ///
    /// The first caller for a key runs the loader; concurrent callers for
    /// the same key block cooperatively and receive a clone of the same
    /// result. Loader errors propagate to every waiter.
    pub async fn work<F, Fut>(&self, key: &str, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut loader = Some(loader);
        self.stats.lock().unwrap().total += 1;

        loop {
            let flight = {
                let mut in_flight = self.in_flight.lock().unwrap();
                match in_flight.get(key) {
                    Some(tx) => Flight::Joined(tx.subscribe()),
                    None => {
                        // Capacity 16: typical fan-in for one hot key is small,
                        // and every waiter subscribes before the single send.
                        let (tx, _rx) = broadcast::channel(16);
                        in_flight.insert(key.to_string(), tx.clone());
                        Flight::Leading(tx)
                    }
                }
            };

            match flight {
                Flight::Leading(tx) => {
                    self.stats.lock().unwrap().led += 1;
                    let mut guard = FlightGuard {
                        group: self,
                        key,
                        armed: true,
                    };

                    let loader = loader.take().expect("a call leads at most once");
                    let result = loader().await;

                    // Tear the flight down before broadcasting so the next
                    // call for this key starts fresh.
                    self.in_flight.lock().unwrap().remove(key);
                    guard.armed = false;

                    let waiters = tx.receiver_count();
                    if waiters > 0 {
                        debug!(key, waiters, "broadcasting coalesced result");
                    }
                    let _ = tx.send(result.clone());
                    return result;
                }
                Flight::Joined(mut rx) => {
                    self.stats.lock().unwrap().coalesced += 1;
                    debug!(key, "joining in-flight load");
                    match rx.recv().await {
                        Ok(result) => return result,
                        // Leader unwound without sending; race for leadership.
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Snapshot of coalescing statistics.
    pub fn stats(&self) -> FlightStats {
        self.stats.lock().unwrap().clone()
    }
}

impl<V: Clone, E: Clone> Default for Group<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

enum Flight<V, E> {
    Leading(broadcast::Sender<Result<V, E>>),
    Joined(broadcast::Receiver<Result<V, E>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_single_call_runs_loader() {
        let group: Group<u32, String> = Group::new();
        let result = group.work("k", || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
        assert_eq!(group.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let group: Group<u32, String> = Group::new();
        let result = group.work("k", || async { Err("boom".to_string()) }).await;
        assert_eq!(result, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_sequential_calls_each_run_loader() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let result = group
                .work("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
            assert_eq!(result, Ok(1));
        }

        // No flight was in progress between calls, so no coalescing.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_calls_invoke_loader_once() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let group = Arc::clone(&group);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                group
                    .work("hot", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight_count(), 0);

        let stats = group.stats();
        assert_eq!(stats.total, 20);
        assert_eq!(stats.led, 1);
        assert_eq!(stats.coalesced, 19);
    }

    #[tokio::test]
    async fn test_all_waiters_receive_same_error() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let group = Arc::clone(&group);
            handles.push(tokio::spawn(async move {
                group
                    .work("bad", || async {
                        sleep(Duration::from_millis(10)).await;
                        Err("db down".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err("db down".to_string()));
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let group = Arc::clone(&group);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                group
                    .work(&format!("k{i}"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        Ok(i)
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_flight_torn_down_after_completion() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        group
            .work("k", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await
            .unwrap();

        // A later call starts a fresh flight and runs the loader again.
        let c = Arc::clone(&calls);
        group
            .work("k", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_waiters_recover_from_abandoned_leader() {
        let group: Arc<Group<u32, String>> = Arc::new(Group::new());

        // Leader that gets cancelled mid-flight.
        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .work("k", || async {
                        sleep(Duration::from_secs(60)).await;
                        Ok(0)
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(10)).await;
        assert_eq!(group.in_flight_count(), 1);

        let waiter = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.work("k", || async { Ok(99) }).await })
        };
        sleep(Duration::from_millis(10)).await;

        leader.abort();
        let _ = leader.await;

        // The waiter re-races, becomes the new leader, and completes.
        assert_eq!(waiter.await.unwrap(), Ok(99));
        assert_eq!(group.in_flight_count(), 0);
    }
}
