//! Per-key single-flight coordination
//!
//! At most one producer runs per key. Callers arriving while it runs
//! join it and receive a clone of its result. The producer runs on its own
//! task, so a caller that stops waiting never interrupts it.

use crate::error::{CacheError, CacheResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Flight<T> = Shared<BoxFuture<'static, CacheResult<T>>>;

struct InFlight<T> {
    flight: Flight<T>,
    /// Callers that joined this flight, the starter included
    joined: usize,
}

type Registry<K, T> = Arc<Mutex<HashMap<K, InFlight<T>>>>;

/// Runs at most one producer per key at a time
pub struct ProducerGuard<K, T> {
    in_flight: Registry<K, T>,
}

impl<K, T> ProducerGuard<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `producer` for `key` unless a run is already in flight, in which
    /// case wait for that run and return its result
    ///
    /// The key is unregistered as soon as the producer finishes, so later
    /// calls start a fresh run. Fails only if the producer task is torn down
    /// before finishing, e.g. when the runtime shuts down.
    pub async fn guard_by_key<F, Fut>(&self, key: K, producer: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get_mut(&key) {
                Some(existing) => {
                    existing.joined += 1;
                    debug!("Joining in-flight operation for {:?}", key);
                    existing.flight.clone()
                }
                None => {
                    let flight = self.start(key.clone(), producer());
                    in_flight.insert(
                        key,
                        InFlight {
                            flight: flight.clone(),
                            joined: 1,
                        },
                    );
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of keys with an operation currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn start<Fut>(&self, key: K, producer: Fut) -> Flight<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let handle = tokio::spawn(async move {
            let _unregister = Unregister { registry, key };
            producer.await
        });

        async move {
            match handle.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => Err(CacheError::Internal(format!(
                    "producer task cancelled: {}",
                    err
                ))),
            }
        }
        .boxed()
        .shared()
    }
}

impl<K, T> Default for ProducerGuard<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a key from the registry when its producer finishes or unwinds
struct Unregister<K: Eq + Hash, T> {
    registry: Registry<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Unregister<K, T> {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(done) = in_flight.remove(&self.key) {
            if done.joined > 1 {
                debug!("Operation shared by {} callers", done.joined);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn wait_until_in_flight<K, T>(guard: &ProducerGuard<K, T>)
    where
        K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        while guard.in_flight_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_run() {
        let guard: Arc<ProducerGuard<String, usize>> = Arc::new(ProducerGuard::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let guard = Arc::clone(&guard);
            let runs = Arc::clone(&runs);
            let release = Arc::clone(&release);
            waiters.push(tokio::spawn(async move {
                guard
                    .guard_by_key("key".to_string(), move || async move {
                        release.notified().await;
                        runs.fetch_add(1, Ordering::SeqCst) + 100
                    })
                    .await
            }));
        }

        wait_until_in_flight(&guard).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), 100);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(guard.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let guard: ProducerGuard<&'static str, u32> = ProducerGuard::new();
        let first = guard.guard_by_key("a", || async { 1 }).await.unwrap();
        let second = guard.guard_by_key("a", || async { 2 }).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(guard.in_flight_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_keys_do_not_block() {
        let guard: Arc<ProducerGuard<&'static str, u32>> = Arc::new(ProducerGuard::new());
        let never = Arc::new(Notify::new());

        let blocked = {
            let guard = Arc::clone(&guard);
            let never = Arc::clone(&never);
            tokio::spawn(async move {
                guard
                    .guard_by_key("slow", move || async move {
                        never.notified().await;
                        0
                    })
                    .await
            })
        };

        let other = tokio::time::timeout(
            Duration::from_secs(5),
            guard.guard_by_key("fast", || async { 7 }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(other, 7);

        never.notify_one();
        assert_eq!(blocked.await.unwrap().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_receive_the_same_failure() {
        let guard: Arc<ProducerGuard<&'static str, Result<u32, String>>> =
            Arc::new(ProducerGuard::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let guard = Arc::clone(&guard);
            let runs = Arc::clone(&runs);
            let release = Arc::clone(&release);
            waiters.push(tokio::spawn(async move {
                guard
                    .guard_by_key("k", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Err("boom".to_string())
                    })
                    .await
            }));
        }

        wait_until_in_flight(&guard).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), Err("boom".to_string()));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(guard.in_flight_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_caller_does_not_cancel_the_run() {
        let guard: Arc<ProducerGuard<&'static str, u32>> = Arc::new(ProducerGuard::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let guard = Arc::clone(&guard);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                guard
                    .guard_by_key("k", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        9
                    })
                    .await
            })
        };

        wait_until_in_flight(&guard).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(guard.in_flight_count(), 1);

        let joined = guard
            .guard_by_key("k", || async { 0 })
            .await
            .unwrap();

        assert_eq!(joined, 9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(guard.in_flight_count(), 0);
    }

    #[test]
    fn shutdown_before_finishing_is_an_error() {
        let guard: ProducerGuard<&'static str, u32> = ProducerGuard::new();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let mut waiting = Box::pin(guard.guard_by_key("k", std::future::pending::<u32>));
        runtime.block_on(async { assert!((&mut waiting).now_or_never().is_none()) });
        drop(runtime);

        let after = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let err = after.block_on(waiting).unwrap_err();

        assert!(matches!(err, CacheError::Internal(_)));
        assert_eq!(guard.in_flight_count(), 0);
    }
}
