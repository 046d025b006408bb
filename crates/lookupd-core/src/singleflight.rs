//! Keyed request coalescing.
//!
//! A [`SingleFlight`] group guarantees that, for a given key, at most one
//! future is being driven at any instant. Callers arriving while a flight is
//! in progress wait for it and receive a clone of its outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

type Outcome<V, E> = Option<Result<V, E>>;

struct Call<V, E> {
    done: watch::Receiver<Outcome<V, E>>,
}

/// A group of keyed, deduplicated computations.
///
/// # Example
///
/// ```ignore
/// let group: SingleFlight<u32, String> = SingleFlight::new();
/// let (result, shared) = group.run("answer", async { Ok(42) }).await;
/// assert_eq!(result, Ok(42));
/// assert!(!shared);
/// ```
pub struct SingleFlight<V, E> {
    calls: Mutex<HashMap<String, Arc<Call<V, E>>>>,
}

impl<V, E> Default for SingleFlight<V, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone, E: Clone> SingleFlight<V, E> {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` under `key`, or join the flight already running for it.
    ///
    /// Returns the outcome together with a flag that is `true` when the
    /// outcome was produced by another caller's execution.
    ///
    /// If the caller driving a flight is dropped before completing, the
    /// callers waiting on it retry; one of them becomes the new leader and
    /// runs its own future.
    pub async fn run<F>(&self, key: &str, fut: F) -> (Result<V, E>, bool)
    where
        F: Future<Output = Result<V, E>>,
    {
        let (call, tx) = loop {
            let joined = {
                let mut calls = self.calls.lock();
                match calls.get(key) {
                    Some(call) => Arc::clone(call),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        let call = Arc::new(Call { done: rx });
                        calls.insert(key.to_owned(), Arc::clone(&call));
                        break (call, tx);
                    }
                }
            };

            let mut done = joined.done.clone();
            let outcome = match done.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                Err(_) => None,
            };

            match outcome {
                Some(result) => return (result, true),
                None => {
                    tracing::debug!(
                        target: "lookupd_core::singleflight",
                        key,
                        "flight abandoned by its leader, retrying"
                    );
                    self.release(key, &joined);
                }
            }
        };

        (self.lead(key, call, tx, fut).await, false)
    }

    async fn lead<F>(
        &self,
        key: &str,
        call: Arc<Call<V, E>>,
        tx: watch::Sender<Outcome<V, E>>,
        fut: F,
    ) -> Result<V, E>
    where
        F: Future<Output = Result<V, E>>,
    {
        let _release = Release {
            group: self,
            key,
            call,
        };

        let result = fut.await;
        tx.send_replace(Some(result.clone()));
        result
    }

    /// Drop the in-progress record for `key`.
    ///
    /// The running flight still completes and delivers to the callers that
    /// already joined it; the next caller starts a fresh flight.
    pub fn forget(&self, key: &str) {
        self.calls.lock().remove(key);
    }

    /// Number of flights currently in progress.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether no flight is in progress.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    fn release(&self, key: &str, call: &Arc<Call<V, E>>) {
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, call)) {
            calls.remove(key);
        }
    }
}

impl<V, E> std::fmt::Debug for SingleFlight<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Removes the leader's record on completion or cancellation, unless a
/// newer flight has replaced it after a `forget`.
struct Release<'a, V: Clone, E: Clone> {
    group: &'a SingleFlight<V, E>,
    key: &'a str,
    call: Arc<Call<V, E>>,
}

impl<V: Clone, E: Clone> Drop for Release<'_, V, E> {
    fn drop(&mut self) {
        self.group.release(self.key, &self.call);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_caller_runs_once() {
        let group: SingleFlight<u32, String> = SingleFlight::new();
        let (result, shared) = group.run("k", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(!shared);
        assert!(group.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_execution() {
        let group: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let group = Arc::clone(&group);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                group
                    .run("k", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        let mut shared_count = 0;
        for handle in handles {
            let (result, shared) = handle.await.unwrap();
            assert_eq!(result, Ok(42));
            if shared {
                shared_count += 1;
            }
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(shared_count, 15);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let group: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .run("k", async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err("boom".to_string())
                    })
                    .await
            })
        };
        while group.is_empty() {
            tokio::task::yield_now().await;
        }

        let (result, shared) = group.run("k", async { Ok(1) }).await;
        assert_eq!(result, Err("boom".to_string()));
        assert!(shared);
        assert_eq!(leader.await.unwrap().0, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_forget_starts_fresh_flight() {
        let group: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .run("k", async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        while group.is_empty() {
            tokio::task::yield_now().await;
        }

        group.forget("k");
        let (result, shared) = group.run("k", async { Ok(2) }).await;
        assert_eq!(result, Ok(2));
        assert!(!shared);

        // The first flight is unaffected.
        assert_eq!(leader.await.unwrap(), (Ok(1), false));
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_retries_when_leader_is_dropped() {
        let group: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.run("k", std::future::pending()).await })
        };
        while group.is_empty() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.run("k", async { Ok(9) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let (result, shared) = waiter.await.unwrap();
        assert_eq!(result, Ok(9));
        assert!(!shared);
        assert!(group.is_empty());
    }
}
