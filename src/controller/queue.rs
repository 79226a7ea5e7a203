//! Coalescing work queue with per-key rate limiting
//!
//! A key is in at most one of two places: waiting in the queue, or being
//! processed by a worker. Adding a key that is already waiting is a no-op.
//! Adding a key that is being processed marks it dirty, and it is queued
//! again once the worker calls [`WorkQueue::done`]. Two workers therefore
//! never hold the same key at the same time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::retry::RetryConfig;

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    backoff: RetryConfig,
}

/// Work queue of resource keys; clones share the same queue
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl WorkQueue {
    /// Create a queue whose failed keys back off per `backoff`
    pub fn new(backoff: RetryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    /// Queue `key`; a key that is already waiting is not queued twice
    pub fn add(&self, key: &str) {
        let mut state = self.shared.state.lock();
        if state.shutting_down || state.dirty.contains(key) {
            return;
        }
        state.dirty.insert(key.to_string());
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Queue `key` after `delay`
    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Queue `key` after its next backoff delay and return that delay
    pub fn add_rate_limited(&self, key: &str) -> Duration {
        let attempt = {
            let mut state = self.shared.state.lock();
            let failures = state.failures.entry(key.to_string()).or_default();
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = self.shared.backoff.jittered_delay(attempt);
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of `key` after a successful sync
    pub fn forget(&self, key: &str) {
        self.shared.state.lock().failures.remove(key);
    }

    /// Number of consecutive failures recorded for `key`
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.shared
            .state
            .lock()
            .failures
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Wait for the next key; `None` once the queue is shut down and drained
    ///
    /// The returned key must be handed back with [`WorkQueue::done`].
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finish processing `key`, requeueing it if it was added meanwhile
    pub fn done(&self, key: &str) {
        let mut state = self.shared.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.shared.notify.notify_one();
        }
    }

    /// Stop accepting keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.shared.state.lock().shutting_down = true;
        self.shared.notify.notify_waiters();
    }

    /// Number of keys waiting
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Returns true if no key is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue {
        WorkQueue::new(RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        })
    }

    #[tokio::test]
    async fn test_duplicate_adds_coalesce() {
        let q = queue();
        q.add("a");
        q.add("a");
        q.add("b");
        assert_eq!(q.len(), 2);

        assert_eq!(q.next().await.as_deref(), Some("a"));
        assert_eq!(q.next().await.as_deref(), Some("b"));
        assert!(q.is_empty());
    }

    /// Story: a key changed while a worker holds it is redelivered afterwards,
    /// never to a second worker at the same time
    #[tokio::test]
    async fn story_key_in_flight_is_redelivered_after_done() {
        let q = queue();
        q.add("a");
        let key = q.next().await.unwrap();

        q.add("a");
        assert!(q.is_empty(), "in-flight key must not be queued again yet");

        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_changes_does_not_requeue() {
        let q = queue();
        q.add("a");
        let key = q.next().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_requeue_counts_failures() {
        let q = queue();
        q.add_rate_limited("a");
        q.add_rate_limited("a");
        assert_eq!(q.num_requeues("a"), 2);

        let key = tokio::time::timeout(Duration::from_secs(1), q.next())
            .await
            .expect("rate limited key should arrive")
            .unwrap();
        assert_eq!(key, "a");

        q.forget("a");
        assert_eq!(q.num_requeues("a"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiting_workers() {
        let q = queue();
        let worker = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;

        q.shutdown();
        let got = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should wake")
            .unwrap();
        assert_eq!(got, None);

        q.add("late");
        assert!(q.is_empty(), "adds after shutdown are ignored");
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_keys_first() {
        let q = queue();
        q.add("a");
        q.shutdown();
        assert_eq!(q.next().await.as_deref(), Some("a"));
        assert_eq!(q.next().await, None);
    }
}
