// src/test_utils.rs

use super::clock::Clock;
use super::error::{Result, StorageError, ThrottleError};
use super::rules::{RateLimit, RateLimitSet};
use super::storage::{EventStore, MemoryEventStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Clock whose time only moves when a test says so. Clones share the same time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.now.store(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Store operations a test can make fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Prune,
    Record,
    CountSince,
}

/// Wraps a memory store, counts calls, and fails chosen operations.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    inner: MemoryEventStore,
    /// Calls left to fail per operation; `usize::MAX` = forever
    failing: Arc<Mutex<HashMap<StoreOp, usize>>>,
    calls: Arc<Mutex<Vec<StoreOp>>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `op` fails until `heal` is called.
    pub fn fail_on(&self, op: StoreOp) {
        self.fail_times(op, usize::MAX);
    }

    /// The next `times` calls to `op` fail, later calls pass through.
    pub fn fail_times(&self, op: StoreOp, times: usize) {
        self.failing.lock().unwrap().insert(op, times);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn inner(&self) -> &MemoryEventStore {
        &self.inner
    }

    /// Operations seen so far, in call order (failed ones included)
    pub fn calls(&self) -> Vec<StoreOp> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|&&c| c == op).count()
    }

    fn enter(&self, op: StoreOp) -> Result<()> {
        self.calls.lock().unwrap().push(op);

        let mut failing = self.failing.lock().unwrap();
        match failing.get_mut(&op) {
            Some(left) if *left == usize::MAX => {}
            Some(left) if *left > 0 => *left -= 1,
            _ => return Ok(()),
        }

        Err(ThrottleError::StoreUnavailable(StorageError::RedisConnection(
            format!("injected failure on {:?}", op),
        )))
    }
}

#[async_trait]
impl EventStore for FailingStore {
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()> {
        self.enter(StoreOp::Prune)?;
        self.inner.prune(throttle_id, older_than).await
    }

    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()> {
        self.enter(StoreOp::Record)?;
        self.inner.record(throttle_id, requestor_id, at).await
    }

    async fn count_since(
        &self,
        throttle_id: &str,
        requestor_id: &str,
        since: u64,
    ) -> Result<u64> {
        self.enter(StoreOp::CountSince)?;
        self.inner.count_since(throttle_id, requestor_id, since).await
    }
}

/// Shorthand for a rule set built from `(window_seconds, max_requests)` pairs
pub fn rules(pairs: &[(u64, u64)]) -> RateLimitSet {
    pairs
        .iter()
        .map(|&(window, max)| RateLimit::new(window, max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_budgets_are_per_operation() {
        let store = FailingStore::new();
        store.fail_times(StoreOp::Prune, 2);
        store.fail_times(StoreOp::CountSince, 1);

        assert!(store.count_since("login", "user1", 0).await.is_err());
        assert!(store.count_since("login", "user1", 0).await.is_ok());

        // The prune budget is untouched by the count_since setup
        assert!(store.prune("login", 0).await.is_err());
        assert!(store.prune("login", 0).await.is_err());
        assert!(store.prune("login", 0).await.is_ok());

        assert!(store.record("login", "user1", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_heal_clears_every_failure() {
        let store = FailingStore::new();
        store.fail_on(StoreOp::Record);
        store.fail_on(StoreOp::Prune);
        assert!(store.record("login", "user1", 1).await.is_err());

        store.heal();
        assert!(store.record("login", "user1", 1).await.is_ok());
        assert!(store.prune("login", 0).await.is_ok());
        assert_eq!(store.call_count(StoreOp::Record), 2);
    }
}
