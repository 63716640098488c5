// src/storage/memory.rs

// In-memory event store (for testing and single-process deployments)
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::InMemoryConfig;
use crate::error::{Result, StorageError, ThrottleError};
use crate::storage::EventStore;
use crate::store_op;

/// throttle id -> requestor id -> event timestamps
#[derive(Debug, Default)]
struct EventLog {
    throttles: HashMap<String, HashMap<String, Vec<u64>>>,
    total: usize,
}

impl EventLog {
    /// Drops events older than `older_than` from every requestor of one throttle.
    fn prune_throttle(&mut self, throttle_id: &str, older_than: u64) -> usize {
        let Some(requestors) = self.throttles.get_mut(throttle_id) else {
            return 0;
        };

        let mut removed = 0;
        requestors.retain(|_, events| {
            let before = events.len();
            events.retain(|&at| at >= older_than);
            removed += before - events.len();
            !events.is_empty()
        });

        if requestors.is_empty() {
            self.throttles.remove(throttle_id);
        }

        self.total -= removed;
        removed
    }

    fn prune_everything(&mut self, older_than: u64) -> usize {
        let ids: Vec<String> = self.throttles.keys().cloned().collect();
        ids.iter()
            .map(|id| self.prune_throttle(id, older_than))
            .sum()
    }
}

/// Aborts the background cleanup when the last store handle goes away
#[derive(Debug)]
struct CleanupTask(JoinHandle<()>);

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// In-memory event store implementation
#[derive(Debug, Clone)]
pub struct MemoryEventStore {
    log: Arc<RwLock<EventLog>>,
    config: InMemoryConfig,
    _cleanup_task: Option<Arc<CleanupTask>>,
}

fn poisoned<T>(_: PoisonError<T>) -> ThrottleError {
    ThrottleError::Internal("in-memory event log lock poisoned".to_string())
}

impl MemoryEventStore {
    /// Creates a new in-memory store with the given configuration.
    /// Background cleanup, when enabled, runs on wall-clock time.
    pub fn new(config: InMemoryConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }

    /// Like `new`, but background cleanup measures retention with `clock`.
    /// Pass the same clock the throttle uses so both agree on "now".
    pub fn with_clock<C: Clock + 'static>(config: InMemoryConfig, clock: C) -> Self {
        let log = Arc::new(RwLock::new(EventLog::default()));

        let cleanup_task = if config.use_background_task {
            Self::spawn_cleanup(Arc::clone(&log), &config, clock)
        } else {
            None
        };

        Self {
            log,
            config,
            _cleanup_task: cleanup_task,
        }
    }

    fn spawn_cleanup<C: Clock + 'static>(
        log: Arc<RwLock<EventLog>>,
        config: &InMemoryConfig,
        clock: C,
    ) -> Option<Arc<CleanupTask>> {
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime available; background event cleanup disabled");
            return None;
        };

        let period = config.cleanup_interval;
        let retention = config.retention.as_secs();

        let task = handle.spawn(async move {
            let mut interval = time::interval(period);
            loop {
                interval.tick().await;
                let cutoff = clock.now().saturating_sub(retention);
                match log.write() {
                    Ok(mut log) => {
                        let removed = log.prune_everything(cutoff);
                        if removed > 0 {
                            debug!(removed, cutoff, "Background cleanup removed expired events");
                        }
                    }
                    Err(_) => {
                        warn!("Event log lock poisoned; stopping background cleanup");
                        break;
                    }
                }
            }
        });

        Some(Arc::new(CleanupTask(task)))
    }

    /// Total number of stored events across every throttle
    pub fn len(&self) -> Result<usize> {
        Ok(self.log.read().map_err(poisoned)?.total)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops events older than `older_than` from every throttle
    pub fn prune_all(&self, older_than: u64) -> Result<usize> {
        Ok(self.log.write().map_err(poisoned)?.prune_everything(older_than))
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()> {
        let started = Instant::now();
        let removed = self
            .log
            .write()
            .map_err(poisoned)
            .map(|mut log| log.prune_throttle(throttle_id, older_than));
        store_op!("prune", throttle_id, removed, started.elapsed().as_millis() as u64);

        let removed = removed?;
        if removed > 0 {
            debug!(throttle_id, removed, older_than, "Pruned stale events");
        }
        Ok(())
    }

    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()> {
        let started = Instant::now();
        let result = self.log.write().map_err(poisoned).and_then(|mut log| {
            // Apply max events limit
            if log.total >= self.config.max_events {
                return Err(ThrottleError::StoreUnavailable(
                    StorageError::CapacityExceeded(format!(
                        "Maximum events limit of {} reached",
                        self.config.max_events
                    )),
                ));
            }

            log.throttles
                .entry(throttle_id.to_string())
                .or_default()
                .entry(requestor_id.to_string())
                .or_default()
                .push(at);
            log.total += 1;
            Ok(())
        });
        store_op!("record", throttle_id, result, started.elapsed().as_millis() as u64);

        result
    }

    async fn count_since(
        &self,
        throttle_id: &str,
        requestor_id: &str,
        since: u64,
    ) -> Result<u64> {
        let started = Instant::now();
        let result = self.log.read().map_err(poisoned).map(|log| {
            log.throttles
                .get(throttle_id)
                .and_then(|requestors| requestors.get(requestor_id))
                .map(|events| events.iter().filter(|&&at| at >= since).count() as u64)
                .unwrap_or(0)
        });
        store_op!("count_since", throttle_id, result, started.elapsed().as_millis() as u64);

        result
    }
}
