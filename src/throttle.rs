// src/throttle.rs

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ThrottleConfig;
use crate::error::{Result, StorageError, ThrottleError};
use crate::rules::{RateLimit, RateLimitSet};
use crate::storage::EventStore;
use crate::throttle_event;

/// Outcome of a single throttle check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Rules the request broke, in the order they were supplied
    pub violated: RateLimitSet,

    /// Timestamp the request was recorded under
    pub recorded_at: u64,
}

impl Decision {
    pub fn admitted(&self) -> bool {
        self.violated.is_empty()
    }
}

/// Sliding-window-by-log limit evaluator.
///
/// Every call prunes the throttle's stale events, records the request and
/// then counts the requestor's events inside each rule's window. The store is
/// shared, and concurrent calls for the same identity are not serialized: two
/// racing callers can both see a count just under the limit and both get in.
///
/// There is no transaction around the three steps. If the store fails after
/// the event was recorded, the error still reaches the caller and the event
/// stays in the log, so a failed call means "admission unknown", never "denied".
#[derive(Debug, Clone)]
pub struct Throttle<S, C = SystemClock>
where
    S: EventStore,
    C: Clock,
{
    store: S,
    clock: Arc<C>,
    config: ThrottleConfig,
}

impl<S> Throttle<S, SystemClock>
where
    S: EventStore,
{
    /// Creates a throttle over `store` using the wall clock
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock::new())
    }
}

impl<S, C> Throttle<S, C>
where
    S: EventStore,
    C: Clock,
{
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
            config: ThrottleConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ThrottleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Records a request by `requestor_id` against `throttle_id` and returns
    /// the rules it violates. An empty set means the request is admitted.
    ///
    /// Invalid rules are rejected before anything touches the store.
    pub async fn process(
        &self,
        requestor_id: &str,
        throttle_id: &str,
        rules: &RateLimitSet,
    ) -> Result<RateLimitSet> {
        Ok(self.check(requestor_id, throttle_id, rules).await?.violated)
    }

    /// Same as [`Throttle::process`] but also reports the timestamp used.
    pub async fn check(
        &self,
        requestor_id: &str,
        throttle_id: &str,
        rules: &RateLimitSet,
    ) -> Result<Decision> {
        rules.validate()?;

        let evaluation = self.evaluate(requestor_id, throttle_id, rules);
        let decision = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, evaluation).await.map_err(|_| {
                ThrottleError::StoreUnavailable(StorageError::Timeout(format!(
                    "throttle '{}' did not finish within {:?}",
                    throttle_id, limit
                )))
            })?,
            None => evaluation.await,
        };

        match &decision {
            Ok(decision) => {
                throttle_event!(
                    throttle_id,
                    requestor_id,
                    decision.admitted(),
                    decision.violated.len(),
                    rules.len()
                );
            }
            Err(e) => {
                warn!(
                    throttle = %self.config.name,
                    throttle_id,
                    requestor_id,
                    error = %e,
                    "Throttle check failed; admission state unknown"
                );
            }
        }

        decision
    }

    async fn evaluate(
        &self,
        requestor_id: &str,
        throttle_id: &str,
        rules: &RateLimitSet,
    ) -> Result<Decision> {
        let now = self.clock.now();

        let older_than = now.saturating_sub(rules.max_window());
        self.store.prune(throttle_id, older_than).await?;

        // Recorded even when the request turns out to be over the limit
        self.store.record(throttle_id, requestor_id, now).await?;

        let mut violated = RateLimitSet::new();
        for rule in rules {
            if self.is_violated(requestor_id, throttle_id, rule, now).await? {
                violated.push(*rule);
            }
        }

        Ok(Decision {
            violated,
            recorded_at: now,
        })
    }

    async fn is_violated(
        &self,
        requestor_id: &str,
        throttle_id: &str,
        rule: &RateLimit,
        now: u64,
    ) -> Result<bool> {
        let count = self
            .store
            .count_since(throttle_id, requestor_id, rule.window_start(now))
            .await?;

        debug!(
            throttle_id,
            requestor_id,
            window_seconds = rule.window_seconds,
            max_requests = rule.max_requests,
            count,
            "Evaluated rule"
        );

        Ok(count > rule.max_requests)
    }
}
