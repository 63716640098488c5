use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, StorageError, ThrottleError};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::resilience::exponential_backoff::{retry, RetryConfig};
use crate::storage::EventStore;

/// Combined configuration for resilience features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Event store decorator with a circuit breaker and retries.
///
/// `prune` and `count_since` are idempotent and are retried on transient
/// failures. `record` is attempted once: a timed-out append may already have
/// landed, and replaying it would count the request twice.
///
/// While the circuit is open every call fails with
/// [`StorageError::CircuitOpen`] without touching the wrapped store.
#[derive(Debug)]
pub struct ResilientStore<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
    config: ResilienceConfig,
}

impl<S: Clone> Clone for ResilientStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: Arc::clone(&self.breaker),
            config: self.config.clone(),
        }
    }
}

/// Failures worth another attempt
fn is_transient(err: &ThrottleError) -> bool {
    matches!(
        err,
        ThrottleError::StoreUnavailable(
            StorageError::RedisConnection(_) | StorageError::Timeout(_)
        )
    )
}

impl<S> ResilientStore<S>
where
    S: EventStore,
{
    pub fn new(inner: S, config: ResilienceConfig) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            config,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    async fn guarded<T, Fut>(&self, operation: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if !self.breaker.allow_request().await {
            debug!(operation, "Circuit open, refusing store call");
            return Err(ThrottleError::StoreUnavailable(StorageError::CircuitOpen(
                format!("store refused '{}' while the circuit is open", operation),
            )));
        }

        let result = call.await;
        match &result {
            Err(ThrottleError::StoreUnavailable(_)) => self.breaker.record_failure().await,
            _ => self.breaker.record_success().await,
        }

        result
    }
}

#[async_trait]
impl<S> EventStore for ResilientStore<S>
where
    S: EventStore,
{
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()> {
        retry(
            &self.config.retry,
            move || self.guarded("prune", self.inner.prune(throttle_id, older_than)),
            is_transient,
        )
        .await
    }

    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()> {
        self.guarded("record", self.inner.record(throttle_id, requestor_id, at))
            .await
    }

    async fn count_since(
        &self,
        throttle_id: &str,
        requestor_id: &str,
        since: u64,
    ) -> Result<u64> {
        retry(
            &self.config.retry,
            move || {
                self.guarded(
                    "count_since",
                    self.inner.count_since(throttle_id, requestor_id, since),
                )
            },
            is_transient,
        )
        .await
    }
}
