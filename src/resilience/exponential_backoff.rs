use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::duration_serde;
use crate::error::Result;

/// Configuration for retry strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_attempts: usize,
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.0)
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// Produces the delay before each retry
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: usize,
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { attempt: 0, config }
    }

    /// Delay before the next retry, or `None` once retries are used up
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let base_ms = self.config.initial_backoff.as_millis() as f64;
        let exp = (self.attempt - 1) as f64;
        let capped_ms = (base_ms * self.config.backoff_multiplier.powf(exp))
            .min(self.config.max_backoff.as_millis() as f64);

        let delay_ms = if self.config.use_jitter {
            capped_ms * (rand::random::<f64>() * 0.5 + 0.5)
        } else {
            capped_ms
        };

        Some(Duration::from_millis(delay_ms as u64))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Runs `op` until it succeeds, retrying only errors `retryable` accepts.
pub async fn retry<T, F, Fut, P>(config: &RetryConfig, mut op: F, retryable: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&crate::error::ThrottleError) -> bool,
{
    let mut backoff = ExponentialBackoff::new(config.clone());

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) => match backoff.next_backoff() {
                Some(delay) => {
                    debug!(error = %e, ?delay, "Retrying store operation");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
