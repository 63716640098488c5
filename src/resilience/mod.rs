// src/resilience/mod.rs
//! Optional hardening for event stores.
//!
//! [`ResilientStore`] wraps any [`EventStore`](crate::storage::EventStore)
//! with a circuit breaker and exponential-backoff retries. The throttle
//! itself never retries; wrapping the store is how a deployment opts in.

mod circuit_breaker;
mod exponential_backoff;
mod resilient_store;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use exponential_backoff::{retry, ExponentialBackoff, RetryConfig};
pub use resilient_store::{ResilienceConfig, ResilientStore};
