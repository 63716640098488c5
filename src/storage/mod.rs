// src/storage/mod.rs

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use memory::MemoryEventStore;
pub use redis::RedisEventStore;

use super::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Append-only log of `(throttle, requestor, timestamp)` events.
///
/// Timestamps are whole seconds since the Unix epoch. Any backend that
/// honours the three operations below can drive a [`crate::Throttle`].
#[async_trait]
pub trait EventStore: Send + Sync + Debug {
    /// Removes every event of `throttle_id`, for any requestor, with
    /// `occurred_at < older_than`. Removing nothing is not an error.
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()>;

    /// Appends one event. Two events with the same identity and timestamp
    /// are both kept.
    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()>;

    /// Number of events for the pair with `occurred_at >= since`.
    async fn count_since(&self, throttle_id: &str, requestor_id: &str, since: u64)
        -> Result<u64>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn prune(&self, throttle_id: &str, older_than: u64) -> Result<()> {
        (**self).prune(throttle_id, older_than).await
    }

    async fn record(&self, throttle_id: &str, requestor_id: &str, at: u64) -> Result<()> {
        (**self).record(throttle_id, requestor_id, at).await
    }

    async fn count_since(
        &self,
        throttle_id: &str,
        requestor_id: &str,
        since: u64,
    ) -> Result<u64> {
        (**self).count_since(throttle_id, requestor_id, since).await
    }
}
