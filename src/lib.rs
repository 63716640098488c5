// library entry
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod resilience;
pub mod rules;
pub mod schema;
pub mod storage;
pub mod throttle;

#[cfg(test)]
pub(crate) mod test_utils;


// Re-export key components for convenience
pub use clock::{Clock, SystemClock};
pub use error::{Result, StorageError, ThrottleError};
pub use logging::init as init_logging;
pub use rules::{RateLimit, RateLimitSet};
pub use storage::{EventStore, MemoryEventStore, RedisEventStore};
pub use throttle::{Decision, Throttle};
