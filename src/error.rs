// for error definitions
use redis;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThrottleError {
    /// The event store could not complete a prune, record or count.
    ///
    /// When this comes out of `process` the admission state is unknown: the
    /// event may or may not have been recorded.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(StorageError),

    /// A rate limit rule that can never be evaluated (zero-length window)
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThrottleError {
    /// True when the error came from the backing store rather than the caller's input.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ThrottleError::StoreUnavailable(_))
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// The in-memory log is full
    #[error("Event capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The store did not answer within the configured timeout
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The circuit breaker is refusing calls to the backing store
    #[error("Circuit open: {0}")]
    CircuitOpen(String),
}

impl From<StorageError> for ThrottleError {
    fn from(err: StorageError) -> Self {
        ThrottleError::StoreUnavailable(err)
    }
}

// Implement conversions from redis::RedisError to StorageError
impl From<redis::RedisError> for ThrottleError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                ThrottleError::StoreUnavailable(StorageError::RedisAuth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                ThrottleError::StoreUnavailable(StorageError::RedisConnection(err.to_string()))
            }
            _ => ThrottleError::StoreUnavailable(StorageError::RedisCommand(err.to_string())),
        }
    }
}

// rule files and config documents are the only JSON we parse
impl From<serde_json::Error> for ThrottleError {
    fn from(err: serde_json::Error) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, ThrottleError>;
