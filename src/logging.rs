use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,throttle=trace
pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(filter())
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // Useful for debugging concurrency issues
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Same as [`init`] but emits one JSON object per line.
pub fn init_json() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(filter())
            .with(fmt::layer().json().with_current_span(false))
            .init();

        tracing::info!("JSON logging initialized");
    });
}

/// Macro for logging throttle decisions
#[macro_export]
macro_rules! throttle_event {
    ($throttle:expr, $requestor:expr, $admitted:expr, $violated:expr, $rules:expr) => {
        tracing::info!(
            throttle_id = $throttle,
            requestor_id = $requestor,
            admitted = $admitted,
            violated = $violated,
            rules = $rules,
            "Throttle check"
        )
    };
}

/// Macro for logging store operations with timing
#[macro_export]
macro_rules! store_op {
    ($operation:expr, $throttle:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            throttle_id = $throttle,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Store operation"
        )
    };
}
