//! Time source for throttle decisions.
//!
//! Events are stamped in whole seconds since the Unix epoch. Tests swap in
//! `MockClock` from `test_utils` to step time deterministically.

use chrono::Utc;
use std::fmt::Debug;

/// Source of "now" for pruning, recording and window evaluation.
pub trait Clock: Send + Sync + Debug {
    /// Current wall-clock time in seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // Clamp pre-epoch clocks to zero
        Utc::now().timestamp().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_seconds() {
        let clock = SystemClock::new();
        let now = clock.now();

        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800);

        let std_now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(std_now.abs_diff(now) <= 1);
    }
}
