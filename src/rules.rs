// src/rules.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ThrottleError};

/// At most `max_requests` events within the trailing `window_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimit {
    /// Length of the trailing window in seconds
    pub window_seconds: u64,

    /// Number of events allowed inside the window
    pub max_requests: u64,
}

impl RateLimit {
    pub fn new(window_seconds: u64, max_requests: u64) -> Self {
        Self {
            window_seconds,
            max_requests,
        }
    }

    /// Rejects rules that cannot describe a window.
    pub fn validate(&self) -> Result<()> {
        if self.window_seconds == 0 {
            return Err(ThrottleError::InvalidRule(format!(
                "window_seconds must be positive (got {})",
                self
            )));
        }
        Ok(())
    }

    /// Oldest timestamp that still falls inside this rule's window at `now`.
    pub fn window_start(&self, now: u64) -> u64 {
        now.saturating_sub(self.window_seconds)
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.max_requests, self.window_seconds)
    }
}

/// Parses `"<window_seconds>:<max_requests>"`, e.g. `60:2`.
impl FromStr for RateLimit {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self> {
        let (window, max) = s.split_once(':').ok_or_else(|| {
            ThrottleError::InvalidRule(format!("expected <window>:<max>, got '{}'", s))
        })?;

        let window_seconds = window.trim().parse::<u64>().map_err(|e| {
            ThrottleError::InvalidRule(format!("bad window in '{}': {}", s, e))
        })?;
        let max_requests = max.trim().parse::<u64>().map_err(|e| {
            ThrottleError::InvalidRule(format!("bad max_requests in '{}': {}", s, e))
        })?;

        let rule = RateLimit::new(window_seconds, max_requests);
        rule.validate()?;
        Ok(rule)
    }
}

/// Ordered rules evaluated together for one throttle invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimitSet {
    limits: Vec<RateLimit>,
}

impl RateLimitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of `{"window_seconds": .., "max_requests": ..}` objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let set: RateLimitSet = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    pub fn push(&mut self, limit: RateLimit) {
        self.limits.push(limit);
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RateLimit> {
        self.limits.iter()
    }

    pub fn as_slice(&self) -> &[RateLimit] {
        &self.limits
    }

    /// Largest window in the set, 0 when empty.
    pub fn max_window(&self) -> u64 {
        self.limits
            .iter()
            .map(|limit| limit.window_seconds)
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.iter().try_for_each(RateLimit::validate)
    }
}

impl From<Vec<RateLimit>> for RateLimitSet {
    fn from(limits: Vec<RateLimit>) -> Self {
        Self { limits }
    }
}

impl FromIterator<RateLimit> for RateLimitSet {
    fn from_iter<I: IntoIterator<Item = RateLimit>>(iter: I) -> Self {
        Self {
            limits: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RateLimitSet {
    type Item = RateLimit;
    type IntoIter = std::vec::IntoIter<RateLimit>;

    fn into_iter(self) -> Self::IntoIter {
        self.limits.into_iter()
    }
}

impl<'a> IntoIterator for &'a RateLimitSet {
    type Item = &'a RateLimit;
    type IntoIter = std::slice::Iter<'a, RateLimit>;

    fn into_iter(self) -> Self::IntoIter {
        self.limits.iter()
    }
}
