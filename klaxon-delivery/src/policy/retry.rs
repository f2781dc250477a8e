//! Retry policy for publish attempts.
//!
//! Decides whether a failed attempt is retried and how long to wait first,
//! independently of the queue that acts on the decision.

use std::time::Duration;

use klaxon_common::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration for publish jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (milliseconds).
    ///
    /// The delay before retry `n` (0-based) is `base * 2^n`.
    ///
    /// Default: 1000
    #[serde(default = "defaults::base_interval_ms")]
    pub base_interval_ms: u64,

    /// Cap applied to the exponential part of the delay (milliseconds).
    ///
    /// Default: 30000
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to every delay
    /// (milliseconds). Zero disables jitter.
    ///
    /// Default: 1000
    #[serde(default = "defaults::jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_interval_ms: defaults::base_interval_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
            jitter_ms: defaults::jitter_ms(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a job that has made `attempts` attempts, the last failing
    /// with `kind`, should be tried again.
    #[must_use]
    pub const fn should_retry(&self, kind: ErrorKind, attempts: u32) -> bool {
        kind.is_retryable() && attempts < self.max_attempts
    }

    /// Deterministic part of the delay before retry `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = 1_u64
            .checked_shl(attempt)
            .and_then(|factor| self.base_interval_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);

        Duration::from_millis(exponential.min(self.max_backoff_ms))
    }

    /// Delay before retry `attempt` (0-based): the backoff plus a random
    /// jitter in `[0, jitter_ms)`.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.jitter_ms)
        };

        self.backoff(attempt) + Duration::from_millis(jitter)
    }

    /// Get the number of attempts left.
    ///
    /// Returns `0` if max attempts has been reached.
    #[must_use]
    pub const fn remaining_attempts(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }

    /// Check if the next attempt would be the last one allowed.
    #[must_use]
    pub const fn is_final_attempt(&self, attempts: u32) -> bool {
        attempts.saturating_add(1) >= self.max_attempts
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_interval_ms() -> u64 {
        1_000
    }

    pub const fn max_backoff_ms() -> u64 {
        30_000
    }

    pub const fn jitter_ms() -> u64 {
        1_000
    }
}
