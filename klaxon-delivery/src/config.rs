use std::time::Duration;

use serde::Deserialize;

/// Publishing queue and worker pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Worker tasks started by the queue
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Jobs held (pending plus waiting on retry timers) before submissions
    /// are rejected
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    /// Ceiling on a single attempt; a target's own timeout may be shorter
    #[serde(default = "defaults::attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Delay before a job skipped in metrics-only mode is looked at again
    #[serde(default = "defaults::metrics_only_requeue_ms")]
    pub metrics_only_requeue_ms: u64,

    /// Jobs dequeued after this age are dead-lettered without an attempt
    #[serde(default = "defaults::job_ttl_secs")]
    pub job_ttl_secs: Option<u64>,

    /// Queue heads older than this are served ahead of weighted selection
    #[serde(default = "defaults::aging_threshold_ms")]
    pub aging_threshold_ms: Option<u64>,

    /// Job snapshots kept for status queries
    #[serde(default = "defaults::tracker_capacity")]
    pub tracker_capacity: usize,

    /// Grace period for in-flight jobs at shutdown
    #[serde(default = "defaults::shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            capacity: defaults::capacity(),
            attempt_timeout_ms: defaults::attempt_timeout_ms(),
            metrics_only_requeue_ms: defaults::metrics_only_requeue_ms(),
            job_ttl_secs: defaults::job_ttl_secs(),
            aging_threshold_ms: defaults::aging_threshold_ms(),
            tracker_capacity: defaults::tracker_capacity(),
            shutdown_timeout_secs: defaults::shutdown_timeout_secs(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    #[must_use]
    pub const fn metrics_only_requeue(&self) -> Duration {
        Duration::from_millis(self.metrics_only_requeue_ms)
    }

    #[must_use]
    pub fn job_ttl(&self) -> Option<Duration> {
        self.job_ttl_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn aging_threshold(&self) -> Option<Duration> {
        self.aging_threshold_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Parallel fan-out settings
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Targets published to at once by a single fan-out
    #[serde(default = "defaults::max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "defaults::attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: defaults::max_concurrency(),
            attempt_timeout_ms: defaults::attempt_timeout_ms(),
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Mode manager settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModeConfig {
    /// How often discovery is re-read to recompute the mode
    #[serde(default = "defaults::check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::check_interval_ms(),
        }
    }
}

impl ModeConfig {
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

mod defaults {
    pub const fn workers() -> usize {
        4
    }

    pub const fn capacity() -> usize {
        10_000
    }

    pub const fn attempt_timeout_ms() -> u64 {
        30_000
    }

    pub const fn metrics_only_requeue_ms() -> u64 {
        5_000
    }

    #[allow(clippy::unnecessary_wraps, reason = "serde default for an optional field")]
    pub const fn job_ttl_secs() -> Option<u64> {
        Some(3_600)
    }

    #[allow(clippy::unnecessary_wraps, reason = "serde default for an optional field")]
    pub const fn aging_threshold_ms() -> Option<u64> {
        Some(30_000)
    }

    pub const fn tracker_capacity() -> usize {
        10_000
    }

    pub const fn shutdown_timeout_secs() -> u64 {
        30
    }

    pub const fn max_concurrency() -> usize {
        5
    }

    pub const fn check_interval_ms() -> u64 {
        5_000
    }
}
