//! Publishing pipeline metrics
//!
//! Covers the asynchronous queue (sizes, workers, job outcomes, retries,
//! attempt latency), the per-target circuit breakers, the dead-letter store,
//! and synchronous fan-outs.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

const PRIORITIES: [&str; 3] = ["high", "medium", "low"];

/// Numeric encoding of a breaker state for the per-target gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum BreakerStateCode {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl BreakerStateCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

/// Publishing metrics collector
#[derive(Debug)]
pub struct PublishMetrics {
    /// Jobs accepted onto the queue, by target and priority
    jobs_submitted: Counter<u64>,

    /// Jobs that reached a final state, by target and outcome
    jobs_completed: Counter<u64>,

    /// Submissions refused at admission, by reason
    rejections: Counter<u64>,

    /// Failed attempts, by target and error kind
    failures: Counter<u64>,

    /// Retries scheduled, by target
    retries: Counter<u64>,

    /// Latency of individual publish attempts, by target and result
    attempt_duration: Histogram<f64>,

    /// Breaker transitions, by target and new state
    breaker_transitions: Counter<u64>,

    /// Dead-letter activity, by action (added, replayed, purged)
    dead_letter_events: Counter<u64>,

    /// Synchronous fan-outs, by result
    fanout_targets: Counter<u64>,

    /// Wall-clock duration of whole fan-outs
    fanout_duration: Histogram<f64>,

    // Shared with the observable gauge callbacks
    queue_sizes: Arc<[AtomicU64; 3]>,
    active_workers: Arc<AtomicU64>,
    dead_letter_entries: Arc<AtomicU64>,
    breaker_states: Arc<DashMap<String, BreakerStateCode>>,
}

impl PublishMetrics {
    /// Create a new publishing metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let jobs_submitted = meter
            .u64_counter("klaxon.publish.jobs.submitted.total")
            .with_description("Jobs accepted onto the publishing queue")
            .build();

        let jobs_completed = meter
            .u64_counter("klaxon.publish.jobs.completed.total")
            .with_description("Jobs that reached a final state, by outcome")
            .build();

        let rejections = meter
            .u64_counter("klaxon.publish.rejections.total")
            .with_description("Submissions refused at admission time, by reason")
            .build();

        let failures = meter
            .u64_counter("klaxon.publish.failures.total")
            .with_description("Failed publish attempts by target and error kind")
            .build();

        let retries = meter
            .u64_counter("klaxon.publish.retries.total")
            .with_description("Retries scheduled after a failed attempt")
            .build();

        let attempt_duration = meter
            .f64_histogram("klaxon.publish.attempt.duration.seconds")
            .with_description("Distribution of publish attempt latency by target")
            .with_unit("s")
            .build();

        let breaker_transitions = meter
            .u64_counter("klaxon.breaker.transitions.total")
            .with_description("Circuit breaker state transitions by target")
            .build();

        let dead_letter_events = meter
            .u64_counter("klaxon.dead_letter.events.total")
            .with_description("Dead-letter entries added, replayed and purged")
            .build();

        let fanout_targets = meter
            .u64_counter("klaxon.fanout.targets.total")
            .with_description("Per-target results of synchronous fan-outs")
            .build();

        let fanout_duration = meter
            .f64_histogram("klaxon.fanout.duration.seconds")
            .with_description("Wall-clock duration of synchronous fan-outs")
            .with_unit("s")
            .build();

        let queue_sizes: Arc<[AtomicU64; 3]> = Arc::new([
            AtomicU64::new(0),
            AtomicU64::new(0),
            AtomicU64::new(0),
        ]);
        let active_workers = Arc::new(AtomicU64::new(0));
        let dead_letter_entries = Arc::new(AtomicU64::new(0));
        let breaker_states: Arc<DashMap<String, BreakerStateCode>> = Arc::new(DashMap::new());

        let sizes = queue_sizes.clone();
        meter
            .u64_observable_gauge("klaxon.publish.queue.size")
            .with_description("Current queue depth by priority")
            .with_callback(move |observer| {
                for (size, priority) in sizes.iter().zip(PRIORITIES) {
                    observer.observe(
                        size.load(Ordering::Relaxed),
                        &[KeyValue::new("priority", priority)],
                    );
                }
            })
            .build();

        let workers = active_workers.clone();
        meter
            .u64_observable_gauge("klaxon.publish.workers.active")
            .with_description("Workers currently executing a publish attempt")
            .with_callback(move |observer| {
                observer.observe(workers.load(Ordering::Relaxed), &[]);
            })
            .build();

        let entries = dead_letter_entries.clone();
        meter
            .u64_observable_gauge("klaxon.dead_letter.entries")
            .with_description("Entries currently held in the dead-letter store")
            .with_callback(move |observer| {
                observer.observe(entries.load(Ordering::Relaxed), &[]);
            })
            .build();

        let states = breaker_states.clone();
        meter
            .u64_observable_gauge("klaxon.breaker.state")
            .with_description("Circuit breaker state per target (0 closed, 1 half-open, 2 open)")
            .with_callback(move |observer| {
                for entry in states.iter() {
                    observer.observe(
                        *entry.value() as u64,
                        &[KeyValue::new("target", entry.key().clone())],
                    );
                }
            })
            .build();

        Ok(Self {
            jobs_submitted,
            jobs_completed,
            rejections,
            failures,
            retries,
            attempt_duration,
            breaker_transitions,
            dead_letter_events,
            fanout_targets,
            fanout_duration,
            queue_sizes,
            active_workers,
            dead_letter_entries,
            breaker_states,
        })
    }

    pub fn record_job_submitted(&self, target: &str, priority: &str) {
        self.jobs_submitted.add(
            1,
            &[
                KeyValue::new("target", target.to_string()),
                KeyValue::new("priority", priority.to_string()),
            ],
        );
    }

    /// Record a job reaching `succeeded`, `dead_lettered` or `expired`
    pub fn record_job_completed(&self, target: &str, outcome: &str) {
        self.jobs_completed.add(
            1,
            &[
                KeyValue::new("target", target.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }

    /// Record one attempt and how long it took
    pub fn record_attempt(&self, target: &str, result: &str, duration: Duration) {
        self.attempt_duration.record(
            duration.as_secs_f64(),
            &[
                KeyValue::new("target", target.to_string()),
                KeyValue::new("result", result.to_string()),
            ],
        );
    }

    pub fn record_failure(&self, target: &str, error_kind: &str) {
        self.failures.add(
            1,
            &[
                KeyValue::new("target", target.to_string()),
                KeyValue::new("error_kind", error_kind.to_string()),
            ],
        );
    }

    pub fn record_retry(&self, target: &str) {
        self.retries
            .add(1, &[KeyValue::new("target", target.to_string())]);
    }

    /// Set the absolute queue depth for a priority (`high`, `medium`, `low`)
    pub fn set_queue_size(&self, priority: &str, size: u64) {
        if let Some(index) = PRIORITIES.iter().position(|p| *p == priority) {
            self.queue_sizes[index].store(size, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn queue_size(&self, priority: &str) -> u64 {
        PRIORITIES
            .iter()
            .position(|p| *p == priority)
            .map_or(0, |index| self.queue_sizes[index].load(Ordering::Relaxed))
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        // Never wrap below zero if a finish is reported twice
        let _ = self
            .active_workers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    #[must_use]
    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Record a breaker moving to `state` for `target`
    pub fn record_breaker_state(&self, target: &str, state: BreakerStateCode) {
        let previous = self.breaker_states.insert(target.to_string(), state);
        if previous != Some(state) {
            self.breaker_transitions.add(
                1,
                &[
                    KeyValue::new("target", target.to_string()),
                    KeyValue::new("state", state.as_str()),
                ],
            );
        }
    }

    #[must_use]
    pub fn breaker_state(&self, target: &str) -> Option<BreakerStateCode> {
        self.breaker_states.get(target).map(|state| *state)
    }

    pub fn record_dead_letter_added(&self, target: &str, error_kind: &str) {
        self.dead_letter_events.add(
            1,
            &[
                KeyValue::new("action", "added"),
                KeyValue::new("target", target.to_string()),
                KeyValue::new("error_kind", error_kind.to_string()),
            ],
        );
    }

    pub fn record_dead_letter_replayed(&self, target: &str) {
        self.dead_letter_events.add(
            1,
            &[
                KeyValue::new("action", "replayed"),
                KeyValue::new("target", target.to_string()),
            ],
        );
    }

    pub fn record_dead_letter_purged(&self, count: u64) {
        self.dead_letter_events
            .add(count, &[KeyValue::new("action", "purged")]);
    }

    pub fn set_dead_letter_count(&self, count: u64) {
        self.dead_letter_entries.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dead_letter_count(&self) -> u64 {
        self.dead_letter_entries.load(Ordering::Relaxed)
    }

    /// Record the aggregate result of one synchronous fan-out
    pub fn record_fanout(&self, succeeded: u64, failed: u64, duration: Duration) {
        self.fanout_targets
            .add(succeeded, &[KeyValue::new("result", "success")]);
        self.fanout_targets
            .add(failed, &[KeyValue::new("result", "failure")]);
        self.fanout_duration.record(duration.as_secs_f64(), &[]);
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("klaxon.publish")
}
