//! System mode metrics

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

use crate::MetricsError;

/// Mode manager metrics collector
#[derive(Debug)]
pub struct ModeMetrics {
    transitions: Counter<u64>,

    // 0 = normal, 1 = metrics-only
    current_mode: Arc<AtomicU64>,
    enabled_targets: Arc<AtomicU64>,
}

impl ModeMetrics {
    /// Create a new mode metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let transitions = meter
            .u64_counter("klaxon.mode.transitions.total")
            .with_description("System mode transitions by source and destination mode")
            .build();

        let current_mode = Arc::new(AtomicU64::new(0));
        let enabled_targets = Arc::new(AtomicU64::new(0));

        let mode = current_mode.clone();
        meter
            .u64_observable_gauge("klaxon.mode.current")
            .with_description("Current system mode (0 normal, 1 metrics-only)")
            .with_callback(move |observer| {
                observer.observe(mode.load(Ordering::Relaxed), &[]);
            })
            .build();

        let targets = enabled_targets.clone();
        meter
            .u64_observable_gauge("klaxon.mode.enabled_targets")
            .with_description("Enabled publishing targets at the last mode evaluation")
            .with_callback(move |observer| {
                observer.observe(targets.load(Ordering::Relaxed), &[]);
            })
            .build();

        Ok(Self {
            transitions,
            current_mode,
            enabled_targets,
        })
    }

    /// Record a transition between two modes, named by their labels
    pub fn record_transition(&self, from: &str, to: &str, metrics_only: bool) {
        self.current_mode
            .store(u64::from(metrics_only), Ordering::Relaxed);
        self.transitions.add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
    }

    pub fn set_enabled_targets(&self, count: u64) {
        self.enabled_targets.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn enabled_targets(&self) -> u64 {
        self.enabled_targets.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_metrics_only(&self) -> bool {
        self.current_mode.load(Ordering::Relaxed) == 1
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("klaxon.mode")
}
