//! Per-target circuit breaker to stop hammering failing destinations
//!
//! # States
//!
//! - **Closed**: normal operation, every call allowed
//! - **Open**: tripped after consecutive failures, every call rejected
//!   without touching the network
//! - **Half-Open**: cool-down elapsed, a bounded number of probe calls test
//!   whether the target recovered
//!
//! ```text
//! ┌─────────┐  failure_threshold consecutive failures  ┌──────┐
//! │ Closed  │ ───────────────────────────────────────> │ Open │ <──┐
//! └─────────┘                                          └──────┘    │
//!     ^                                                   │        │
//!     │ success_threshold successes      cooldown elapsed │        │ probe
//!     │                                                   v        │ failure
//!     │                                           ┌───────────┐    │
//!     └────────────────────────────────────────── │ Half-Open │ ───┘
//!                                                 └───────────┘
//! ```
//!
//! Callers obtain a [`BreakerPermit`] from [`CircuitBreaker::acquire`] and
//! settle it with [`BreakerPermit::succeed`] or [`BreakerPermit::fail`]. A
//! probe permit dropped unsettled gives its probe slot back.
//!
//! Every state change, manual resets included, starts a new generation.
//! Permits remember the generation they were issued in, and a permit that
//! settles after its generation ended is ignored.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use klaxon_common::tracing::{debug, info, warn};
use klaxon_metrics::BreakerStateCode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before probing (milliseconds)
    #[serde(default = "defaults::cooldown_ms")]
    pub cooldown_ms: u64,

    /// Probe successes needed to close the circuit from half-open
    #[serde(default = "defaults::success_threshold")]
    pub success_threshold: u32,

    /// Probes allowed in flight at once while half-open
    #[serde(default = "defaults::half_open_max_probes")]
    pub half_open_max_probes: u32,

    /// Per-target overrides, keyed by target name
    #[serde(default)]
    pub target_overrides: ahash::AHashMap<String, TargetBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            cooldown_ms: defaults::cooldown_ms(),
            success_threshold: defaults::success_threshold(),
            half_open_max_probes: defaults::half_open_max_probes(),
            target_overrides: ahash::AHashMap::default(),
        }
    }
}

impl CircuitBreakerConfig {
    fn for_target(&self, target: &str) -> TargetBreakerConfig {
        self.target_overrides
            .get(target)
            .cloned()
            .unwrap_or(TargetBreakerConfig {
                failure_threshold: self.failure_threshold,
                cooldown_ms: self.cooldown_ms,
                success_threshold: self.success_threshold,
            })
    }
}

mod defaults {
    pub const fn failure_threshold() -> u32 {
        5
    }

    pub const fn cooldown_ms() -> u64 {
        30_000
    }

    pub const fn success_threshold() -> u32 {
        1
    }

    pub const fn half_open_max_probes() -> u32 {
        1
    }
}

/// Per-target circuit breaker configuration override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub success_threshold: u32,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    const fn code(self) -> BreakerStateCode {
        match self {
            Self::Closed => BreakerStateCode::Closed,
            Self::Open => BreakerStateCode::Open,
            Self::HalfOpen => BreakerStateCode::HalfOpen,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when the breaker refuses a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerRejected {
    pub target: String,
    /// How long until a call could be admitted again
    pub retry_after: Duration,
}

impl From<BreakerRejected> for DeliveryError {
    fn from(rejected: BreakerRejected) -> Self {
        Self::BreakerOpen(rejected.target)
    }
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    probes_in_flight: u32,
    generation: u64,
    opened_at: Option<Instant>,
    last_transition: Instant,
    config: TargetBreakerConfig,
    max_probes: u32,
}

impl BreakerData {
    fn new(config: TargetBreakerConfig, max_probes: u32) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            probes_in_flight: 0,
            generation: 0,
            opened_at: None,
            last_transition: Instant::now(),
            config,
            max_probes: max_probes.max(1),
        }
    }

    const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.cooldown_ms)
    }

    /// Cool-down left while Open, `None` once it has elapsed
    fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        let opened_at = self.opened_at?;
        self.cooldown()
            .checked_sub(now.duration_since(opened_at))
            .filter(|remaining| !remaining.is_zero())
    }

    fn is_open(&self, now: Instant) -> bool {
        self.state == CircuitState::Open && self.remaining_cooldown(now).is_some()
    }

    fn move_to(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.generation = self.generation.wrapping_add(1);
        self.last_transition = now;
        self.consecutive_successes = 0;

        match state {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.probes_in_flight = 0;
            }
            CircuitState::HalfOpen => self.probes_in_flight = 0,
        }
    }

    /// Admit a call. `Ok(true)` marks a probe.
    fn try_acquire(&mut self, now: Instant) -> (Result<bool, Duration>, Option<CircuitState>) {
        let mut transition = None;

        if self.state == CircuitState::Open {
            if let Some(remaining) = self.remaining_cooldown(now) {
                return (Err(remaining), None);
            }
            self.move_to(CircuitState::HalfOpen, now);
            transition = Some(CircuitState::HalfOpen);
        }

        let admitted = match self.state {
            CircuitState::Closed => Ok(false),
            CircuitState::HalfOpen if self.probes_in_flight < self.max_probes => {
                self.probes_in_flight += 1;
                Ok(true)
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                Err(self
                    .cooldown()
                    .clamp(Duration::from_millis(100), Duration::from_secs(1)))
            }
        };

        (admitted, transition)
    }

    /// Slots and counters from earlier generations were already cleared
    const fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn release_probe(&mut self, probe: bool) {
        if probe {
            self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
        }
    }

    fn on_success(&mut self, probe: bool, now: Instant) -> Option<CircuitState> {
        self.release_probe(probe);

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.config.success_threshold {
                    self.move_to(CircuitState::Closed, now);
                    Some(CircuitState::Closed)
                } else {
                    None
                }
            }
            // A straggler admitted before the circuit opened
            CircuitState::Open => None,
        }
    }

    fn on_failure(&mut self, probe: bool, now: Instant) -> Option<CircuitState> {
        self.release_probe(probe);

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.move_to(CircuitState::Open, now);
                    Some(CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.move_to(CircuitState::Open, now);
                Some(CircuitState::Open)
            }
            CircuitState::Open => None,
        }
    }

    fn stats(&self, now: Instant) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            probes_in_flight: self.probes_in_flight,
            since_last_transition: now.duration_since(self.last_transition),
            remaining_cooldown: if self.state == CircuitState::Open {
                self.remaining_cooldown(now)
            } else {
                None
            },
        }
    }
}

fn report_transition(target: &str, state: CircuitState, data: &BreakerData) {
    match state {
        CircuitState::Open => warn!(
            target_name = %target,
            consecutive_failures = data.consecutive_failures,
            threshold = data.config.failure_threshold,
            cooldown_ms = data.config.cooldown_ms,
            "Circuit breaker OPENED - rejecting publishes to target"
        ),
        CircuitState::HalfOpen => info!(
            target_name = %target,
            "Circuit breaker entering HALF-OPEN state - probing target"
        ),
        CircuitState::Closed => info!(
            target_name = %target,
            "Circuit breaker CLOSED - normal operation resumed"
        ),
    }

    if let Some(metrics) = klaxon_metrics::try_metrics() {
        metrics.publish.record_breaker_state(target, state.code());
    }
}

type Shared = Arc<Mutex<BreakerData>>;

/// Per-target circuit breaker manager
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Shared>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn get_breaker(&self, target: &str) -> Shared {
        if let Some(existing) = self.breakers.get(target) {
            return existing.clone();
        }

        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(BreakerData::new(
                    self.config.for_target(target),
                    self.config.half_open_max_probes,
                )))
            })
            .clone()
    }

    /// Ask to make one call to `target`
    ///
    /// Moves an Open breaker whose cool-down elapsed to Half-Open and admits
    /// the caller as a probe.
    ///
    /// # Errors
    /// [`BreakerRejected`] while Open, or while Half-Open with every probe
    /// slot taken
    pub fn acquire(&self, target: &str) -> Result<BreakerPermit, BreakerRejected> {
        let breaker = self.get_breaker(target);
        let mut data = breaker.lock();
        let (admitted, transition) = data.try_acquire(Instant::now());
        let generation = data.generation;

        if let Some(state) = transition {
            report_transition(target, state, &data);
        }
        drop(data);

        match admitted {
            Ok(probe) => Ok(BreakerPermit {
                breaker,
                target: target.to_string(),
                probe,
                generation,
                settled: false,
            }),
            Err(retry_after) => Err(BreakerRejected {
                target: target.to_string(),
                retry_after,
            }),
        }
    }

    /// Whether `target` is Open with cool-down still running
    ///
    /// Does not move the breaker to Half-Open and never creates state for
    /// unknown targets.
    #[must_use]
    pub fn is_open(&self, target: &str) -> bool {
        self.breakers
            .get(target)
            .is_some_and(|breaker| breaker.lock().is_open(Instant::now()))
    }

    #[must_use]
    pub fn state(&self, target: &str) -> CircuitState {
        self.breakers
            .get(target)
            .map_or(CircuitState::Closed, |breaker| breaker.lock().state)
    }

    #[must_use]
    pub fn stats(&self, target: &str) -> Option<CircuitBreakerStats> {
        self.breakers
            .get(target)
            .map(|breaker| breaker.lock().stats(Instant::now()))
    }

    /// Stats for every target seen so far, sorted by target name
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerStats)> {
        let now = Instant::now();
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().stats(now)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Force `target` back to Closed
    ///
    /// Returns `false` if the target has no breaker state yet.
    pub fn reset(&self, target: &str) -> bool {
        let Some(breaker) = self.breakers.get(target).map(|b| b.clone()) else {
            return false;
        };

        let mut data = breaker.lock();
        let was = data.state;
        data.move_to(CircuitState::Closed, Instant::now());
        if was != CircuitState::Closed {
            report_transition(target, CircuitState::Closed, &data);
        }
        info!(target_name = %target, previous = %was, "Circuit breaker manually reset");

        true
    }

    /// Force every known breaker back to Closed, returning how many existed
    pub fn reset_all(&self) -> usize {
        let targets: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        targets.iter().filter(|target| self.reset(target)).count()
    }
}

/// Admission to make one call
///
/// Settle with [`BreakerPermit::succeed`] or [`BreakerPermit::fail`].
#[derive(Debug)]
#[must_use = "an unsettled permit does not record the call's outcome"]
pub struct BreakerPermit {
    breaker: Shared,
    target: String,
    probe: bool,
    generation: u64,
    settled: bool,
}

impl BreakerPermit {
    /// Whether this call is a Half-Open probe
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settle(true);
    }

    pub fn fail(mut self) {
        self.settle(false);
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        let now = Instant::now();
        let mut data = self.breaker.lock();

        if !data.is_current(self.generation) {
            debug!(
                target_name = %self.target,
                success,
                "Ignoring outcome of a call admitted before the breaker changed state"
            );
            return;
        }

        let transition = if success {
            data.on_success(self.probe, now)
        } else {
            data.on_failure(self.probe, now)
        };

        if let Some(state) = transition {
            report_transition(&self.target, state, &data);
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled {
            let mut data = self.breaker.lock();
            if data.is_current(self.generation) {
                data.release_probe(self.probe);
            }
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Successes counted while Half-Open
    pub consecutive_successes: u32,
    pub probes_in_flight: u32,
    pub since_last_transition: Duration,
    pub remaining_cooldown: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, cooldown_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            cooldown_ms,
            ..CircuitBreakerConfig::default()
        }
    }

    fn fail_n(breaker: &CircuitBreaker, target: &str, n: u32) {
        for _ in 0..n {
            breaker.acquire(target).expect("admitted").fail();
        }
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let breaker = CircuitBreaker::new(config(3, 60_000));

        assert_eq!(breaker.state("slack"), CircuitState::Closed);
        assert!(!breaker.is_open("slack"));

        fail_n(&breaker, "slack", 2);
        assert_eq!(breaker.state("slack"), CircuitState::Closed);

        fail_n(&breaker, "slack", 1);
        assert_eq!(breaker.state("slack"), CircuitState::Open);
        assert!(breaker.is_open("slack"));

        let rejected = breaker.acquire("slack").expect_err("open breaker rejects");
        assert_eq!(rejected.target, "slack");
        assert!(rejected.retry_after > Duration::ZERO);
        assert!(matches!(
            DeliveryError::from(rejected),
            DeliveryError::BreakerOpen(t) if t == "slack"
        ));
    }

    #[test]
    fn test_targets_are_independent() {
        let breaker = CircuitBreaker::new(config(2, 60_000));

        fail_n(&breaker, "slack", 2);
        assert!(breaker.is_open("slack"));
        assert!(!breaker.is_open("pagerduty"));
        breaker.acquire("pagerduty").expect("other target unaffected").succeed();
    }

    #[test]
    fn test_half_open_probe_success_closes() {
        let breaker = CircuitBreaker::new(config(2, 0));

        fail_n(&breaker, "slack", 2);
        assert_eq!(breaker.state("slack"), CircuitState::Open);

        let probe = breaker.acquire("slack").expect("cool-down elapsed");
        assert!(probe.is_probe());
        assert_eq!(breaker.state("slack"), CircuitState::HalfOpen);

        probe.succeed();
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
        assert_eq!(
            breaker.stats("slack").expect("known target").consecutive_failures,
            0
        );
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(config(2, 0));

        fail_n(&breaker, "slack", 2);
        let probe = breaker.acquire("slack").expect("cool-down elapsed");
        probe.fail();

        assert_eq!(breaker.state("slack"), CircuitState::Open);
    }

    #[test]
    fn test_half_open_admits_one_probe_at_a_time() {
        let breaker = CircuitBreaker::new(config(1, 0));

        fail_n(&breaker, "slack", 1);
        let probe = breaker.acquire("slack").expect("first probe");
        assert!(breaker.acquire("slack").is_err(), "second probe rejected");

        drop(probe);
        let again = breaker
            .acquire("slack")
            .expect("dropped probe frees its slot");
        assert!(again.is_probe());
        again.succeed();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Sleeps on the real clock")]
    fn test_cooldown_gates_probe() {
        let breaker = CircuitBreaker::new(config(1, 50));

        fail_n(&breaker, "slack", 1);
        assert!(breaker.acquire("slack").is_err());

        std::thread::sleep(Duration::from_millis(80));
        assert!(!breaker.is_open("slack"));
        breaker.acquire("slack").expect("probe after cool-down").succeed();
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(config(3, 60_000));

        fail_n(&breaker, "slack", 2);
        breaker.acquire("slack").expect("closed").succeed();
        fail_n(&breaker, "slack", 2);

        assert_eq!(breaker.state("slack"), CircuitState::Closed);
    }

    #[test]
    fn test_success_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            success_threshold: 2,
            half_open_max_probes: 2,
            ..config(1, 0)
        });

        fail_n(&breaker, "slack", 1);
        breaker.acquire("slack").expect("probe").succeed();
        assert_eq!(breaker.state("slack"), CircuitState::HalfOpen);
        breaker.acquire("slack").expect("probe").succeed();
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new(config(1, 60_000));
        assert!(!breaker.reset("unknown"));

        fail_n(&breaker, "slack", 1);
        fail_n(&breaker, "webhook", 1);
        assert!(breaker.reset("slack"));
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
        assert!(breaker.is_open("webhook"));

        assert_eq!(breaker.reset_all(), 2);
        assert!(!breaker.is_open("webhook"));
    }

    #[test]
    fn test_permit_from_before_open_is_ignored() {
        let breaker = CircuitBreaker::new(config(2, 60_000));

        let straggler = breaker.acquire("slack").expect("closed");
        fail_n(&breaker, "slack", 2);
        assert_eq!(breaker.state("slack"), CircuitState::Open);

        straggler.succeed();
        assert_eq!(breaker.state("slack"), CircuitState::Open);
        assert_eq!(
            breaker.stats("slack").expect("known target").consecutive_failures,
            2
        );
    }

    #[test]
    fn test_stale_probe_does_not_touch_new_half_open() {
        let breaker = CircuitBreaker::new(config(1, 0));

        fail_n(&breaker, "slack", 1);
        let stale = breaker.acquire("slack").expect("first probe");
        assert!(stale.is_probe());

        // Reopen, then let the next acquire start a fresh half-open round
        breaker.reset("slack");
        fail_n(&breaker, "slack", 1);
        let current = breaker.acquire("slack").expect("fresh probe");
        assert_eq!(
            breaker.stats("slack").expect("known target").probes_in_flight,
            1
        );

        stale.fail();
        assert_eq!(breaker.state("slack"), CircuitState::HalfOpen);
        assert_eq!(
            breaker.stats("slack").expect("known target").probes_in_flight,
            1
        );

        current.succeed();
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
    }

    #[test]
    fn test_permit_settled_after_reset_does_not_count() {
        let breaker = CircuitBreaker::new(config(2, 60_000));

        fail_n(&breaker, "slack", 1);
        let straggler = breaker.acquire("slack").expect("closed");
        assert!(breaker.reset("slack"));

        straggler.fail();
        assert_eq!(
            breaker.stats("slack").expect("known target").consecutive_failures,
            0
        );

        fail_n(&breaker, "slack", 1);
        assert_eq!(breaker.state("slack"), CircuitState::Closed);
    }

    #[test]
    fn test_stale_probe_dropped_unsettled_keeps_new_slot() {
        let breaker = CircuitBreaker::new(config(1, 0));

        fail_n(&breaker, "slack", 1);
        let stale = breaker.acquire("slack").expect("first probe");
        breaker.reset("slack");
        fail_n(&breaker, "slack", 1);
        let current = breaker.acquire("slack").expect("fresh probe");

        drop(stale);
        assert!(
            breaker.acquire("slack").is_err(),
            "slot still held by the current probe"
        );
        current.succeed();
    }

    #[test]
    fn test_target_overrides() {
        let mut config = config(5, 60_000);
        config.target_overrides.insert(
            "flaky".to_string(),
            TargetBreakerConfig {
                failure_threshold: 1,
                cooldown_ms: 60_000,
                success_threshold: 1,
            },
        );
        let breaker = CircuitBreaker::new(config);

        fail_n(&breaker, "flaky", 1);
        fail_n(&breaker, "steady", 1);

        assert!(breaker.is_open("flaky"));
        assert!(!breaker.is_open("steady"));
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let breaker = CircuitBreaker::new(config(5, 60_000));
        fail_n(&breaker, "webhook", 1);
        fail_n(&breaker, "pagerduty", 2);

        let snapshot = breaker.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["pagerduty", "webhook"]);
        assert_eq!(snapshot[0].1.consecutive_failures, 2);
    }

    #[test]
    fn test_config_from_ron() {
        let config: CircuitBreakerConfig = ron::from_str(
            r#"(
                failure_threshold: 3,
                target_overrides: {
                    "pagerduty": (failure_threshold: 10, cooldown_ms: 5000, success_threshold: 2),
                },
            )"#,
        )
        .expect("valid breaker config");

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.cooldown_ms, 30_000);
        assert_eq!(config.half_open_max_probes, 1);
        assert_eq!(config.for_target("pagerduty").failure_threshold, 10);
        assert_eq!(config.for_target("slack").failure_threshold, 3);
    }
}
