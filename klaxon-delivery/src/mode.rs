//! Process-wide operating mode.
//!
//! The mode is `MetricsOnly` exactly when the last reported count of enabled
//! targets was zero, and `Normal` otherwise. Reads are a single atomic load;
//! updates are serialised. There is no hysteresis: a target set flapping
//! between empty and non-empty flaps the mode with it.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use klaxon_common::{
    internal,
    tracing::{self, error, warn},
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::publisher::TargetDiscovery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Mode {
    Normal = 0,
    MetricsOnly = 1,
}

impl Mode {
    #[must_use]
    pub const fn for_enabled_targets(count: usize) -> Self {
        if count == 0 {
            Self::MetricsOnly
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::MetricsOnly => "metrics_only",
        }
    }

    const fn from_u8(value: u8) -> Self {
        if value == Self::MetricsOnly as u8 {
            Self::MetricsOnly
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability view of the mode manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeStatus {
    pub mode: Mode,
    pub enabled_targets: usize,
    pub transitions: u64,
    pub last_transition: Option<DateTime<Utc>>,
}

type Callback = Arc<dyn Fn(Mode, Mode) + Send + Sync>;
type Subscribers = RwLock<Vec<(u64, Callback)>>;

/// Handle returned by [`ModeManager::subscribe`]
#[derive(Debug)]
#[must_use = "dropping the handle keeps the callback registered with no way to remove it"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Stop receiving mode changes
    ///
    /// Returns `false` if the manager is gone or the callback was already
    /// removed.
    pub fn unsubscribe(self) -> bool {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return false;
        };

        let mut subscribers = subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != self.id);
        subscribers.len() != before
    }
}

pub struct ModeManager {
    mode: AtomicU8,
    enabled_targets: AtomicUsize,
    transitions: AtomicU64,
    last_transition: Mutex<Option<DateTime<Utc>>>,
    subscribers: Arc<Subscribers>,
    next_subscriber: AtomicU64,
    check_interval: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl fmt::Debug for ModeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeManager")
            .field("mode", &self.current_mode())
            .field("enabled_targets", &self.enabled_targets.load(Ordering::Relaxed))
            .field("subscribers", &self.subscribers.read().len())
            .field("check_interval", &self.check_interval)
            .finish_non_exhaustive()
    }
}

impl ModeManager {
    /// A manager whose initial mode reflects `enabled_targets`
    #[must_use]
    pub fn new(enabled_targets: usize, check_interval: Duration) -> Self {
        let mode = Mode::for_enabled_targets(enabled_targets);
        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics.mode.set_enabled_targets(enabled_targets as u64);
        }

        Self {
            mode: AtomicU8::new(mode as u8),
            enabled_targets: AtomicUsize::new(enabled_targets),
            transitions: AtomicU64::new(0),
            last_transition: Mutex::new(None),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscriber: AtomicU64::new(0),
            check_interval,
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn current_mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_metrics_only(&self) -> bool {
        self.current_mode() == Mode::MetricsOnly
    }

    /// Recompute the mode from a new enabled-target count
    ///
    /// Subscribers are called after the update is visible, outside every
    /// internal lock, and only when the mode actually changed.
    pub fn on_targets_changed(&self, enabled_targets: usize) {
        let next = Mode::for_enabled_targets(enabled_targets);

        let (previous, callbacks) = {
            let mut last_transition = self.last_transition.lock();
            self.enabled_targets.store(enabled_targets, Ordering::Release);
            if let Some(metrics) = klaxon_metrics::try_metrics() {
                metrics.mode.set_enabled_targets(enabled_targets as u64);
            }

            let previous = Mode::from_u8(self.mode.swap(next as u8, Ordering::AcqRel));
            if previous == next {
                return;
            }

            *last_transition = Some(Utc::now());
            self.transitions.fetch_add(1, Ordering::Relaxed);

            let callbacks: Vec<Callback> = self
                .subscribers
                .read()
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect();
            (previous, callbacks)
        };

        match next {
            Mode::MetricsOnly => warn!(
                enabled_targets,
                "No publishing targets enabled, entering metrics-only mode"
            ),
            Mode::Normal => internal!(
                level = INFO,
                enabled_targets,
                "Publishing targets available, resuming normal mode"
            ),
        }

        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics.mode.record_transition(
                previous.as_str(),
                next.as_str(),
                next == Mode::MetricsOnly,
            );
        }

        for callback in callbacks {
            callback(previous, next);
        }
    }

    /// Call `callback(previous, next)` on every mode change
    pub fn subscribe(&self, callback: impl Fn(Mode, Mode) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(callback)));

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    #[must_use]
    pub fn status(&self) -> ModeStatus {
        let last_transition = *self.last_transition.lock();
        ModeStatus {
            mode: self.current_mode(),
            enabled_targets: self.enabled_targets.load(Ordering::Acquire),
            transitions: self.transitions.load(Ordering::Relaxed),
            last_transition,
        }
    }

    /// Re-read discovery once and apply the result
    ///
    /// A discovery failure leaves the mode unchanged.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn refresh(&self, discovery: &dyn TargetDiscovery) {
        match discovery.enabled_targets().await {
            Ok(targets) => self.on_targets_changed(targets.len()),
            Err(e) => error!(error = %e, "Target discovery failed, keeping current mode"),
        }
    }

    /// Start re-checking discovery every `check_interval`
    ///
    /// Calling `start` while already running does nothing.
    pub fn start(self: &Arc<Self>, discovery: Arc<dyn TargetDiscovery>) {
        let token = {
            let mut running = self.running.lock();
            if running.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *running = Some(token.clone());
            token
        };

        // Weak so that dropping the last handle stops the loop
        let manager = Arc::downgrade(self);
        let mut timer = tokio::time::interval(self.check_interval.max(Duration::from_millis(1)));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.refresh(discovery.as_ref()).await;
                    }
                    () = token.cancelled() => break,
                }
            }

            internal!("Mode manager stopped");
        });
    }

    /// Stop the periodic re-check started by [`ModeManager::start`]
    pub fn stop(&self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for ModeManager {
    fn drop(&mut self) {
        self.stop();
    }
}
