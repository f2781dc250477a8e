//! Synchronous fan-out of one alert to many targets.
//!
//! Every target gets its own task; a semaphore bounds how many publish at
//! once. A failing, slow, or breaker-blocked target only affects its own
//! entry in the result.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use klaxon_common::{
    Alert, Target, internal,
    tracing::{self, debug},
};
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    circuit_breaker::CircuitBreaker,
    classifier::classify,
    config::CoordinatorConfig,
    dispatch::Dispatcher,
    error::{DeliveryError, PublishError, SystemError},
    mode::ModeManager,
    publisher::{HealthChecker, TargetDiscovery},
};

/// Outcome of one target in a fan-out
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub success: bool,
    pub error: Option<DeliveryError>,
    pub duration: Duration,
}

impl TargetOutcome {
    fn failed(target: String, error: DeliveryError, duration: Duration) -> Self {
        Self {
            target,
            success: false,
            error: Some(error),
            duration,
        }
    }
}

/// Aggregate of a fan-out, in the order targets were given
#[derive(Debug, Default)]
pub struct ParallelPublishResult {
    pub results: Vec<TargetOutcome>,
    pub success_count: usize,
    pub failure_count: usize,
    pub duration: Duration,
}

impl ParallelPublishResult {
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }

    #[must_use]
    pub fn outcome(&self, target: &str) -> Option<&TargetOutcome> {
        self.results.iter().find(|outcome| outcome.target == target)
    }

    /// Compact, serialisable view for status output
    #[must_use]
    pub fn summary(&self) -> FanOutSummary {
        FanOutSummary {
            success_count: self.success_count,
            failure_count: self.failure_count,
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            failures: self
                .results
                .iter()
                .filter_map(|outcome| {
                    outcome
                        .error
                        .as_ref()
                        .map(|e| (outcome.target.clone(), e.to_string()))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub duration_ms: u64,
    /// `(target, error)` for every failed target
    pub failures: Vec<(String, String)>,
}

/// Publishes one alert to many targets at once with bounded parallelism
#[derive(Debug, Clone)]
pub struct ParallelPublisher {
    mode: Arc<ModeManager>,
    breaker: Arc<CircuitBreaker>,
    dispatcher: Dispatcher,
    discovery: Arc<dyn TargetDiscovery>,
    health: Option<Arc<dyn HealthChecker>>,
    max_concurrency: usize,
}

impl ParallelPublisher {
    #[must_use]
    pub fn new(
        config: &CoordinatorConfig,
        mode: Arc<ModeManager>,
        breaker: Arc<CircuitBreaker>,
        dispatcher: Dispatcher,
        discovery: Arc<dyn TargetDiscovery>,
    ) -> Self {
        Self {
            mode,
            breaker,
            dispatcher,
            discovery,
            health: None,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn with_health_checker(mut self, health: Arc<dyn HealthChecker>) -> Self {
        self.health = Some(health);
        self
    }

    /// Publish `alert` to every target in `targets`
    ///
    /// Returns once every target finished or `cancel` fired; targets not
    /// finished by then are recorded as [`DeliveryError::Cancelled`].
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] if no targets are enabled; all other
    /// failures are per target
    #[tracing::instrument(level = "debug", skip_all, fields(fingerprint = %alert.fingerprint, targets = targets.len()))]
    pub async fn publish_to_targets(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
        targets: Vec<Target>,
    ) -> Result<ParallelPublishResult, DeliveryError> {
        if self.mode.is_metrics_only() {
            if let Some(metrics) = klaxon_metrics::try_metrics() {
                metrics.publish.record_rejection(DeliveryError::MetricsOnly.label());
            }
            return Err(DeliveryError::MetricsOnly);
        }

        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let alert = Arc::new(alert.clone());
        let mut slots: Vec<Option<TargetOutcome>> = Vec::with_capacity(targets.len());
        slots.resize_with(targets.len(), || None);
        let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();

        let mut tasks = JoinSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let attempt = TargetAttempt {
                breaker: Arc::clone(&self.breaker),
                dispatcher: self.dispatcher.clone(),
                permits: Arc::clone(&permits),
                cancel: cancel.clone(),
                alert: Arc::clone(&alert),
                target,
            };
            tasks.spawn(async move { (index, attempt.run().await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => debug!(error = %e, "Fan-out task did not complete"),
            }
        }

        let duration = started.elapsed();
        let results: Vec<TargetOutcome> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    TargetOutcome::failed(
                        name,
                        SystemError::Internal("publish task panicked".to_string()).into(),
                        duration,
                    )
                })
            })
            .collect();

        let success_count = results.iter().filter(|outcome| outcome.success).count();
        let failure_count = results.len() - success_count;

        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics
                .publish
                .record_fanout(success_count as u64, failure_count as u64, duration);
        }
        internal!(
            level = DEBUG,
            success_count,
            failure_count,
            duration_ms = duration.as_millis(),
            "Fan-out finished"
        );

        Ok(ParallelPublishResult {
            results,
            success_count,
            failure_count,
            duration,
        })
    }

    /// Publish to every enabled target
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    pub async fn publish_to_all(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError> {
        let targets = self.enabled_targets().await?;
        self.publish_to_targets(cancel, alert, targets).await
    }

    /// Publish to enabled targets considered healthy
    ///
    /// With a health checker configured it decides; otherwise a target is
    /// healthy while its breaker is not open.
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    pub async fn publish_to_healthy(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError> {
        let mut healthy = Vec::new();
        for target in self.enabled_targets().await? {
            let is_healthy = match &self.health {
                Some(health) => health.is_healthy(&target).await,
                None => !self.breaker.is_open(&target.name),
            };
            if is_healthy {
                healthy.push(target);
            } else {
                debug!(target = %target.name, "Skipping unhealthy target");
            }
        }

        self.publish_to_targets(cancel, alert, healthy).await
    }

    /// Publish to the named targets
    ///
    /// Names discovery does not know, or that are disabled, are reported as
    /// failed entries.
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    pub async fn publish_to_named(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
        names: &[String],
    ) -> Result<ParallelPublishResult, DeliveryError> {
        let known = self.enabled_targets().await?;
        let (found, missing): (Vec<_>, Vec<_>) = names
            .iter()
            .map(|name| (name, known.iter().find(|t| &t.name == name).cloned()))
            .partition(|(_, target)| target.is_some());

        let targets = found.into_iter().filter_map(|(_, target)| target).collect();
        let mut result = self.publish_to_targets(cancel, alert, targets).await?;

        for (name, _) in missing {
            result.results.push(TargetOutcome::failed(
                name.clone(),
                SystemError::TargetNotFound(name.clone()).into(),
                Duration::ZERO,
            ));
            result.failure_count += 1;
        }

        Ok(result)
    }

    async fn enabled_targets(&self) -> Result<Vec<Target>, DeliveryError> {
        if self.mode.is_metrics_only() {
            return Err(DeliveryError::MetricsOnly);
        }
        Ok(self.discovery.enabled_targets().await?)
    }
}

/// Everything one fan-out task needs, owned so the task is `'static`
struct TargetAttempt {
    breaker: Arc<CircuitBreaker>,
    dispatcher: Dispatcher,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    alert: Arc<Alert>,
    target: Target,
}

impl TargetAttempt {
    async fn run(self) -> TargetOutcome {
        let started = Instant::now();
        let name = self.target.name.clone();

        let _slot = tokio::select! {
            slot = self.permits.acquire() => match slot {
                Ok(slot) => slot,
                Err(_) => {
                    return TargetOutcome::failed(name, DeliveryError::Cancelled, started.elapsed());
                }
            },
            () = self.cancel.cancelled() => {
                return TargetOutcome::failed(name, DeliveryError::Cancelled, started.elapsed());
            }
        };

        let permit = match self.breaker.acquire(&name) {
            Ok(permit) => permit,
            Err(rejected) => {
                return TargetOutcome::failed(name, rejected.into(), started.elapsed());
            }
        };

        let result = self
            .dispatcher
            .dispatch(&self.cancel, &self.alert, &self.target)
            .await;
        let duration = started.elapsed();

        match result {
            Ok(()) => {
                permit.succeed();
                TargetOutcome {
                    target: name,
                    success: true,
                    error: None,
                    duration,
                }
            }
            Err(PublishError::Cancelled) => {
                drop(permit);
                TargetOutcome::failed(name, DeliveryError::Cancelled, duration)
            }
            Err(source) => {
                permit.fail();
                let kind = classify(&source);
                if let Some(metrics) = klaxon_metrics::try_metrics() {
                    metrics.publish.record_failure(&name, kind.as_str());
                }
                TargetOutcome::failed(name, DeliveryError::Publish { kind, source }, duration)
            }
        }
    }
}
