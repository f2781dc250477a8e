//! Publishing processor orchestration

use std::{num::NonZeroUsize, sync::Arc};

use klaxon_common::{
    Signal, internal,
    tracing::{self, error, warn},
};
use klaxon_dlq::DeadLetterStore;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    config::{CoordinatorConfig, ModeConfig, QueueConfig},
    coordinator::ParallelPublisher,
    dispatch::Dispatcher,
    error::{DeliveryError, SystemError},
    mode::ModeManager,
    policy::RetryPolicy,
    publisher::{Formatter, HealthChecker, PublisherRegistry, TargetDiscovery},
    queue::{PublishingQueue, QueueParts},
    tracker::JobTracker,
};

/// Collaborators supplied by the embedding application
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn TargetDiscovery>,
    pub publishers: PublisherRegistry,
    pub formatter: Arc<dyn Formatter>,
    pub health: Option<Arc<dyn HealthChecker>>,
    pub dead_letters: Arc<DeadLetterStore>,
}

/// The running components, built by [`PublishingProcessor::init`]
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) queue: PublishingQueue,
    pub(crate) coordinator: ParallelPublisher,
    pub(crate) mode: Arc<ModeManager>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) tracker: Arc<JobTracker>,
    pub(crate) dead_letters: Arc<DeadLetterStore>,
    pub(crate) discovery: Arc<dyn TargetDiscovery>,
}

impl Pipeline {
    pub const fn queue(&self) -> &PublishingQueue {
        &self.queue
    }

    pub const fn coordinator(&self) -> &ParallelPublisher {
        &self.coordinator
    }

    pub const fn mode_manager(&self) -> &Arc<ModeManager> {
        &self.mode
    }

    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub const fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub const fn dead_letter_store(&self) -> &Arc<DeadLetterStore> {
        &self.dead_letters
    }
}

/// Owns the publishing pipeline: configuration in, running workers out
///
/// Deserialized from the `delivery` section of the configuration, then
/// [`init`](Self::init)ialised with the application's collaborators and
/// driven by [`serve`](Self::serve) until shutdown.
#[derive(Debug, Default, Deserialize)]
pub struct PublishingProcessor {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub mode: ModeConfig,

    #[serde(skip)]
    pipeline: Option<Arc<Pipeline>>,
}

impl PublishingProcessor {
    /// Build every component around `collaborators`
    ///
    /// The initial mode comes from one discovery read. If that read fails the
    /// processor starts in metrics-only mode and the periodic mode check
    /// picks the targets up once discovery recovers.
    ///
    /// # Errors
    /// If the configuration cannot produce a working pipeline
    pub async fn init(&mut self, collaborators: Collaborators) -> Result<(), DeliveryError> {
        internal!("Initialising publishing processor ...");

        let Collaborators {
            discovery,
            publishers,
            formatter,
            health,
            dead_letters,
        } = collaborators;

        if publishers.is_empty() {
            warn!("No publishers registered, every attempt will fail as unsupported");
        }

        let enabled = match discovery.enabled_targets().await {
            Ok(targets) => targets.len(),
            Err(e) => {
                error!(error = %e, "Initial target discovery failed, starting in metrics-only mode");
                0
            }
        };

        let tracker_capacity = NonZeroUsize::new(self.queue.tracker_capacity).ok_or_else(|| {
            SystemError::Internal("queue.tracker_capacity must be at least 1".to_string())
        })?;

        let mode = Arc::new(ModeManager::new(enabled, self.mode.check_interval()));
        let breaker = Arc::new(CircuitBreaker::new(self.circuit_breaker.clone()));
        let tracker = Arc::new(JobTracker::new(tracker_capacity));
        let publishers = Arc::new(publishers);

        let queue = PublishingQueue::new(
            self.queue.clone(),
            self.retry.clone(),
            QueueParts {
                mode: Arc::clone(&mode),
                breaker: Arc::clone(&breaker),
                tracker: Arc::clone(&tracker),
                dead_letters: Arc::clone(&dead_letters),
                dispatcher: Dispatcher::new(
                    Arc::clone(&publishers),
                    Arc::clone(&formatter),
                    self.queue.attempt_timeout(),
                ),
                discovery: Arc::clone(&discovery),
            },
        );

        let mut coordinator = ParallelPublisher::new(
            &self.coordinator,
            Arc::clone(&mode),
            Arc::clone(&breaker),
            Dispatcher::new(publishers, formatter, self.coordinator.attempt_timeout()),
            Arc::clone(&discovery),
        );
        if let Some(health) = health {
            coordinator = coordinator.with_health_checker(health);
        }

        internal!(
            level = INFO,
            enabled_targets = enabled,
            mode = %mode.current_mode(),
            workers = self.queue.workers,
            capacity = self.queue.capacity,
            max_attempts = self.retry.max_attempts,
            "Publishing processor initialised"
        );

        self.pipeline = Some(Arc::new(Pipeline {
            queue,
            coordinator,
            mode,
            breaker,
            tracker,
            dead_letters,
            discovery,
        }));

        Ok(())
    }

    /// Run the workers and the mode check until a shutdown signal
    ///
    /// On shutdown the queue stops accepting work and in-flight attempts
    /// get `shutdown_timeout_secs` to finish.
    ///
    /// # Errors
    /// [`SystemError::NotInitialized`] if [`init`](Self::init) was not called
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), DeliveryError> {
        let pipeline = self.require_pipeline()?;

        internal!("Publishing processor starting");
        pipeline.queue.start();
        pipeline.mode.start(Arc::clone(&pipeline.discovery));

        match shutdown.recv().await {
            Ok(Signal::Shutdown | Signal::Finalised) => {
                internal!("Publishing processor received shutdown signal");
            }
            Err(e) => error!(error = %e, "Publishing processor shutdown channel error"),
        }

        pipeline.mode.stop();
        let grace = self.queue.shutdown_timeout();
        if pipeline.queue.shutdown(grace).await {
            internal!("All in-flight publish attempts completed");
        } else {
            warn!(
                grace_secs = grace.as_secs(),
                "Shutdown timeout exceeded, in-flight publish attempts were cancelled"
            );
        }

        internal!("Publishing processor shutdown complete");
        Ok(())
    }

    /// The running pipeline, once initialised
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.clone()
    }

    fn require_pipeline(&self) -> Result<&Arc<Pipeline>, DeliveryError> {
        self.pipeline.as_ref().ok_or_else(|| {
            SystemError::NotInitialized(
                "Publishing processor not initialized. Call init() first.".to_string(),
            )
            .into()
        })
    }
}
