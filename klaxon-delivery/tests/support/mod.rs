//! Scripted collaborators and a queue harness shared by the integration tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use klaxon_delivery::{
    Alert, CircuitBreaker, CircuitBreakerConfig, CoordinatorConfig, Dispatcher, HealthChecker,
    JobId, JobSnapshot, JobState, JobTracker, JsonFormatter, ModeManager, ParallelPublisher,
    Payload, PublishError, Publisher, PublisherRegistry, PublishingQueue, QueueConfig, QueueParts,
    RetryPolicy, StaticDiscovery, Target, TargetKind,
};
use klaxon_dlq::{BackingStore, DeadLetterStore, MemoryBackingStore};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What the scripted publisher does for one call
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail(PublishError),
    /// Succeed after a delay, or stop early on cancellation
    Delay(Duration),
    /// Never finish on its own
    Hang,
}

/// Publisher whose answers are scripted per target and which counts calls
#[derive(Debug, Default)]
pub struct ScriptedPublisher {
    scripted: Mutex<HashMap<String, VecDeque<Behaviour>>>,
    fallback: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every unscripted call to `target` with `behaviour`
    pub fn always(&self, target: &str, behaviour: Behaviour) {
        self.fallback.lock().insert(target.to_string(), behaviour);
    }

    /// Answer the next unanswered call to `target` with `behaviour`
    pub fn then(&self, target: &str, behaviour: Behaviour) {
        self.scripted
            .lock()
            .entry(target.to_string())
            .or_default()
            .push_back(behaviour);
    }

    pub fn calls(&self, target: &str) -> usize {
        self.calls.lock().iter().filter(|t| *t == target).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Targets in the order they were called
    pub fn order(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next(&self, target: &str) -> Behaviour {
        if let Some(behaviour) = self
            .scripted
            .lock()
            .get_mut(target)
            .and_then(VecDeque::pop_front)
        {
            return behaviour;
        }

        self.fallback
            .lock()
            .get(target)
            .cloned()
            .unwrap_or(Behaviour::Succeed)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        _payload: &Payload,
        target: &Target,
    ) -> Result<(), PublishError> {
        self.calls.lock().push(target.name.clone());

        match self.next(&target.name) {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail(e) => Err(e),
            Behaviour::Delay(delay) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => Ok(()),
                    () = cancel.cancelled() => Err(PublishError::Cancelled),
                }
            }
            Behaviour::Hang => {
                cancel.cancelled().await;
                Err(PublishError::Cancelled)
            }
        }
    }
}

/// Health checker answering from a fixed list of unhealthy targets
#[derive(Debug, Default)]
pub struct ScriptedHealth {
    unhealthy: Mutex<Vec<String>>,
}

impl ScriptedHealth {
    pub fn unhealthy(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            unhealthy: Mutex::new(names.iter().map(ToString::to_string).collect()),
        })
    }
}

#[async_trait]
impl HealthChecker for ScriptedHealth {
    async fn is_healthy(&self, target: &Target) -> bool {
        !self.unhealthy.lock().contains(&target.name)
    }
}

pub fn target(name: &str) -> Target {
    Target::new(
        name,
        TargetKind::Webhook,
        format!("https://hooks.example.com/{name}"),
    )
}

pub fn alert(fingerprint: &str, severity: &str) -> Alert {
    Alert::firing(fingerprint, "DiskFull").with_label("severity", severity)
}

pub fn http(status: u16) -> PublishError {
    PublishError::Http {
        status,
        message: "scripted".to_string(),
    }
}

/// Retry quickly and without jitter so timing assertions stay tight
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_interval_ms: 10,
        max_backoff_ms: 50,
        jitter_ms: 0,
    }
}

pub fn queue_config(workers: usize, capacity: usize) -> QueueConfig {
    QueueConfig {
        workers,
        capacity,
        metrics_only_requeue_ms: 20,
        shutdown_timeout_secs: 1,
        ..QueueConfig::default()
    }
}

/// Every component a queue needs, wired to a [`ScriptedPublisher`]
pub struct Harness {
    pub queue: PublishingQueue,
    pub breaker: Arc<CircuitBreaker>,
    pub tracker: Arc<JobTracker>,
    pub mode: Arc<ModeManager>,
    pub dead_letters: Arc<DeadLetterStore>,
    pub discovery: Arc<StaticDiscovery>,
    pub publisher: Arc<ScriptedPublisher>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub async fn new(
        targets: Vec<Target>,
        config: QueueConfig,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self::with_backing_store(
            targets,
            config,
            retry,
            breaker,
            Arc::new(MemoryBackingStore::new()),
        )
        .await
    }

    /// Like [`Harness::new`], with dead letters written to `backend`
    pub async fn with_backing_store(
        targets: Vec<Target>,
        config: QueueConfig,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
        backend: Arc<dyn BackingStore>,
    ) -> Self {
        let publisher = ScriptedPublisher::new();
        let mut publishers = PublisherRegistry::new();
        for kind in [
            TargetKind::Slack,
            TargetKind::PagerDuty,
            TargetKind::Rootly,
            TargetKind::Webhook,
        ] {
            publishers.register(kind, publisher.clone());
        }

        let enabled = targets.iter().filter(|t| t.enabled).count();
        let discovery = Arc::new(StaticDiscovery::new(targets));
        let mode = Arc::new(ModeManager::new(enabled, Duration::from_secs(5)));
        let breaker = Arc::new(CircuitBreaker::new(breaker));
        let tracker = Arc::new(JobTracker::new(NonZeroUsize::new(1_000).unwrap()));
        let dead_letters = Arc::new(
            DeadLetterStore::open(backend)
                .await
                .expect("memory store opens"),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(publishers),
            Arc::new(JsonFormatter),
            config.attempt_timeout(),
        );

        let queue = PublishingQueue::new(
            config,
            retry,
            QueueParts {
                mode: mode.clone(),
                breaker: breaker.clone(),
                tracker: tracker.clone(),
                dead_letters: dead_letters.clone(),
                dispatcher: dispatcher.clone(),
                discovery: discovery.clone(),
            },
        );

        Self {
            queue,
            breaker,
            tracker,
            mode,
            dead_letters,
            discovery,
            publisher,
            dispatcher,
        }
    }

    pub fn coordinator(&self, max_concurrency: usize) -> ParallelPublisher {
        ParallelPublisher::new(
            &CoordinatorConfig {
                max_concurrency,
                ..CoordinatorConfig::default()
            },
            self.mode.clone(),
            self.breaker.clone(),
            self.dispatcher.clone(),
            self.discovery.clone(),
        )
    }

    /// Poll the tracker until `id` reaches `state`
    pub async fn wait_for(&self, id: JobId, state: JobState, within: Duration) -> JobSnapshot {
        let deadline = Instant::now() + within;

        loop {
            if let Some(snapshot) = self.tracker.get(&id)
                && snapshot.state == state
            {
                return snapshot;
            }

            assert!(
                Instant::now() < deadline,
                "job {id} did not reach {state} within {within:?}, last seen {:?}",
                self.tracker.get(&id).map(|s| s.state)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
