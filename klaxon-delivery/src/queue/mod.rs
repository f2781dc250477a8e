//! Priority-ordered publishing queue with a fixed worker pool
//!
//! Jobs are admitted by [`PublishingQueue::submit_job`], wait in a
//! [`PriorityQueue`], and are executed by worker tasks one attempt at a
//! time. Failed attempts are retried from timer tasks so a waiting retry
//! never occupies a worker; jobs that run out of attempts are written to the
//! dead-letter store.

mod priority;
mod worker;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use klaxon_common::{
    Alert, DeadLetterId, JobId, Priority, Target, internal,
    tracing::{debug, warn},
};
use klaxon_dlq::DeadLetterStore;
use parking_lot::Mutex;
pub use priority::{PriorityQueue, TIER_WEIGHTS};
use serde::Serialize;
use tokio::{sync::Notify, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    circuit_breaker::CircuitBreaker,
    config::QueueConfig,
    dispatch::Dispatcher,
    error::{DeliveryError, SystemError},
    job::{JobState, PublishJob},
    mode::ModeManager,
    policy::RetryPolicy,
    publisher::TargetDiscovery,
    tracker::JobTracker,
};

/// Collaborators the queue works with
#[derive(Debug, Clone)]
pub struct QueueParts {
    pub mode: Arc<ModeManager>,
    pub breaker: Arc<CircuitBreaker>,
    pub tracker: Arc<JobTracker>,
    pub dead_letters: Arc<DeadLetterStore>,
    pub dispatcher: Dispatcher,
    pub discovery: Arc<dyn TargetDiscovery>,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Jobs sitting out a retry or requeue delay
    pub waiting: usize,
    pub active_workers: usize,
    pub workers: usize,
    pub capacity: usize,
    pub accepting: bool,
}

impl QueueStatus {
    #[must_use]
    pub const fn size_of(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// Everything counted against capacity
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.high + self.medium + self.low + self.waiting
    }
}

/// Admission outcome for one target of [`PublishingQueue::submit_alert`]
#[derive(Debug)]
pub struct TargetSubmission {
    pub target: String,
    pub result: Result<JobId, DeliveryError>,
}

#[derive(Debug)]
struct Shared {
    config: QueueConfig,
    retry: RetryPolicy,
    mode: Arc<ModeManager>,
    breaker: Arc<CircuitBreaker>,
    tracker: Arc<JobTracker>,
    dead_letters: Arc<DeadLetterStore>,
    dispatcher: Dispatcher,
    discovery: Arc<dyn TargetDiscovery>,

    pending: Mutex<PriorityQueue<PublishJob>>,
    ready: Notify,
    accepting: AtomicBool,
    waiting: AtomicUsize,
    active: AtomicUsize,
    /// Stops workers taking new jobs and cancels retry timers
    stop: CancellationToken,
    /// Cancels attempts still in flight once the shutdown grace period ends
    abort: CancellationToken,
    workers: Mutex<JoinSet<()>>,
}

impl Shared {
    fn check_admission(&self, target: &str) -> Result<(), DeliveryError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(DeliveryError::ShuttingDown);
        }

        if self.mode.is_metrics_only() {
            return Err(DeliveryError::MetricsOnly);
        }

        if self.breaker.is_open(target) {
            return Err(DeliveryError::BreakerOpen(target.to_string()));
        }

        Ok(())
    }

    fn report_queue_sizes(pending: &PriorityQueue<PublishJob>) {
        if let Some(metrics) = klaxon_metrics::try_metrics() {
            for priority in Priority::ALL {
                metrics
                    .publish
                    .set_queue_size(priority.as_str(), pending.len_of(priority) as u64);
            }
        }
    }

    /// Put an already admitted job back in line
    fn enqueue(&self, job: PublishJob) {
        {
            let mut pending = self.pending.lock();
            let priority = job.priority;
            pending.push(job, priority);
            Self::report_queue_sizes(&pending);
        }
        self.ready.notify_one();
    }

    /// Move `job` to `state` and publish the new snapshot
    fn advance(&self, job: &mut PublishJob, state: JobState) {
        match job.transition(state) {
            Ok(()) => self.tracker.record(job.snapshot()),
            Err(e) => warn!(job_id = %job.id, error = %e, "Ignoring invalid job transition"),
        }
    }
}

/// Handle to the queue; clones share the same queue
#[derive(Debug, Clone)]
pub struct PublishingQueue {
    shared: Arc<Shared>,
}

impl PublishingQueue {
    #[must_use]
    pub fn new(config: QueueConfig, retry: RetryPolicy, parts: QueueParts) -> Self {
        let pending = PriorityQueue::new(config.aging_threshold());

        Self {
            shared: Arc::new(Shared {
                config,
                retry,
                mode: parts.mode,
                breaker: parts.breaker,
                tracker: parts.tracker,
                dead_letters: parts.dead_letters,
                dispatcher: parts.dispatcher,
                discovery: parts.discovery,
                pending: Mutex::new(pending),
                ready: Notify::new(),
                accepting: AtomicBool::new(true),
                waiting: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                stop: CancellationToken::new(),
                abort: CancellationToken::new(),
                workers: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Spawn the worker pool; does nothing if already started or shut down
    pub fn start(&self) {
        let shared = &self.shared;
        if shared.stop.is_cancelled() {
            return;
        }

        let mut workers = shared.workers.lock();
        if !workers.is_empty() {
            return;
        }

        let count = shared.config.workers.max(1);
        for id in 0..count {
            workers.spawn(worker::run(Arc::clone(shared), id));
        }

        internal!(level = INFO, "Started {count} publishing workers");
    }

    /// Admit one job
    ///
    /// # Errors
    /// - [`DeliveryError::ShuttingDown`] once shutdown began
    /// - [`DeliveryError::MetricsOnly`] when no targets are enabled
    /// - [`DeliveryError::BreakerOpen`] when the target's breaker is open
    /// - [`DeliveryError::Backpressure`] when the queue is at capacity
    pub fn submit_job(&self, job: PublishJob) -> Result<JobId, DeliveryError> {
        let result = self.admit(job);

        if let Err(e) = &result {
            debug!(reason = e.label(), "Rejected publish job: {e}");
            if let Some(metrics) = klaxon_metrics::try_metrics() {
                metrics.publish.record_rejection(e.label());
            }
        }

        result
    }

    fn admit(&self, job: PublishJob) -> Result<JobId, DeliveryError> {
        let shared = &self.shared;

        if job.state() != JobState::Queued {
            return Err(SystemError::Internal(format!(
                "job {} submitted in state {}",
                job.id,
                job.state()
            ))
            .into());
        }
        shared.check_admission(&job.target.name)?;

        let id = job.id;
        let priority = job.priority;
        let target = job.target.name.clone();

        {
            let mut pending = shared.pending.lock();
            let depth = pending.len() + shared.waiting.load(Ordering::Acquire);
            let capacity = shared.config.capacity;
            if depth >= capacity {
                return Err(DeliveryError::Backpressure { depth, capacity });
            }

            shared.tracker.record(job.snapshot());
            pending.push(job, priority);
            Shared::report_queue_sizes(&pending);
        }
        shared.ready.notify_one();

        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics
                .publish
                .record_job_submitted(&target, priority.as_str());
        }
        debug!(job_id = %id, target = %target, priority = %priority, "Publish job queued");

        Ok(id)
    }

    /// Admit a job publishing `alert` to `target`, with derived priority
    ///
    /// # Errors
    /// See [`PublishingQueue::submit_job`]
    pub fn submit(&self, alert: Arc<Alert>, target: Target) -> Result<JobId, DeliveryError> {
        self.submit_job(PublishJob::new(alert, target))
    }

    /// Admit one job per enabled target
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] when no target is enabled, or a
    /// discovery failure; per-target rejections are in the returned list
    pub async fn submit_alert(&self, alert: Alert) -> Result<Vec<TargetSubmission>, DeliveryError> {
        if self.shared.mode.is_metrics_only() {
            if let Some(metrics) = klaxon_metrics::try_metrics() {
                metrics.publish.record_rejection(DeliveryError::MetricsOnly.label());
            }
            return Err(DeliveryError::MetricsOnly);
        }

        let targets = self.shared.discovery.enabled_targets().await?;
        if targets.is_empty() {
            return Err(DeliveryError::MetricsOnly);
        }

        let alert = Arc::new(alert);
        Ok(targets
            .into_iter()
            .map(|target| TargetSubmission {
                target: target.name.clone(),
                result: self.submit(Arc::clone(&alert), target),
            })
            .collect())
    }

    /// Re-submit a dead-lettered alert as a new job, at most once per entry
    ///
    /// # Errors
    /// Dead-letter errors (not found, already replayed) and admission
    /// failures of the new job, wrapped as a failed replay
    pub async fn replay_dead_letter(&self, id: &DeadLetterId) -> Result<JobId, DeliveryError> {
        let queue = self.clone();
        let job_id = self
            .shared
            .dead_letters
            .replay(id, move |entry| async move {
                queue.submit_job(PublishJob::replay(entry))
            })
            .await?;

        if let Some(metrics) = klaxon_metrics::try_metrics()
            && let Ok(entry) = self.shared.dead_letters.get(id)
        {
            metrics
                .publish
                .record_dead_letter_replayed(entry.target_name());
        }

        Ok(job_id)
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let shared = &self.shared;
        let pending = shared.pending.lock();

        QueueStatus {
            high: pending.len_of(Priority::High),
            medium: pending.len_of(Priority::Medium),
            low: pending.len_of(Priority::Low),
            waiting: shared.waiting.load(Ordering::Acquire),
            active_workers: shared.active.load(Ordering::Acquire),
            workers: shared.config.workers.max(1),
            capacity: shared.config.capacity,
            accepting: shared.accepting.load(Ordering::Acquire),
        }
    }

    /// Stop accepting jobs and wind the workers down
    ///
    /// Attempts already in flight get `grace` to finish; after that they are
    /// cancelled and the workers aborted. Jobs still queued or waiting on a
    /// retry timer are abandoned. Returns `true` if every worker exited
    /// within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let shared = &self.shared;
        shared.accepting.store(false, Ordering::Release);
        shared.stop.cancel();
        shared.ready.notify_waiters();

        let mut workers = std::mem::take(&mut *shared.workers.lock());
        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "Publishing workers did not finish in time, cancelling in-flight attempts"
            );
            shared.abort.cancel();
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        let abandoned = {
            let mut pending = shared.pending.lock();
            let abandoned = pending.drain();
            Shared::report_queue_sizes(&pending);
            abandoned
        };
        if !abandoned.is_empty() {
            warn!(
                count = abandoned.len(),
                "Abandoning queued publish jobs at shutdown"
            );
        }

        internal!(level = INFO, "Publishing queue shut down");
        drained
    }
}
