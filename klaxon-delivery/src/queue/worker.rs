use std::{
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};

use klaxon_common::{
    ErrorKind, internal,
    tracing::{self, debug, error, warn},
};
use klaxon_dlq::DeadLetterEntry;

use super::Shared;
use crate::{
    classifier::classify,
    error::PublishError,
    job::{JobState, PublishJob},
};

/// Worker loop: take the next job, make one attempt, repeat until stopped
pub(super) async fn run(shared: Arc<Shared>, worker: usize) {
    internal!(level = DEBUG, worker, "Publishing worker started");

    loop {
        if shared.stop.is_cancelled() {
            break;
        }

        let next = {
            let mut pending = shared.pending.lock();
            let next = pending.pop();
            if next.is_some() {
                Shared::report_queue_sizes(&pending);
            }
            next
        };

        match next {
            Some((job, _)) => process(&shared, job).await,
            None => {
                tokio::select! {
                    () = shared.ready.notified() => {}
                    () = shared.stop.cancelled() => break,
                }
            }
        }
    }

    internal!(level = DEBUG, worker, "Publishing worker stopped");
}

#[tracing::instrument(level = "debug", skip_all, fields(job_id = %job.id, target = %job.target.name))]
async fn process(shared: &Arc<Shared>, mut job: PublishJob) {
    shared.advance(&mut job, JobState::Processing);

    if shared.mode.is_metrics_only() {
        debug!("Metrics-only mode, deferring job");
        requeue(shared, job, shared.config.metrics_only_requeue());
        return;
    }

    if let Some(ttl) = shared.config.job_ttl()
        && job.age() > ttl
    {
        let kind = job
            .last_error
            .as_ref()
            .map_or(ErrorKind::Transient, |last| last.kind);
        let message = format!("Job expired after {}s without delivery", ttl.as_secs());
        dead_letter(shared, job, kind, message).await;
        return;
    }

    let permit = match shared.breaker.acquire(&job.target.name) {
        Ok(permit) => permit,
        Err(rejected) => {
            debug!(
                retry_after_ms = rejected.retry_after.as_millis(),
                "Circuit breaker open, deferring job"
            );
            requeue(shared, job, rejected.retry_after);
            return;
        }
    };

    job.attempts += 1;
    let metrics = klaxon_metrics::try_metrics();

    let started = Instant::now();
    let result = {
        let _active = ActiveAttempt::begin(shared);
        shared
            .dispatcher
            .dispatch(&shared.abort, &job.alert, &job.target)
            .await
    };
    let elapsed = started.elapsed();

    match result {
        Ok(()) => {
            permit.succeed();
            shared.advance(&mut job, JobState::Succeeded);

            if let Some(metrics) = metrics {
                metrics
                    .publish
                    .record_attempt(&job.target.name, "success", elapsed);
                metrics
                    .publish
                    .record_job_completed(&job.target.name, "succeeded");
            }
            internal!(
                level = DEBUG,
                attempts = job.attempts,
                elapsed_ms = elapsed.as_millis(),
                "Publish job succeeded"
            );
        }
        Err(PublishError::Cancelled) if shared.abort.is_cancelled() => {
            drop(permit);
            warn!(attempts = job.attempts, "Publish attempt cancelled at shutdown");
        }
        Err(failure) => {
            permit.fail();
            handle_failure(shared, job, &failure, elapsed).await;
        }
    }
}

/// Counts an attempt as active until dropped, including when the worker is
/// aborted mid-attempt
struct ActiveAttempt<'a> {
    shared: &'a Shared,
}

impl<'a> ActiveAttempt<'a> {
    fn begin(shared: &'a Shared) -> Self {
        shared.active.fetch_add(1, Ordering::AcqRel);
        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics.publish.worker_started();
        }
        Self { shared }
    }
}

impl Drop for ActiveAttempt<'_> {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::AcqRel);
        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics.publish.worker_finished();
        }
    }
}

/// Classify a failed attempt, then schedule a retry or dead-letter the job
async fn handle_failure(
    shared: &Arc<Shared>,
    mut job: PublishJob,
    failure: &PublishError,
    elapsed: Duration,
) {
    let kind = classify(failure);
    let message = failure.to_string();
    job.record_error(kind, message.clone());

    let metrics = klaxon_metrics::try_metrics();
    if let Some(metrics) = metrics {
        metrics
            .publish
            .record_attempt(&job.target.name, "failure", elapsed);
        metrics.publish.record_failure(&job.target.name, kind.as_str());
    }

    if kind == ErrorKind::Unknown {
        warn!(
            attempts = job.attempts,
            error = %failure,
            "Unrecognised publish failure, retrying as transient"
        );
    } else {
        debug!(attempts = job.attempts, kind = %kind, error = %failure, "Publish attempt failed");
    }

    if shared.retry.should_retry(kind, job.attempts) {
        let delay = shared.retry.next_delay(job.attempts.saturating_sub(1));
        job.schedule_after(delay);
        shared.advance(&mut job, JobState::Failed);

        if let Some(metrics) = metrics {
            metrics.publish.record_retry(&job.target.name);
        }
        schedule(shared, job, delay);
    } else {
        dead_letter(shared, job, kind, message).await;
    }
}

/// Send a job that was not attempted back to the queue after `delay`
fn requeue(shared: &Arc<Shared>, mut job: PublishJob, delay: Duration) {
    job.schedule_after(delay);
    shared.advance(&mut job, JobState::Queued);
    schedule(shared, job, delay);
}

/// Hold `job` on a timer task, then put it back in line
///
/// Timers are cancelled at shutdown and their jobs abandoned.
fn schedule(shared: &Arc<Shared>, mut job: PublishJob, delay: Duration) {
    shared.waiting.fetch_add(1, Ordering::AcqRel);
    let shared = Arc::clone(shared);

    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                shared.waiting.fetch_sub(1, Ordering::AcqRel);
                if job.state() == JobState::Failed {
                    shared.advance(&mut job, JobState::Queued);
                }
                shared.enqueue(job);
            }
            () = shared.stop.cancelled() => {
                shared.waiting.fetch_sub(1, Ordering::AcqRel);
                warn!(
                    job_id = %job.id,
                    target = %job.target.name,
                    attempts = job.attempts,
                    "Abandoning delayed publish job at shutdown"
                );
            }
        }
    });
}

async fn dead_letter(shared: &Arc<Shared>, mut job: PublishJob, kind: ErrorKind, message: String) {
    let entry = DeadLetterEntry::new(
        job.id,
        (*job.alert).clone(),
        job.target.clone(),
        job.priority,
        kind,
        message.clone(),
        job.attempts,
        job.created_at,
    );

    let outcome = match shared.dead_letters.add(entry).await {
        Ok(_) => {
            if let Some(metrics) = klaxon_metrics::try_metrics() {
                metrics
                    .publish
                    .record_dead_letter_added(&job.target.name, kind.as_str());
                metrics
                    .publish
                    .set_dead_letter_count(shared.dead_letters.len() as u64);
            }
            shared.advance(&mut job, JobState::DeadLettered);
            "dead_lettered"
        }
        Err(e) => {
            error!(
                job_id = %job.id,
                target = %job.target.name,
                error = %e,
                "Failed to persist dead-lettered job, alert is lost"
            );
            // No entry exists, so the job must not claim one
            job.record_error(kind, format!("{message}; dead-letter store rejected the job: {e}"));
            shared.advance(&mut job, JobState::Failed);
            "dead_letter_failed"
        }
    };

    if let Some(metrics) = klaxon_metrics::try_metrics() {
        metrics
            .publish
            .record_job_completed(&job.target.name, outcome);
    }
}
