//! Service trait abstraction for publishing operations
//!
//! Control surfaces (status endpoints, operator tooling) talk to this trait
//! rather than to the processor's components directly.

use std::time::Duration;

use async_trait::async_trait;
use klaxon_common::{Alert, DeadLetterId, JobId};
use klaxon_dlq::{DeadLetterEntry, DeadLetterFilter, DeadLetterStats};
use tokio_util::sync::CancellationToken;

use crate::{
    circuit_breaker::CircuitBreakerStats,
    coordinator::ParallelPublishResult,
    error::{DeliveryError, SystemError},
    job::JobSnapshot,
    mode::ModeStatus,
    processor::Pipeline,
    queue::{QueueStatus, TargetSubmission},
    tracker::JobFilter,
};

/// Query and operations surface of the publishing pipeline
#[async_trait]
pub trait PublishingQueryService: Send + Sync {
    /// Queue one job per enabled target
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure; per-target
    /// admission results are in the returned list
    async fn submit(&self, alert: Alert) -> Result<Vec<TargetSubmission>, DeliveryError>;

    fn queue_status(&self) -> QueueStatus;

    /// # Errors
    /// [`SystemError::JobNotFound`] if the job was never seen or has been
    /// evicted from the tracker
    fn job(&self, id: &JobId) -> Result<JobSnapshot, DeliveryError>;

    /// Tracked jobs matching `filter`, most recently updated first
    fn jobs(&self, filter: &JobFilter) -> Vec<JobSnapshot>;

    fn dead_letters(&self, filter: &DeadLetterFilter) -> Vec<DeadLetterEntry>;

    /// # Errors
    /// If there is no such entry
    fn dead_letter(&self, id: &DeadLetterId) -> Result<DeadLetterEntry, DeliveryError>;

    /// Re-submit a dead-lettered alert as a new job
    ///
    /// # Errors
    /// If the entry is missing, already replayed, or the new job is rejected
    async fn replay(&self, id: &DeadLetterId) -> Result<JobId, DeliveryError>;

    /// Remove dead-letter entries that failed more than `older_than` ago
    ///
    /// # Errors
    /// If the backing store fails part way through
    async fn purge(&self, older_than: Duration) -> Result<usize, DeliveryError>;

    fn dead_letter_stats(&self) -> DeadLetterStats;

    fn mode(&self) -> ModeStatus;

    /// Breaker statistics for every target seen so far, sorted by name
    fn breakers(&self) -> Vec<(String, CircuitBreakerStats)>;

    /// Force a target's breaker closed; `false` if the target is unknown
    fn reset_breaker(&self, target: &str) -> bool;

    /// Publish synchronously to the named targets
    ///
    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    async fn publish_to(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
        targets: &[String],
    ) -> Result<ParallelPublishResult, DeliveryError>;

    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    async fn publish_to_all(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError>;

    /// # Errors
    /// [`DeliveryError::MetricsOnly`] or a discovery failure
    async fn publish_to_healthy(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError>;
}

#[async_trait]
impl PublishingQueryService for Pipeline {
    async fn submit(&self, alert: Alert) -> Result<Vec<TargetSubmission>, DeliveryError> {
        self.queue.submit_alert(alert).await
    }

    fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    fn job(&self, id: &JobId) -> Result<JobSnapshot, DeliveryError> {
        self.tracker
            .get(id)
            .ok_or_else(|| SystemError::JobNotFound(*id).into())
    }

    fn jobs(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        self.tracker.list(filter)
    }

    fn dead_letters(&self, filter: &DeadLetterFilter) -> Vec<DeadLetterEntry> {
        self.dead_letters.list(filter)
    }

    fn dead_letter(&self, id: &DeadLetterId) -> Result<DeadLetterEntry, DeliveryError> {
        Ok(self.dead_letters.get(id)?)
    }

    async fn replay(&self, id: &DeadLetterId) -> Result<JobId, DeliveryError> {
        self.queue.replay_dead_letter(id).await
    }

    async fn purge(&self, older_than: Duration) -> Result<usize, DeliveryError> {
        let purged = self.dead_letters.purge(older_than).await?;

        if let Some(metrics) = klaxon_metrics::try_metrics() {
            metrics.publish.record_dead_letter_purged(purged as u64);
            metrics
                .publish
                .set_dead_letter_count(self.dead_letters.len() as u64);
        }

        Ok(purged)
    }

    fn dead_letter_stats(&self) -> DeadLetterStats {
        self.dead_letters.stats()
    }

    fn mode(&self) -> ModeStatus {
        self.mode.status()
    }

    fn breakers(&self) -> Vec<(String, CircuitBreakerStats)> {
        self.breaker.snapshot()
    }

    fn reset_breaker(&self, target: &str) -> bool {
        self.breaker.reset(target)
    }

    async fn publish_to(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
        targets: &[String],
    ) -> Result<ParallelPublishResult, DeliveryError> {
        self.coordinator
            .publish_to_named(cancel, alert, targets)
            .await
    }

    async fn publish_to_all(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError> {
        self.coordinator.publish_to_all(cancel, alert).await
    }

    async fn publish_to_healthy(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
    ) -> Result<ParallelPublishResult, DeliveryError> {
        self.coordinator.publish_to_healthy(cancel, alert).await
    }
}
