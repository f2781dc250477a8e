use std::time::Duration;

use chrono::{DateTime, Utc};
use klaxon_common::{Alert, DeadLetterId, ErrorKind, JobId, Priority, Target};
use serde::{Deserialize, Serialize};

/// A job that could not be delivered, kept until it is replayed or purged
///
/// Holds the full alert and target definition so a replay does not depend on
/// the target still being discoverable under the same settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    /// The job that was dead-lettered
    pub job_id: JobId,
    pub fingerprint: String,
    pub target: Target,
    pub alert: Alert,
    pub priority: Priority,
    pub error_kind: ErrorKind,
    pub error_message: String,
    /// Attempts made before the job was given up on
    pub retry_count: u32,
    /// When the original job was submitted
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub replayed: bool,
    pub replayed_at: Option<DateTime<Utc>>,
    /// Job created by the replay, once there is one
    pub replay_job_id: Option<JobId>,
}

impl DeadLetterEntry {
    #[allow(
        clippy::too_many_arguments,
        reason = "Mirrors the job fields captured at failure time"
    )]
    #[must_use]
    pub fn new(
        job_id: JobId,
        alert: Alert,
        target: Target,
        priority: Priority,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
        retry_count: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeadLetterId::generate(),
            job_id,
            fingerprint: alert.fingerprint.clone(),
            target,
            alert,
            priority,
            error_kind,
            error_message: error_message.into(),
            retry_count,
            created_at,
            failed_at: Utc::now(),
            replayed: false,
            replayed_at: None,
            replay_job_id: None,
        }
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target.name
    }

    /// Time since the entry failed, zero if the clock went backwards
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.failed_at).to_std().unwrap_or_default()
    }

    pub(crate) fn mark_replayed(&mut self, job_id: JobId) {
        self.replayed = true;
        self.replayed_at = Some(Utc::now());
        self.replay_job_id = Some(job_id);
    }
}
