use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use klaxon_common::{Alert, DeadLetterId, ErrorKind, JobId, Priority, Target};
use klaxon_dlq::DeadLetterEntry;
use serde::Serialize;

use crate::error::SystemError;

/// Lifecycle of a publish job
///
/// ```text
/// Queued ──> Processing ──> Succeeded
///   ^            │  │  └──> DeadLettered
///   │            │  └─────> Failed ──┐
///   └────────────┴───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Queued,
    Processing,
    Succeeded,
    /// Attempt failed, waiting for the retry delay; final if the job ran
    /// out of attempts and the dead-letter store could not take it
    Failed,
    DeadLettered,
}

impl JobState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::DeadLettered)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (
                    Self::Processing,
                    Self::Succeeded | Self::Failed | Self::DeadLettered | Self::Queued
                )
                | (Self::Failed, Self::Queued)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent failure of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One alert to be published to one target
///
/// Owned by exactly one place at a time: the pending queue, a retry timer,
/// or the worker processing it.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub id: JobId,
    pub alert: Arc<Alert>,
    pub target: Target,
    pub priority: Priority,
    state: JobState,
    pub attempts: u32,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Dead-letter entry this job was replayed from
    pub replay_of: Option<DeadLetterId>,
    submitted: Instant,
}

impl PublishJob {
    /// A new job with its priority derived from the alert
    #[must_use]
    pub fn new(alert: Arc<Alert>, target: Target) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            priority: Priority::for_alert(&alert),
            alert,
            target,
            state: JobState::Queued,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            replay_of: None,
            submitted: Instant::now(),
        }
    }

    /// A fresh job re-publishing a dead-lettered alert
    #[must_use]
    pub fn replay(entry: DeadLetterEntry) -> Self {
        let mut job = Self::new(Arc::new(entry.alert), entry.target);
        job.priority = entry.priority;
        job.replay_of = Some(entry.id);
        job
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.alert.fingerprint
    }

    /// Time since the job was first submitted
    #[must_use]
    pub fn age(&self) -> Duration {
        self.submitted.elapsed()
    }

    /// Move to `next`, enforcing the job lifecycle
    ///
    /// # Errors
    /// [`SystemError::InvalidTransition`] for a move the lifecycle forbids
    pub fn transition(&mut self, next: JobState) -> Result<(), SystemError> {
        if !self.state.can_transition_to(next) {
            return Err(SystemError::InvalidTransition {
                job: self.id,
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        self.updated_at = Utc::now();
        if next != JobState::Failed && next != JobState::Queued {
            self.next_retry_at = None;
        }

        Ok(())
    }

    /// Record a failed attempt
    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let now = Utc::now();
        self.last_error = Some(LastError {
            kind,
            message: message.into(),
            at: now,
        });
        self.updated_at = now;
    }

    /// Set `next_retry_at` to `delay` from now
    pub fn schedule_after(&mut self, delay: Duration) {
        self.next_retry_at = chrono::TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));
    }

    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            fingerprint: self.alert.fingerprint.clone(),
            target: self.target.name.clone(),
            priority: self.priority,
            state: self.state,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            next_retry_at: self.next_retry_at,
            replay_of: self.replay_of,
        }
    }
}

/// Point-in-time copy of a job for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub fingerprint: String,
    pub target: String,
    pub priority: Priority,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub replay_of: Option<DeadLetterId>,
}
