//! Typed error handling for publishing.
//!
//! Three layers:
//! - [`PublishError`]: what a collaborator (formatter, publisher) reports for
//!   one attempt against one target
//! - [`DeliveryError`]: the pipeline's taxonomy, covering admission-time
//!   rejections as well as classified delivery failures
//! - [`SystemError`]: internal faults that are neither

use std::{io, time::Duration};

use klaxon_common::{ErrorKind, JobId, TargetKind};
use klaxon_dlq::DlqError;
use thiserror::Error;

use crate::job::JobState;

/// Failure of a single format or publish call.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The target answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The attempt exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing was listening at the target address.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The target host could not be resolved.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Low-level I/O failure below HTTP.
    #[error("I/O error ({kind}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// The alert could not be rendered into the target's payload format.
    #[error("Failed to format payload: {0}")]
    Format(String),

    /// No publisher is registered for the target's kind.
    #[error("No publisher registered for target kind {0}")]
    UnsupportedTarget(TargetKind),

    /// The caller cancelled the attempt.
    #[error("Publish cancelled")]
    Cancelled,

    /// Anything a publisher could not express more precisely.
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for PublishError {
    fn from(e: io::Error) -> Self {
        Self::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Top-level publishing error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No targets are enabled, so nothing is admitted.
    #[error("Metrics-only mode: no publishing targets are enabled")]
    MetricsOnly,

    /// The queue is at capacity.
    #[error("Publishing queue is full ({depth}/{capacity})")]
    Backpressure { depth: usize, capacity: usize },

    /// The target's circuit breaker is rejecting calls.
    #[error("Circuit breaker open for target {0}")]
    BreakerOpen(String),

    /// The caller's cancellation signal fired first.
    #[error("Operation cancelled")]
    Cancelled,

    /// The queue no longer accepts work.
    #[error("Publishing queue is shutting down")]
    ShuttingDown,

    /// A delivery attempt failed, classified by kind.
    #[error("{kind} publish failure: {source}")]
    Publish {
        kind: ErrorKind,
        #[source]
        source: PublishError,
    },

    /// Internal fault.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Target discovery failed.
    #[error("Target discovery failed: {0}")]
    Discovery(String),

    /// A named target is not known to discovery.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The dead-letter store failed.
    #[error("Dead-letter store error: {0}")]
    DeadLetter(#[from] DlqError),

    /// No job with this id is tracked.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// A job was asked to move between states in an illegal order.
    #[error("Job {job} cannot move from {from} to {to}")]
    InvalidTransition {
        job: JobId,
        from: JobState,
        to: JobState,
    },

    /// Processor used before `init()`.
    #[error("Publishing processor not initialized: {0}")]
    NotInitialized(String),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DlqError> for DeliveryError {
    fn from(e: DlqError) -> Self {
        Self::System(SystemError::DeadLetter(e))
    }
}

impl DeliveryError {
    /// Returns `true` if this was raised before any work was admitted.
    #[must_use]
    pub const fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::MetricsOnly
                | Self::Backpressure { .. }
                | Self::BreakerOpen(_)
                | Self::ShuttingDown
        )
    }

    /// Classification of a delivery failure, if this is one.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Publish { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if retrying the same operation later could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Publish { kind, .. } => kind.is_retryable(),
            Self::Backpressure { .. } | Self::BreakerOpen(_) => true,
            _ => false,
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MetricsOnly => "metrics_only",
            Self::Backpressure { .. } => "backpressure",
            Self::BreakerOpen(_) => "breaker_open",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting_down",
            Self::Publish { kind, .. } => kind.as_str(),
            Self::System(_) => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_errors() {
        assert!(DeliveryError::MetricsOnly.is_admission());
        assert!(
            DeliveryError::Backpressure {
                depth: 10,
                capacity: 10
            }
            .is_admission()
        );
        assert!(DeliveryError::BreakerOpen("slack".into()).is_admission());
        assert!(!DeliveryError::Cancelled.is_admission());
    }

    #[test]
    fn test_publish_error_kind() {
        let err = DeliveryError::Publish {
            kind: ErrorKind::Permanent,
            source: PublishError::Http {
                status: 400,
                message: "bad request".into(),
            },
        };

        assert_eq!(err.kind(), Some(ErrorKind::Permanent));
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "permanent publish failure: HTTP 400: bad request");
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err = PublishError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(
            err,
            PublishError::Io {
                kind: io::ErrorKind::ConnectionReset,
                ..
            }
        ));
    }
}
