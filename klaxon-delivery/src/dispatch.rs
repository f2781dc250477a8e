use std::{sync::Arc, time::Duration};

use klaxon_common::{Alert, Target, outgoing, tracing};
use tokio_util::sync::CancellationToken;

use crate::{
    error::PublishError,
    publisher::{Formatter, PublisherRegistry},
};

/// Formats and publishes one attempt for one target
///
/// Shared by queue workers and the coordinator so both apply the same
/// timeout and cancellation rules.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    publishers: Arc<PublisherRegistry>,
    formatter: Arc<dyn Formatter>,
    attempt_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        publishers: Arc<PublisherRegistry>,
        formatter: Arc<dyn Formatter>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            publishers,
            formatter,
            attempt_timeout,
        }
    }

    /// Effective deadline for an attempt against `target`
    #[must_use]
    pub fn timeout_for(&self, target: &Target) -> Duration {
        target.timeout().min(self.attempt_timeout)
    }

    /// # Errors
    /// - [`PublishError::Timeout`] when the attempt outlives its deadline
    /// - [`PublishError::Cancelled`] when `cancel` fires first
    /// - whatever the formatter or publisher reported
    #[tracing::instrument(level = "debug", skip_all, fields(target = %target.name, fingerprint = %alert.fingerprint))]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        alert: &Alert,
        target: &Target,
    ) -> Result<(), PublishError> {
        let publisher = self.publishers.get(target.kind)?;
        let timeout = self.timeout_for(target);
        let attempt = cancel.child_token();

        let work = async {
            let payload = self.formatter.format(alert, target.format).await?;
            outgoing!(
                level = DEBUG,
                kind = %target.kind,
                "Publishing {} to {}",
                alert.name,
                target.name
            );
            publisher.publish(&attempt, &payload, target).await
        };

        let result = tokio::select! {
            result = tokio::time::timeout(timeout, work) => {
                result.unwrap_or(Err(PublishError::Timeout(timeout)))
            }
            () = cancel.cancelled() => Err(PublishError::Cancelled),
        };

        // Let a publisher still holding the token know nobody is waiting
        attempt.cancel();
        result
    }
}
