//! Reference publisher that writes payloads to the log instead of a network

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use klaxon_common::{Target, outgoing};
use klaxon_delivery::{Payload, PublishError, Publisher};
use tokio_util::sync::CancellationToken;

/// Logs every payload it is asked to publish and always succeeds
#[derive(Debug, Default)]
pub struct LogPublisher {
    published: AtomicU64,
}

impl LogPublisher {
    /// Payloads published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        cancel: &CancellationToken,
        payload: &Payload,
        target: &Target,
    ) -> Result<(), PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }

        let body =
            serde_json::to_string(&payload.body).map_err(|e| PublishError::Format(e.to_string()))?;
        outgoing!(
            level = INFO,
            target = %target.name,
            kind = %target.kind,
            url = %target.url,
            format = ?payload.format,
            "{body}"
        );
        self.published.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
