//! Newline-delimited JSON alert intake

use klaxon_common::{
    Alert, Signal, internal,
    tracing::{self, debug, warn},
};
use klaxon_delivery::{DeliveryError, PublishingQueryService};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast,
};

/// What happened to the lines read by [`ingest`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Non-empty lines read
    pub received: u64,
    /// Lines that were not a valid alert
    pub malformed: u64,
    /// Jobs admitted to the queue, one per alert and target
    pub admitted: u64,
    /// Alerts or individual jobs turned away at admission
    pub rejected: u64,
}

/// Read one JSON alert per line from `reader` and queue it for every enabled
/// target
///
/// Stops at end of input or on shutdown. Malformed lines and rejected
/// submissions are logged and counted, never fatal.
///
/// # Errors
/// If reading from `reader` fails
#[tracing::instrument(level = "trace", skip_all)]
pub async fn ingest<R>(
    reader: R,
    service: &dyn PublishingQueryService,
    mut shutdown: broadcast::Receiver<Signal>,
) -> std::io::Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = IngestStats::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.recv() => {
                internal!("Alert intake received shutdown signal");
                break;
            }
        };

        let Some(line) = line else {
            internal!(level = INFO, "Alert input closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.received += 1;

        let alert: Alert = match serde_json::from_str(line) {
            Ok(alert) => alert,
            Err(e) => {
                warn!(error = %e, "Skipping malformed alert");
                stats.malformed += 1;
                continue;
            }
        };

        submit(service, alert, &mut stats).await;
    }

    internal!(
        level = INFO,
        received = stats.received,
        malformed = stats.malformed,
        admitted = stats.admitted,
        rejected = stats.rejected,
        "Alert intake finished"
    );

    Ok(stats)
}

async fn submit(service: &dyn PublishingQueryService, alert: Alert, stats: &mut IngestStats) {
    let fingerprint = alert.fingerprint.clone();

    match service.submit(alert).await {
        Ok(submissions) => {
            for submission in submissions {
                match submission.result {
                    Ok(job_id) => {
                        stats.admitted += 1;
                        debug!(%fingerprint, target = %submission.target, %job_id, "Alert queued");
                    }
                    Err(e) => {
                        stats.rejected += 1;
                        warn!(%fingerprint, target = %submission.target, error = %e, "Alert not queued for target");
                    }
                }
            }
        }
        Err(DeliveryError::MetricsOnly) => {
            stats.rejected += 1;
            internal!(
                level = INFO,
                %fingerprint,
                "No publishing targets enabled, alert recorded in metrics only"
            );
        }
        Err(e) => {
            stats.rejected += 1;
            warn!(%fingerprint, error = %e, "Alert rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use klaxon_common::{Target, TargetKind};
    use klaxon_delivery::{
        Collaborators, JobFilter, JsonFormatter, PublisherRegistry, PublishingProcessor,
        StaticDiscovery,
    };
    use klaxon_dlq::{DeadLetterStore, MemoryBackingStore};
    use pretty_assertions::assert_eq;

    use super::*;

    async fn pipeline(targets: Vec<Target>) -> Arc<klaxon_delivery::Pipeline> {
        let dead_letters = DeadLetterStore::open(Arc::new(MemoryBackingStore::new()))
            .await
            .expect("memory store opens");

        let mut processor = PublishingProcessor::default();
        processor
            .init(Collaborators {
                discovery: Arc::new(StaticDiscovery::new(targets)),
                publishers: PublisherRegistry::new(),
                formatter: Arc::new(JsonFormatter),
                health: None,
                dead_letters: Arc::new(dead_letters),
            })
            .await
            .expect("init succeeds");
        processor.pipeline().expect("initialised")
    }

    const INPUT: &str = r#"
{"fingerprint":"fp-1","name":"DiskFull","status":"firing","labels":{"severity":"critical"},"starts_at":"2026-01-01T00:00:00Z"}

not json
{"fingerprint":"fp-2","name":"DiskFull","status":"resolved","starts_at":"2026-01-01T00:00:00Z"}
"#;

    #[tokio::test]
    async fn test_queues_each_alert_for_every_target() {
        let service = pipeline(vec![
            Target::new("a", TargetKind::Webhook, "https://hooks.example.com/a"),
            Target::new("b", TargetKind::Slack, "https://hooks.slack.com/b"),
        ])
        .await;
        let (_tx, rx) = broadcast::channel(1);

        let stats = ingest(INPUT.as_bytes(), service.as_ref(), rx)
            .await
            .expect("reads input");

        assert_eq!(
            stats,
            IngestStats {
                received: 3,
                malformed: 1,
                admitted: 4,
                rejected: 0,
            }
        );
        assert_eq!(service.jobs(&JobFilter::new().target("a")).len(), 2);
        assert_eq!(service.queue_status().depth(), 4);
    }

    #[tokio::test]
    async fn test_counts_metrics_only_rejections() {
        let service = pipeline(vec![]).await;
        let (_tx, rx) = broadcast::channel(1);

        let stats = ingest(INPUT.as_bytes(), service.as_ref(), rx)
            .await
            .expect("reads input");

        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.admitted, 0);
        assert_eq!(service.queue_status().depth(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let service = pipeline(vec![]).await;
        let (tx, rx) = broadcast::channel(1);
        let (_writer, reader) = tokio::io::duplex(64);
        tx.send(Signal::Shutdown).expect("receiver alive");

        let stats = ingest(tokio::io::BufReader::new(reader), service.as_ref(), rx)
            .await
            .expect("stops cleanly");
        assert_eq!(stats, IngestStats::default());
    }
}
