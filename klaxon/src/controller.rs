use std::sync::{Arc, LazyLock};

use klaxon_common::{Signal, Target, TargetKind, internal, logging, tracing};
use klaxon_delivery::{
    Collaborators, JsonFormatter, PublisherRegistry, PublishingProcessor, StaticDiscovery,
};
use klaxon_dlq::{DeadLetterConfig, DeadLetterStore};
use klaxon_metrics::MetricsConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{ingest, publishers::LogPublisher};

/// Top-level configuration, loaded from `klaxon.config.ron`
///
/// ```ron
/// Klaxon (
///     targets: [
///         (name: "ops-slack", kind: Slack, url: "https://hooks.slack.com/services/T0/B0/X", format: SlackBlocks),
///         (name: "pager", kind: PagerDuty, url: "https://events.pagerduty.com/v2/enqueue", format: PagerDutyEvent),
///     ],
///     delivery: (queue: (workers: 8), retry: (max_attempts: 5)),
///     dead_letter: (store: File(path: "/var/lib/klaxon/dead-letter"), retention_days: Some(30)),
///     metrics: (enabled: false),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Klaxon {
    #[serde(alias = "target", default)]
    targets: Vec<Target>,
    #[serde(default)]
    delivery: PublishingProcessor,
    #[serde(default)]
    dead_letter: DeadLetterConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Drive the publishing processor and the dead-letter retention sweep
/// until `signals` carries a shutdown
///
/// Both halves see the same signal and both are awaited, so the processor
/// always gets its full grace period for in-flight attempts.
#[tracing::instrument(level = "trace", skip_all, err)]
async fn serve_pipeline(
    delivery: &PublishingProcessor,
    dead_letters: &DeadLetterStore,
    dead_letter: &DeadLetterConfig,
    signals: &broadcast::Sender<Signal>,
) -> anyhow::Result<()> {
    let delivery_shutdown = signals.subscribe();
    let retention_shutdown = signals.subscribe();

    let retention = async {
        match dead_letter.retention() {
            Some(retention) => {
                dead_letters
                    .serve_retention(
                        retention,
                        dead_letter.retention_sweep_interval(),
                        retention_shutdown,
                    )
                    .await
            }
            None => Ok(()),
        }
    };

    let (served, swept) = tokio::join!(delivery.serve(delivery_shutdown), retention);
    served?;
    swept?;

    Ok(())
}

impl Klaxon {
    /// Every publisher kind routed to the logging publisher
    fn publishers() -> PublisherRegistry {
        let publisher = Arc::new(LogPublisher::default());

        [
            TargetKind::Slack,
            TargetKind::PagerDuty,
            TargetKind::Rootly,
            TargetKind::Webhook,
        ]
        .into_iter()
        .fold(PublisherRegistry::new(), |registry, kind| {
            registry.with(kind, publisher.clone())
        })
    }

    /// Run the publishing pipeline until signalled, feeding it alerts from
    /// stdin
    ///
    /// # Errors
    ///
    /// This function will return an error if metrics, the dead-letter store,
    /// or the publishing processor fail to initialise.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        klaxon_metrics::init_metrics(&self.metrics)?;

        let dead_letters = Arc::new(
            DeadLetterStore::open(self.dead_letter.store.clone().into_backing_store()?).await?,
        );

        internal!(
            level = INFO,
            "Controller running with {} configured targets",
            self.targets.len()
        );

        self.delivery
            .init(Collaborators {
                discovery: Arc::new(StaticDiscovery::new(std::mem::take(&mut self.targets))),
                publishers: Self::publishers(),
                formatter: Arc::new(JsonFormatter),
                health: None,
                dead_letters: dead_letters.clone(),
            })
            .await?;
        let pipeline = self
            .delivery
            .pipeline()
            .ok_or_else(|| anyhow::anyhow!("Publishing processor did not initialise"))?;

        let intake = tokio::spawn({
            let shutdown = SHUTDOWN_BROADCAST.subscribe();
            async move {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                if let Err(e) = ingest::ingest(stdin, pipeline.as_ref(), shutdown).await {
                    tracing::error!(error = %e, "Reading alerts from stdin failed");
                }
            }
        });

        let ret = tokio::select! {
            r = serve_pipeline(&self.delivery, &dead_letters, &self.dead_letter, &SHUTDOWN_BROADCAST) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        intake.abort();
        internal!("Shutting down...");

        ret
    }
}
