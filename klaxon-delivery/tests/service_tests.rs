//! The processor wired up from configuration and driven through the query
//! service, the way an embedding application uses it
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::{sync::Arc, time::Duration};

use klaxon_common::Signal;
use klaxon_delivery::{
    Collaborators, DeliveryError, ErrorKind, JobFilter, JobState, JsonFormatter, Mode,
    PublisherRegistry, PublishingProcessor, PublishingQueryService, StaticDiscovery, SystemError,
    TargetKind,
};
use klaxon_dlq::{DeadLetterFilter, DeadLetterStore, FileBackingStore};
use pretty_assertions::assert_eq;
use support::{Behaviour, ScriptedPublisher, alert, http, target};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r"(
    queue: (workers: 2, capacity: 50, shutdown_timeout_secs: 1),
    retry: (max_attempts: 2, base_interval_ms: 10, max_backoff_ms: 20, jitter_ms: 0),
    circuit_breaker: (failure_threshold: 10),
    coordinator: (max_concurrency: 3),
    mode: (check_interval_ms: 20),
)";

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore = "Uses real timers and the filesystem")]
async fn test_pipeline_lifecycle() {
    let dir = tempfile::tempdir().expect("temp dir");
    let backend = FileBackingStore::builder()
        .path(dir.path().join("dead-letter"))
        .build()
        .expect("valid path");
    backend.init().expect("directory created");
    let dead_letters = Arc::new(
        DeadLetterStore::open(Arc::new(backend))
            .await
            .expect("store opens"),
    );

    let publisher = ScriptedPublisher::new();
    publisher.always("broken", Behaviour::Fail(http(502)));
    let discovery = Arc::new(StaticDiscovery::new(vec![target("ok"), target("broken")]));

    let mut processor: PublishingProcessor = ron::from_str(CONFIG).expect("valid config");
    processor
        .init(Collaborators {
            discovery: discovery.clone(),
            publishers: PublisherRegistry::new().with(TargetKind::Webhook, publisher.clone()),
            formatter: Arc::new(JsonFormatter),
            health: None,
            dead_letters: dead_letters.clone(),
        })
        .await
        .expect("init succeeds");
    let service = processor.pipeline().expect("initialised");

    let (shutdown, rx) = broadcast::channel(1);
    let serving = tokio::spawn(async move { processor.serve(rx).await });

    // Queue path: one job per enabled target
    let submissions = service
        .submit(alert("fp-1", "critical"))
        .await
        .expect("admitted");
    assert_eq!(submissions.len(), 2);
    let ids: Vec<_> = submissions
        .into_iter()
        .map(|s| s.result.expect("job admitted"))
        .collect();

    wait_until(|| service.dead_letter_stats().total_entries == 1).await;
    wait_until(|| {
        service
            .job(&ids[0])
            .is_ok_and(|job| job.state == JobState::Succeeded)
    })
    .await;

    let broken = service
        .jobs(&JobFilter::new().target("broken"))
        .pop()
        .expect("broken job tracked");
    assert_eq!(broken.state, JobState::DeadLettered);
    assert_eq!(broken.attempts, 2);

    let entries = service.dead_letters(&DeadLetterFilter::new().target("broken"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_kind, ErrorKind::Transient);
    assert_eq!(
        service.dead_letter(&entries[0].id).expect("entry").job_id,
        broken.id
    );

    // Synchronous path
    let result = service
        .publish_to(
            &CancellationToken::new(),
            &alert("fp-2", "warning"),
            &["ok".to_string(), "broken".to_string()],
        )
        .await
        .expect("fan-out runs");
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);

    let breakers = service.breakers();
    let names: Vec<_> = breakers.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["broken", "ok"]);
    assert_eq!(breakers[0].1.consecutive_failures, 3);
    assert!(service.reset_breaker("broken"));
    assert!(!service.reset_breaker("never-seen"));

    // Mode follows discovery through the periodic check
    discovery.set_enabled("ok", false);
    discovery.set_enabled("broken", false);
    wait_until(|| service.mode().mode == Mode::MetricsOnly).await;
    assert!(matches!(
        service.submit(alert("fp-3", "critical")).await,
        Err(DeliveryError::MetricsOnly)
    ));
    assert!(matches!(
        service
            .publish_to_all(&CancellationToken::new(), &alert("fp-3", "critical"))
            .await,
        Err(DeliveryError::MetricsOnly)
    ));

    discovery.set_enabled("ok", true);
    wait_until(|| service.mode().mode == Mode::Normal).await;
    assert_eq!(service.mode().transitions, 2);

    // Nothing is old enough to purge yet
    assert_eq!(
        service
            .purge(Duration::from_secs(3_600))
            .await
            .expect("purge runs"),
        0
    );
    assert_eq!(
        service
            .purge(Duration::ZERO)
            .await
            .expect("purge runs"),
        1
    );
    assert_eq!(service.dead_letter_stats().total_entries, 0);

    shutdown.send(Signal::Shutdown).expect("processor listening");
    serving
        .await
        .expect("serve task")
        .expect("clean shutdown");
    assert!(!service.queue_status().accepting);
}

#[tokio::test]
async fn test_unknown_job_is_reported() {
    let dead_letters = Arc::new(
        DeadLetterStore::open(Arc::new(klaxon_dlq::MemoryBackingStore::new()))
            .await
            .expect("store opens"),
    );

    let mut processor = PublishingProcessor::default();
    processor
        .init(Collaborators {
            discovery: Arc::new(StaticDiscovery::new(vec![target("ok")])),
            publishers: PublisherRegistry::new(),
            formatter: Arc::new(JsonFormatter),
            health: None,
            dead_letters,
        })
        .await
        .expect("init succeeds");
    let service = processor.pipeline().expect("initialised");

    let id = klaxon_delivery::JobId::generate();
    assert!(matches!(
        service.job(&id),
        Err(DeliveryError::System(SystemError::JobNotFound(missing))) if missing == id
    ));
    assert!(service.jobs(&JobFilter::new()).is_empty());
}
