//! Resilient publishing of alerts to notification targets
//!
//! This crate provides:
//! - Classification of publish failures into transient, permanent and unknown
//! - Exponential backoff with jitter for retries
//! - A per-target circuit breaker
//! - A priority queue served by a fixed worker pool, with dead-lettering of
//!   jobs that run out of attempts
//! - Bounded parallel fan-out of one alert to many targets
//! - A process-wide mode that drops to metrics-only when no target is enabled

mod circuit_breaker;
mod classifier;
mod config;
mod coordinator;
mod dispatch;
mod error;
mod job;
mod mode;
pub mod policy;
mod processor;
mod publisher;
pub mod queue;
mod service;
mod tracker;

pub use circuit_breaker::{
    BreakerPermit, BreakerRejected, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitState, TargetBreakerConfig,
};
pub use classifier::{classify, classify_status};
pub use config::{CoordinatorConfig, ModeConfig, QueueConfig};
pub use coordinator::{FanOutSummary, ParallelPublishResult, ParallelPublisher, TargetOutcome};
pub use dispatch::Dispatcher;
pub use error::{DeliveryError, PublishError, SystemError};
// Re-export shared types so embedders need only this crate
pub use klaxon_common::{Alert, ErrorKind, JobId, Priority, Target, TargetKind};
pub use job::{JobSnapshot, JobState, LastError, PublishJob};
pub use mode::{Mode, ModeManager, ModeStatus, Subscription};
pub use policy::RetryPolicy;
pub use processor::{Collaborators, Pipeline, PublishingProcessor};
pub use publisher::{
    Formatter, HealthChecker, JsonFormatter, Payload, Publisher, PublisherRegistry,
    StaticDiscovery, TargetDiscovery,
};
pub use queue::{PublishingQueue, QueueParts, QueueStatus, TargetSubmission};
pub use service::PublishingQueryService;
pub use tracker::{JobFilter, JobTracker};
