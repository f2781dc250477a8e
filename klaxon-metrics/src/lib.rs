//! OpenTelemetry metrics for the klaxon publishing pipeline
//!
//! Instruments are pushed over OTLP/HTTP to an OpenTelemetry Collector, which
//! can expose them for Prometheus to scrape.
//!
//! ```text
//! klaxon → OTLP/HTTP → OpenTelemetry Collector → Prometheus (scrape) → Grafana
//! ```
//!
//! Library code should reach the instruments through [`try_metrics`], which
//! returns `None` until [`init_metrics`] has run with metrics enabled, so
//! recording is a no-op in tests and in deployments without a collector.
//!
//! ```rust,no_run
//! use klaxon_metrics::{MetricsConfig, init_metrics};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_metrics(&MetricsConfig::default())?;
//!
//! if let Some(metrics) = klaxon_metrics::try_metrics() {
//!     metrics.publish.record_job_submitted("slack-oncall", "high");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod exporter;
mod mode;
mod publish;

pub use config::MetricsConfig;
pub use error::MetricsError;
pub use mode::ModeMetrics;
use once_cell::sync::OnceCell;
pub use publish::{BreakerStateCode, PublishMetrics};

static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub publish: PublishMetrics,
    pub mode: ModeMetrics,
}

impl Metrics {
    /// Build every instrument against the current global meter provider
    ///
    /// # Errors
    ///
    /// Returns an error if an instrument cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            publish: PublishMetrics::new()?,
            mode: ModeMetrics::new()?,
        })
    }
}

/// Initialize the metrics system
///
/// Must be called once at startup, before anything is recorded. When metrics
/// are disabled this only logs and returns.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or if called twice.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(
        endpoint = %config.endpoint,
        service_name = %config.service_name,
        interval_secs = config.export_interval_secs,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::init_otlp_exporter(config)?;
    opentelemetry::global::set_meter_provider(provider);

    METRICS_INSTANCE
        .set(Metrics::new()?)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// Get a reference to the global metrics instance
///
/// # Errors
///
/// Returns [`MetricsError::NotInitialized`] if [`init_metrics`] has not run
/// with metrics enabled.
pub fn metrics() -> Result<&'static Metrics, MetricsError> {
    METRICS_INSTANCE.get().ok_or(MetricsError::NotInitialized)
}

/// The global metrics instance, if metrics are enabled
#[must_use]
pub fn try_metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

/// Check if metrics are enabled
#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
