//! Error types for metrics operations

use thiserror::Error;

/// Errors that can occur during metrics operations
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metrics system has already been initialized
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    /// Metrics were requested before `init_metrics` ran, or are disabled
    #[error("Metrics not initialized. Call init_metrics() first.")]
    NotInitialized,

    /// The `metrics` configuration section cannot be used
    #[error("Invalid metrics configuration: {0}")]
    InvalidConfig(String),

    /// OpenTelemetry SDK error
    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),
}
