//! OTLP/HTTP meter provider for the publishing pipeline

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

use crate::{MetricsConfig, MetricsError};

/// Attributes every klaxon data point carries
fn resource(config: &MetricsConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Build a meter provider pushing to `config.endpoint` every
/// `config.export_interval()`
///
/// # Errors
///
/// [`MetricsError::InvalidConfig`] for settings [`MetricsConfig::validate`]
/// rejects, [`MetricsError::OpenTelemetry`] if the exporter cannot be built.
pub fn init_otlp_exporter(config: &MetricsConfig) -> Result<SdkMeterProvider, MetricsError> {
    config.validate()?;

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(config.endpoint.clone())
        .build()
        .map_err(|e| MetricsError::OpenTelemetry(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.export_interval())
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource(config))
        .with_reader(reader)
        .build())
}
