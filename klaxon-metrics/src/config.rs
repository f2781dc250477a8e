//! `metrics` section of the klaxon configuration

use std::time::Duration;

use serde::Deserialize;

use crate::MetricsError;

/// Where and how often the publishing pipeline's instruments are pushed
///
/// ```ron
/// metrics: (
///     enabled: true,
///     endpoint: "http://otel-collector:4318/v1/metrics",
///     service_name: "klaxon-eu-west",
///     export_interval_secs: 15,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Off by default, so a bare klaxon never needs a collector
    #[serde(default)]
    pub enabled: bool,

    /// Collector accepting OTLP over HTTP
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Reported as `service.name`, to tell several klaxon deployments apart
    #[serde(default = "defaults::service_name")]
    pub service_name: String,

    /// Push interval (seconds)
    #[serde(default = "defaults::export_interval_secs")]
    pub export_interval_secs: u64,
}

mod defaults {
    pub fn endpoint() -> String {
        "http://localhost:4318/v1/metrics".to_string()
    }

    pub fn service_name() -> String {
        "klaxon".to_string()
    }

    pub const fn export_interval_secs() -> u64 {
        60
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::endpoint(),
            service_name: defaults::service_name(),
            export_interval_secs: defaults::export_interval_secs(),
        }
    }
}

impl MetricsConfig {
    #[must_use]
    pub const fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs)
    }

    /// Reject settings the exporter would only fail on later
    ///
    /// A disabled config is always valid.
    ///
    /// # Errors
    /// [`MetricsError::InvalidConfig`] naming the offending field
    pub fn validate(&self) -> Result<(), MetricsError> {
        if !self.enabled {
            return Ok(());
        }

        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(MetricsError::InvalidConfig(format!(
                "metrics.endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }

        if self.service_name.trim().is_empty() {
            return Err(MetricsError::InvalidConfig(
                "metrics.service_name must not be empty".to_string(),
            ));
        }

        if self.export_interval_secs == 0 {
            return Err(MetricsError::InvalidConfig(
                "metrics.export_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_disabled_and_local() {
        let config: MetricsConfig = ron::from_str("()").expect("valid config");

        assert!(!config.enabled);
        assert_eq!(config.endpoint, "http://localhost:4318/v1/metrics");
        assert_eq!(config.service_name, "klaxon");
        assert_eq!(config.export_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_from_ron() {
        let config: MetricsConfig = ron::from_str(
            r#"(
                enabled: true,
                endpoint: "https://otel.example.com/v1/metrics",
                service_name: "klaxon-eu-west",
                export_interval_secs: 15,
            )"#,
        )
        .expect("valid config");

        assert!(config.enabled);
        assert_eq!(config.service_name, "klaxon-eu-west");
        assert_eq!(config.export_interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let enabled = MetricsConfig {
            enabled: true,
            ..MetricsConfig::default()
        };

        for bad in [
            MetricsConfig {
                endpoint: "otel-collector:4318".to_string(),
                ..enabled.clone()
            },
            MetricsConfig {
                service_name: "  ".to_string(),
                ..enabled.clone()
            },
            MetricsConfig {
                export_interval_secs: 0,
                ..enabled.clone()
            },
        ] {
            assert!(matches!(
                bad.validate(),
                Err(MetricsError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_disabled_config_skips_validation() {
        let config = MetricsConfig {
            endpoint: String::new(),
            export_interval_secs: 0,
            ..MetricsConfig::default()
        };

        assert!(config.validate().is_ok());
    }
}
