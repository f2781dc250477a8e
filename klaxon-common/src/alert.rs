use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the upstream source still considers the alert active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

/// Severity assigned by the upstream classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Noise,
}

/// Result of upstream classification, if the alert went through it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    /// Classifier confidence in `[0, 1]`
    pub confidence: f64,
    pub reasoning: String,
}

/// A single alert event, as received from the ingestion boundary
///
/// Persisted inside dead-letter entries with bincode, so optional fields are
/// always serialised rather than skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identity of the alert across repeated notifications
    pub fingerprint: String,
    pub name: String,
    pub status: AlertStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: Option<String>,
    #[serde(default)]
    pub classification: Option<Classification>,
}

impl Alert {
    /// A firing alert with no labels, starting now
    #[must_use]
    pub fn firing(fingerprint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            name: name.into(),
            status: AlertStatus::Firing,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
            classification: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    #[must_use]
    pub fn resolved(mut self) -> Self {
        self.status = AlertStatus::Resolved;
        self.ends_at = Some(Utc::now());
        self
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self.status, AlertStatus::Resolved)
    }
}
