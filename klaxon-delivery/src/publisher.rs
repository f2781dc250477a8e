//! Collaborator seams: where targets come from, how alerts are rendered, and
//! who actually talks to each kind of target.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use klaxon_common::{Alert, AlertStatus, PayloadFormat, Target, TargetKind};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{PublishError, SystemError};

/// A rendered alert, ready for one publisher call
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub format: PayloadFormat,
    pub body: Value,
}

/// Source of the current set of targets
#[async_trait]
pub trait TargetDiscovery: Send + Sync + Debug {
    /// Every known target, enabled or not
    async fn list_targets(&self) -> Result<Vec<Target>, SystemError>;

    /// Only the targets that are enabled
    async fn enabled_targets(&self) -> Result<Vec<Target>, SystemError> {
        Ok(self
            .list_targets()
            .await?
            .into_iter()
            .filter(|target| target.enabled)
            .collect())
    }
}

/// Delivers a payload to one kind of target
#[async_trait]
pub trait Publisher: Send + Sync + Debug {
    /// Publish `payload` to `target`
    ///
    /// Implementations should return [`PublishError::Cancelled`] promptly
    /// once `cancel` fires.
    async fn publish(
        &self,
        cancel: &CancellationToken,
        payload: &Payload,
        target: &Target,
    ) -> Result<(), PublishError>;
}

/// Renders an alert for a target's payload format
#[async_trait]
pub trait Formatter: Send + Sync + Debug {
    async fn format(&self, alert: &Alert, format: PayloadFormat) -> Result<Payload, PublishError>;
}

/// Optional out-of-band health signal for targets
#[async_trait]
pub trait HealthChecker: Send + Sync + Debug {
    async fn is_healthy(&self, target: &Target) -> bool;
}

/// Publishers keyed by the target kind they serve
#[derive(Debug, Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<TargetKind, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `publisher` for `kind`, replacing any previous one
    pub fn register(&mut self, kind: TargetKind, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(kind, publisher);
    }

    #[must_use]
    pub fn with(mut self, kind: TargetKind, publisher: Arc<dyn Publisher>) -> Self {
        self.register(kind, publisher);
        self
    }

    /// # Errors
    /// [`PublishError::UnsupportedTarget`] when nothing is registered for
    /// `kind`
    pub fn get(&self, kind: TargetKind) -> Result<Arc<dyn Publisher>, PublishError> {
        self.publishers
            .get(&kind)
            .cloned()
            .ok_or(PublishError::UnsupportedTarget(kind))
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<TargetKind> {
        let mut kinds: Vec<_> = self.publishers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

/// Discovery over a fixed, replaceable list of targets
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    targets: RwLock<Vec<Target>>,
}

impl StaticDiscovery {
    #[must_use]
    pub const fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: RwLock::new(targets),
        }
    }

    pub fn set_targets(&self, targets: Vec<Target>) {
        *self.targets.write() = targets;
    }

    /// Flip `enabled` on the named target, returning `false` if unknown
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        self.targets
            .write()
            .iter_mut()
            .find(|target| target.name == name)
            .map(|target| target.enabled = enabled)
            .is_some()
    }
}

#[async_trait]
impl TargetDiscovery for StaticDiscovery {
    async fn list_targets(&self) -> Result<Vec<Target>, SystemError> {
        Ok(self.targets.read().clone())
    }
}

/// Renders alerts as JSON documents shaped for each payload format
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn headline(alert: &Alert) -> String {
        let status = match alert.status {
            AlertStatus::Firing => "FIRING",
            AlertStatus::Resolved => "RESOLVED",
        };
        let summary = alert
            .annotations
            .get("summary")
            .map(|summary| format!(": {summary}"))
            .unwrap_or_default();

        format!("[{status}] {}{summary}", alert.name)
    }

    fn pagerduty_severity(alert: &Alert) -> &'static str {
        match alert.label("severity") {
            Some("critical" | "page") => "critical",
            Some("warning") => "warning",
            Some("info" | "none") => "info",
            _ => "error",
        }
    }
}

#[async_trait]
impl Formatter for JsonFormatter {
    async fn format(&self, alert: &Alert, format: PayloadFormat) -> Result<Payload, PublishError> {
        let body = match format {
            PayloadFormat::Json => {
                serde_json::to_value(alert).map_err(|e| PublishError::Format(e.to_string()))?
            }
            PayloadFormat::SlackBlocks => json!({
                "text": Self::headline(alert),
                "blocks": [{
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": Self::headline(alert) },
                }],
            }),
            PayloadFormat::PagerDutyEvent => json!({
                "event_action": if alert.is_resolved() { "resolve" } else { "trigger" },
                "dedup_key": alert.fingerprint,
                "payload": {
                    "summary": Self::headline(alert),
                    "severity": Self::pagerduty_severity(alert),
                    "source": alert.generator_url.as_deref().unwrap_or("klaxon"),
                    "custom_details": alert.labels,
                },
            }),
            PayloadFormat::Text => json!({ "text": Self::headline(alert) }),
        };

        Ok(Payload { format, body })
    }
}
