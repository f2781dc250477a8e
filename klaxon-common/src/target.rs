use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// The closed set of destination kinds a publisher can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Slack,
    PagerDuty,
    Rootly,
    Webhook,
}

impl TargetKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::PagerDuty => "pagerduty",
            Self::Rootly => "rootly",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the payload a target expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PayloadFormat {
    #[default]
    Json,
    SlackBlocks,
    PagerDutyEvent,
    Text,
}

/// A named notification destination, as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub url: String,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
}

impl Target {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TargetKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            format: PayloadFormat::default(),
            enabled: defaults::enabled(),
            headers: BTreeMap::new(),
            timeout_secs: defaults::timeout_secs(),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub const fn timeout_secs() -> u64 {
        10
    }
}
