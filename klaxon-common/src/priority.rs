use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alert::{Alert, Severity};

/// Dispatch priority of a publish job
///
/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Every priority, highest first
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Derive the priority of an alert at submission time
    ///
    /// Resolved alerts are informational and always `Low`. Firing alerts use
    /// the upstream classification when present, and otherwise fall back to
    /// the `severity` label, defaulting to `Medium`.
    #[must_use]
    pub fn for_alert(alert: &Alert) -> Self {
        if alert.is_resolved() {
            return Self::Low;
        }

        if let Some(classification) = &alert.classification {
            return match classification.severity {
                Severity::Critical => Self::High,
                Severity::Warning => Self::Medium,
                Severity::Info | Severity::Noise => Self::Low,
            };
        }

        match alert.label("severity").map(str::to_ascii_lowercase).as_deref() {
            Some("critical" | "page") => Self::High,
            Some("info" | "none") => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Index into per-priority arrays, `High` first
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
