use chrono::{DateTime, Utc};
use klaxon_common::ErrorKind;
use serde::Deserialize;

use crate::DeadLetterEntry;

/// Selection and pagination for [`crate::DeadLetterStore::list`]
///
/// Every criterion is optional; an empty filter matches everything. Results
/// are ordered newest first before `offset` and `limit` are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeadLetterFilter {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    /// Inclusive lower bound on `failed_at`
    #[serde(default)]
    pub failed_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `failed_at`
    #[serde(default)]
    pub failed_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replayed: Option<bool>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl DeadLetterFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub const fn error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    #[must_use]
    pub const fn failed_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.failed_after = after;
        self.failed_before = before;
        self
    }

    #[must_use]
    pub const fn replayed(mut self, replayed: bool) -> Self {
        self.replayed = Some(replayed);
        self
    }

    #[must_use]
    pub const fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether an entry satisfies every selection criterion
    #[must_use]
    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        self.target
            .as_deref()
            .is_none_or(|target| entry.target_name() == target)
            && self.error_kind.is_none_or(|kind| entry.error_kind == kind)
            && self
                .failed_after
                .is_none_or(|after| entry.failed_at >= after)
            && self
                .failed_before
                .is_none_or(|before| entry.failed_at < before)
            && self
                .replayed
                .is_none_or(|replayed| entry.replayed == replayed)
    }
}
