//! Bounded history of job snapshots for status queries.

use std::num::NonZeroUsize;

use klaxon_common::{JobId, Priority};
use lru::LruCache;
use parking_lot::RwLock;

use crate::job::{JobSnapshot, JobState};

/// Filter for [`JobTracker::list`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub priority: Option<Priority>,
    pub target: Option<String>,
    pub limit: Option<usize>,
}

impl JobFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, job: &JobSnapshot) -> bool {
        self.state.is_none_or(|state| job.state == state)
            && self.priority.is_none_or(|priority| job.priority == priority)
            && self.target.as_deref().is_none_or(|target| job.target == target)
    }
}

/// Most-recently-updated job snapshots, capped at a fixed capacity
///
/// Recording a snapshot counts as a use; lookups do not, so readers never
/// reorder the cache. When full, the least recently updated job is evicted.
#[derive(Debug)]
pub struct JobTracker {
    jobs: RwLock<LruCache<JobId, JobSnapshot>>,
}

impl JobTracker {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            jobs: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Insert or replace the snapshot for a job
    pub fn record(&self, snapshot: JobSnapshot) {
        self.jobs.write().put(snapshot.id, snapshot);
    }

    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.read().peek(id).cloned()
    }

    /// Matching snapshots, most recently updated first
    #[must_use]
    pub fn list(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        let jobs = self.jobs.read();
        let matching = jobs.iter().map(|(_, job)| job).filter(|job| filter.matches(job));

        match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.jobs.read().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use klaxon_common::{Alert, Target, TargetKind};

    use super::*;
    use crate::job::PublishJob;

    fn job(target: &str, severity: &str) -> PublishJob {
        PublishJob::new(
            Arc::new(Alert::firing("fp", "Alert").with_label("severity", severity)),
            Target::new(target, TargetKind::Webhook, "https://hooks.example.com"),
        )
    }

    fn tracker(capacity: usize) -> JobTracker {
        JobTracker::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[test]
    fn test_record_and_get() {
        let tracker = tracker(4);
        let mut job = job("slack", "critical");
        tracker.record(job.snapshot());

        job.transition(JobState::Processing).expect("valid");
        tracker.record(job.snapshot());

        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get(&job.id).map(|s| s.state),
            Some(JobState::Processing)
        );
        assert!(tracker.get(&JobId::generate()).is_none());
    }

    #[test]
    fn test_evicts_least_recently_updated() {
        let tracker = tracker(2);
        let first = job("a", "info");
        let second = job("b", "info");
        let third = job("c", "info");

        tracker.record(first.snapshot());
        tracker.record(second.snapshot());
        // Updating `first` makes `second` the eviction candidate
        tracker.record(first.snapshot());
        tracker.record(third.snapshot());

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(&first.id).is_some());
        assert!(tracker.get(&second.id).is_none());
        assert!(tracker.get(&third.id).is_some());
    }

    #[test]
    fn test_reads_do_not_refresh() {
        let tracker = tracker(2);
        let first = job("a", "info");
        let second = job("b", "info");

        tracker.record(first.snapshot());
        tracker.record(second.snapshot());
        let _ = tracker.get(&first.id);
        tracker.record(job("c", "info").snapshot());

        assert!(tracker.get(&first.id).is_none());
    }

    #[test]
    fn test_list_filters() {
        let tracker = tracker(10);
        let high = job("slack", "critical");
        let low = job("slack", "info");
        let other = job("webhook", "critical");
        for j in [&high, &low, &other] {
            tracker.record(j.snapshot());
        }

        let all = tracker.list(&JobFilter::new());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, other.id, "most recent first");

        let slack = tracker.list(&JobFilter::new().target("slack"));
        assert_eq!(slack.len(), 2);

        let critical_slack =
            tracker.list(&JobFilter::new().target("slack").priority(Priority::High));
        assert_eq!(
            critical_slack.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![high.id]
        );

        let queued = tracker.list(&JobFilter::new().state(JobState::Queued).limit(1));
        assert_eq!(queued.len(), 1);
        assert!(tracker.list(&JobFilter::new().state(JobState::Succeeded)).is_empty());
    }
}
