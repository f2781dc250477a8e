use std::{collections::BTreeMap, fmt::Display, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use klaxon_common::{
    DeadLetterId, ErrorKind, JobId, Signal, internal,
    tracing::{self, debug, error, warn},
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};

use crate::{BackingStore, DeadLetterEntry, DeadLetterFilter, DlqError};

/// Aggregate view of the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadLetterStats {
    pub total_entries: usize,
    pub by_target: BTreeMap<String, usize>,
    pub by_error_kind: BTreeMap<ErrorKind, usize>,
    /// Age of the oldest entry, `None` when empty
    pub oldest_entry_age: Option<Duration>,
    pub replayed: usize,
}

/// Durable store of dead-lettered jobs
///
/// Writes go to the backing store first and the in-memory index second, so
/// the index never holds an entry that was not persisted. The index is loaded
/// from the backing store on [`DeadLetterStore::open`].
#[derive(Debug)]
pub struct DeadLetterStore {
    backend: Arc<dyn BackingStore>,
    index: RwLock<BTreeMap<DeadLetterId, DeadLetterEntry>>,
    replay_locks: DashMap<DeadLetterId, Arc<Mutex<()>>>,
}

impl DeadLetterStore {
    /// Open a store, loading every readable entry from `backend`
    ///
    /// Entries that fail to decode are logged and skipped rather than
    /// failing startup.
    ///
    /// # Errors
    /// If the backing store cannot be enumerated
    pub async fn open(backend: Arc<dyn BackingStore>) -> crate::Result<Self> {
        let mut index = BTreeMap::new();

        for id in backend.list().await? {
            match backend.read(&id).await {
                Ok(entry) => {
                    index.insert(id, entry);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable dead-letter entry");
                }
            }
        }

        internal!(
            level = INFO,
            "Dead-letter store opened with {} entries",
            index.len()
        );

        Ok(Self {
            backend,
            index: RwLock::new(index),
            replay_locks: DashMap::new(),
        })
    }

    /// Persist a new entry
    ///
    /// # Errors
    /// If the backing store rejects the write
    #[tracing::instrument(level = "debug", skip_all, fields(id = %entry.id, target = %entry.target_name()))]
    pub async fn add(&self, entry: DeadLetterEntry) -> crate::Result<DeadLetterId> {
        self.backend.write(&entry).await?;

        let id = entry.id;
        internal!(
            level = WARN,
            job_id = %entry.job_id,
            target = %entry.target_name(),
            error_kind = %entry.error_kind,
            retry_count = entry.retry_count,
            "Job dead-lettered: {}",
            entry.error_message
        );
        self.index.write().insert(id, entry);

        Ok(id)
    }

    /// Entries matching `filter`, newest first, after pagination
    #[must_use]
    pub fn list(&self, filter: &DeadLetterFilter) -> Vec<DeadLetterEntry> {
        let index = self.index.read();
        let matching = index.values().rev().filter(|entry| filter.matches(entry));

        match filter.limit {
            Some(limit) => matching.skip(filter.offset).take(limit).cloned().collect(),
            None => matching.skip(filter.offset).cloned().collect(),
        }
    }

    /// # Errors
    /// [`DlqError::NotFound`] if there is no such entry
    pub fn get(&self, id: &DeadLetterId) -> crate::Result<DeadLetterEntry> {
        self.index
            .read()
            .get(id)
            .cloned()
            .ok_or(DlqError::NotFound(*id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn replay_lock(&self, id: &DeadLetterId) -> Arc<Mutex<()>> {
        self.replay_locks.entry(*id).or_default().clone()
    }

    /// Resubmit an entry as a new job, at most once
    ///
    /// `submit` receives a copy of the entry and returns the id of the job it
    /// created. The per-entry lock is held from the replayed check until the
    /// entry is marked, so of two concurrent callers exactly one reaches
    /// `submit` and the other gets [`DlqError::AlreadyReplayed`]. If `submit`
    /// fails the entry is left un-replayed.
    ///
    /// # Errors
    /// - [`DlqError::NotFound`] if there is no such entry
    /// - [`DlqError::AlreadyReplayed`] if it was replayed before
    /// - [`DlqError::ReplayFailed`] if `submit` fails
    #[tracing::instrument(level = "debug", skip(self, submit))]
    pub async fn replay<F, Fut, E>(&self, id: &DeadLetterId, submit: F) -> crate::Result<JobId>
    where
        F: FnOnce(DeadLetterEntry) -> Fut + Send,
        Fut: Future<Output = Result<JobId, E>> + Send,
        E: Display,
    {
        // Unknown ids never get a lock entry
        self.get(id)?;

        let lock = self.replay_lock(id);
        let _guard = lock.lock().await;

        let Ok(entry) = self.get(id) else {
            // Purged while waiting for the lock
            self.replay_locks.remove(id);
            return Err(DlqError::NotFound(*id));
        };
        if entry.replayed {
            debug!(id = %id, "Rejecting replay of an already replayed entry");
            return Err(DlqError::AlreadyReplayed(*id));
        }

        let job_id = submit(entry.clone()).await.map_err(|e| DlqError::ReplayFailed {
            id: *id,
            reason: e.to_string(),
        })?;

        let mut updated = entry;
        updated.mark_replayed(job_id);

        // The job now exists, so the index must show the entry as replayed
        // even if persisting that fact fails.
        if let Err(e) = self.backend.write(&updated).await {
            error!(
                id = %id,
                error = %e,
                "Failed to persist replayed flag; entry may be replayable again after restart"
            );
        }
        self.index.write().insert(*id, updated);

        internal!(level = INFO, id = %id, job_id = %job_id, "Dead-letter entry replayed");

        Ok(job_id)
    }

    /// Irreversibly delete every entry that failed more than `older_than` ago
    ///
    /// # Errors
    /// If the backing store fails to delete an entry; entries deleted before
    /// the failure stay deleted
    pub async fn purge(&self, older_than: Duration) -> crate::Result<usize> {
        let Ok(age) = TimeDelta::from_std(older_than) else {
            return Ok(0);
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };

        self.purge_before(cutoff).await
    }

    /// Irreversibly delete every entry with `failed_at` before `cutoff`
    ///
    /// # Errors
    /// If the backing store fails to delete an entry
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> crate::Result<usize> {
        let expired: Vec<DeadLetterId> = self
            .index
            .read()
            .values()
            .filter(|entry| entry.failed_at < cutoff)
            .map(|entry| entry.id)
            .collect();

        let mut purged = 0;
        for id in expired {
            // Wait out any replay in flight so it cannot rewrite a purged file
            let lock = self.replay_lock(&id);
            let guard = lock.lock().await;

            match self.backend.delete(&id).await {
                Ok(()) | Err(DlqError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            self.index.write().remove(&id);
            drop(guard);
            self.replay_locks.remove(&id);
            purged += 1;
        }

        if purged > 0 {
            internal!(level = INFO, "Purged {purged} dead-letter entries older than {cutoff}");
        }

        Ok(purged)
    }

    #[must_use]
    pub fn stats(&self) -> DeadLetterStats {
        let index = self.index.read();
        let now = Utc::now();

        let mut stats = DeadLetterStats {
            total_entries: index.len(),
            ..DeadLetterStats::default()
        };

        for entry in index.values() {
            *stats
                .by_target
                .entry(entry.target_name().to_string())
                .or_default() += 1;
            *stats.by_error_kind.entry(entry.error_kind).or_default() += 1;
            if entry.replayed {
                stats.replayed += 1;
            }
        }

        stats.oldest_entry_age = index
            .values()
            .map(|entry| entry.failed_at)
            .min()
            .map(|failed_at| (now - failed_at).to_std().unwrap_or_default());

        stats
    }

    /// Purge entries older than `retention` every `interval` until shutdown
    ///
    /// # Errors
    /// Never returns an error itself; failed sweeps are logged and retried on
    /// the next tick
    pub async fn serve_retention(
        &self,
        retention: Duration,
        interval: Duration,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> crate::Result<()> {
        internal!(
            "Dead-letter retention sweep every {}s, keeping {}s",
            interval.as_secs(),
            retention.as_secs()
        );

        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.purge(retention).await {
                        error!(error = %e, "Dead-letter retention sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    internal!(level = INFO, "Dead-letter retention sweep shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use klaxon_common::{Alert, Priority, Target, TargetKind};

    use super::*;
    use crate::MemoryBackingStore;

    fn entry(target: &str, kind: ErrorKind) -> DeadLetterEntry {
        DeadLetterEntry::new(
            JobId::generate(),
            Alert::firing("fp-1", "DiskFull"),
            Target::new(target, TargetKind::Webhook, "https://hooks.example.com"),
            Priority::High,
            kind,
            "HTTP 503",
            3,
            Utc::now(),
        )
    }

    async fn store() -> DeadLetterStore {
        DeadLetterStore::open(Arc::new(MemoryBackingStore::new()))
            .await
            .expect("memory store opens")
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = store().await;
        let id = store
            .add(entry("slack", ErrorKind::Transient))
            .await
            .expect("add");

        let fetched = store.get(&id).expect("entry exists");
        assert_eq!(fetched.target_name(), "slack");
        assert!(!fetched.replayed);
        assert!(matches!(
            store.get(&DeadLetterId::generate()),
            Err(DlqError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates_newest_first() {
        let store = store().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let kind = if i % 2 == 0 {
                ErrorKind::Transient
            } else {
                ErrorKind::Permanent
            };
            let mut e = entry(if i < 3 { "slack" } else { "pagerduty" }, kind);
            e.id = DeadLetterId::new(ulid::Ulid::from_parts(1_000 + i, 0));
            ids.push(store.add(e).await.expect("add"));
        }

        let all = store.list(&DeadLetterFilter::new());
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4], "newest first");

        let slack = store.list(&DeadLetterFilter::new().target("slack"));
        assert_eq!(slack.len(), 3);

        let permanent = store.list(&DeadLetterFilter::new().error_kind(ErrorKind::Permanent));
        assert_eq!(permanent.len(), 2);

        let page = store.list(&DeadLetterFilter::new().page(1, 2));
        assert_eq!(
            page.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![ids[3], ids[2]]
        );
    }

    #[tokio::test]
    async fn test_replay_marks_entry_and_rejects_second_call() {
        let store = store().await;
        let id = store
            .add(entry("slack", ErrorKind::Transient))
            .await
            .expect("add");
        let new_job = JobId::generate();

        let replayed = store
            .replay(&id, |_| async move { Ok::<_, String>(new_job) })
            .await
            .expect("first replay succeeds");
        assert_eq!(replayed, new_job);

        let entry = store.get(&id).expect("entry exists");
        assert!(entry.replayed);
        assert!(entry.replayed_at.is_some());
        assert_eq!(entry.replay_job_id, Some(new_job));

        let second = store
            .replay(&id, |_| async { Ok::<_, String>(JobId::generate()) })
            .await;
        assert!(matches!(second, Err(DlqError::AlreadyReplayed(_))));
    }

    #[tokio::test]
    async fn test_replay_of_unknown_entry_leaves_no_lock() {
        let store = store().await;
        let unknown = DeadLetterId::generate();

        for _ in 0..3 {
            let result = store
                .replay(&unknown, |_| async { Ok::<_, String>(JobId::generate()) })
                .await;
            assert!(matches!(result, Err(DlqError::NotFound(_))));
        }
        assert!(store.replay_locks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_submit_leaves_entry_replayable() {
        let store = store().await;
        let id = store
            .add(entry("slack", ErrorKind::Transient))
            .await
            .expect("add");

        let failed = store
            .replay(&id, |_| async { Err::<JobId, _>("queue full") })
            .await;
        assert!(matches!(failed, Err(DlqError::ReplayFailed { .. })));
        assert!(!store.get(&id).expect("entry exists").replayed);

        store
            .replay(&id, |_| async { Ok::<_, String>(JobId::generate()) })
            .await
            .expect("retry of replay succeeds");
    }

    #[tokio::test]
    async fn test_purge_only_removes_old_entries() {
        let store = store().await;

        let mut old = entry("slack", ErrorKind::Transient);
        old.failed_at = Utc::now() - TimeDelta::days(10);
        store.add(old).await.expect("add");
        let fresh = store
            .add(entry("slack", ErrorKind::Transient))
            .await
            .expect("add");

        let purged = store
            .purge(Duration::from_secs(24 * 60 * 60))
            .await
            .expect("purge");
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh).is_ok());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = store().await;
        assert_eq!(store.stats().oldest_entry_age, None);

        let mut old = entry("slack", ErrorKind::Transient);
        old.failed_at = Utc::now() - TimeDelta::hours(2);
        store.add(old).await.expect("add");
        store
            .add(entry("slack", ErrorKind::Permanent))
            .await
            .expect("add");
        store
            .add(entry("webhook", ErrorKind::Unknown))
            .await
            .expect("add");

        let stats = store.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_target.get("slack"), Some(&2));
        assert_eq!(stats.by_target.get("webhook"), Some(&1));
        assert_eq!(stats.by_error_kind.get(&ErrorKind::Permanent), Some(&1));
        assert!(stats.oldest_entry_age.expect("non-empty") >= Duration::from_secs(7_000));
    }
}
