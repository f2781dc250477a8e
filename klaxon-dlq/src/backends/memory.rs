use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use klaxon_common::DeadLetterId;

use crate::{DeadLetterEntry, DlqError, r#trait::BackingStore};

/// In-memory backing store
///
/// Entries do not survive a restart. Intended for tests and for deployments
/// that accept losing dead letters. An optional capacity turns further
/// inserts into [`DlqError::CapacityExceeded`] instead of growing without
/// bound; overwriting an existing entry is always allowed.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    entries: Arc<RwLock<HashMap<DeadLetterId, DeadLetterEntry>>>,
    capacity: Option<usize>,
}

impl MemoryBackingStore {
    /// Create an empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Recovers from a poisoned lock, since the map itself stays consistent
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn write(&self, entry: &DeadLetterEntry) -> crate::Result<()> {
        let mut entries = self.entries.write()?;

        if let Some(capacity) = self.capacity
            && !entries.contains_key(&entry.id)
            && entries.len() >= capacity
        {
            return Err(DlqError::CapacityExceeded { capacity });
        }

        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<DeadLetterId>> {
        let mut ids: Vec<_> = self.entries.read()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &DeadLetterId) -> crate::Result<DeadLetterEntry> {
        self.entries
            .read()?
            .get(id)
            .cloned()
            .ok_or(DlqError::NotFound(*id))
    }

    async fn delete(&self, id: &DeadLetterId) -> crate::Result<()> {
        self.entries
            .write()?
            .remove(id)
            .map(|_| ())
            .ok_or(DlqError::NotFound(*id))
    }
}
