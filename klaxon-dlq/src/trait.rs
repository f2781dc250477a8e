use async_trait::async_trait;
use klaxon_common::DeadLetterId;

use crate::DeadLetterEntry;

/// Durable storage underneath the dead-letter store
///
/// Implementations only need to persist whole entries by id; filtering,
/// statistics and replay locking live in [`crate::DeadLetterStore`].
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite an entry
    ///
    /// # Errors
    /// If the entry cannot be persisted
    async fn write(&self, entry: &DeadLetterEntry) -> crate::Result<()>;

    /// Ids of every persisted entry, oldest first
    ///
    /// # Errors
    /// If the store cannot be enumerated
    async fn list(&self) -> crate::Result<Vec<DeadLetterId>>;

    /// # Errors
    /// If the entry does not exist or cannot be decoded
    async fn read(&self, id: &DeadLetterId) -> crate::Result<DeadLetterEntry>;

    /// # Errors
    /// If the entry does not exist or cannot be removed
    async fn delete(&self, id: &DeadLetterId) -> crate::Result<()>;
}
