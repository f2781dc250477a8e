//! Dead-letter storage for publish jobs that exhausted their retries.
//!
//! Entries are written through to a [`BackingStore`] so they survive a
//! restart, and mirrored in an in-memory index for filtering and statistics.
//! Replaying an entry is at-most-once: concurrent replays of the same entry
//! serialise on a per-entry lock and only the first one submits a job.

pub mod backends;
pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod store;
pub mod r#trait;

pub use backends::{FileBackingStore, MemoryBackingStore};
pub use config::{DeadLetterConfig, StoreConfig};
pub use entry::DeadLetterEntry;
pub use error::{DlqError, Result, SerializationError};
pub use filter::DeadLetterFilter;
pub use store::{DeadLetterStats, DeadLetterStore};
pub use r#trait::BackingStore;
