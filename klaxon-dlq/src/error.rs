//! Error types for the dead-letter store.

use std::io;

use klaxon_common::DeadLetterId;
use thiserror::Error;

/// Top-level dead-letter error type.
#[derive(Debug, Error)]
pub enum DlqError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Entry not found in the store.
    #[error("Dead-letter entry not found: {0}")]
    NotFound(DeadLetterId),

    /// Entry was already replayed; replay is at most once per entry.
    #[error("Dead-letter entry already replayed: {0}")]
    AlreadyReplayed(DeadLetterId),

    /// Resubmitting the entry failed; it stays un-replayed.
    #[error("Replay of {id} failed: {reason}")]
    ReplayFailed { id: DeadLetterId, reason: String },

    /// Store path or configuration is unusable.
    #[error("Dead-letter validation error: {0}")]
    Validation(String),

    /// In-memory store is full.
    #[error("Dead-letter store capacity exceeded: {capacity} entries")]
    CapacityExceeded { capacity: usize },

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Specialized `Result` type for dead-letter operations.
pub type Result<T> = std::result::Result<T, DlqError>;

impl<T> From<std::sync::PoisonError<T>> for DlqError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
