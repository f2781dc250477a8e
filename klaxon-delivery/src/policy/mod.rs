//! Policy abstractions for publishing.
//!
//! - [`RetryPolicy`]: retry decision and backoff timing

pub mod retry;

pub use retry::RetryPolicy;
