//! Types shared by every klaxon crate: alerts, targets, priorities, failure
//! classes, identifiers, and the logging setup.

pub mod alert;
pub mod failure;
pub mod id;
pub mod logging;
pub mod priority;
pub mod target;

pub use alert::{Alert, AlertStatus, Classification, Severity};
pub use failure::ErrorKind;
pub use id::{DeadLetterId, JobId};
pub use priority::Priority;
pub use target::{PayloadFormat, Target, TargetKind};
pub use tracing;

/// Broadcast to long-running services when the process is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
