//! Maps publish failures onto [`ErrorKind`].
//!
//! | Failure                                         | Kind      |
//! |-------------------------------------------------|-----------|
//! | HTTP 429, HTTP 5xx                              | Transient |
//! | Timeout, connection refused, DNS, transport I/O | Transient |
//! | Other HTTP 4xx                                  | Permanent |
//! | Formatting failure, unsupported target kind     | Permanent |
//! | Anything else                                   | Unknown   |

use std::io;

use klaxon_common::ErrorKind;

use crate::error::PublishError;

/// Classify one failed attempt
#[must_use]
pub fn classify(error: &PublishError) -> ErrorKind {
    match error {
        PublishError::Http { status, .. } => classify_status(*status),
        PublishError::Timeout(_) | PublishError::ConnectionRefused(_) | PublishError::Dns(_) => {
            ErrorKind::Transient
        }
        PublishError::Io { kind, .. } => classify_io(*kind),
        PublishError::Format(_) | PublishError::UnsupportedTarget(_) => ErrorKind::Permanent,
        PublishError::Cancelled | PublishError::Other(_) => ErrorKind::Unknown,
    }
}

/// Classify an HTTP status reported as a failure
#[must_use]
pub const fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 | 500..=599 => ErrorKind::Transient,
        400..=499 => ErrorKind::Permanent,
        _ => ErrorKind::Unknown,
    }
}

const fn classify_io(kind: io::ErrorKind) -> ErrorKind {
    match kind {
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::UnexpectedEof => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}
