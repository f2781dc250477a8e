use std::fmt;

use serde::{Deserialize, Serialize};

/// How a delivery failure should be treated by the retry machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Likely to succeed if tried again later (rate limiting, 5xx, network)
    Transient,
    /// Will fail the same way every time (bad request, auth, bad payload)
    Permanent,
    /// Not recognised; retried like `Transient` but reported separately
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
