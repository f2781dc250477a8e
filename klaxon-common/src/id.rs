//! ULID-backed identifiers.
//!
//! ULIDs sort by creation time, which gives stable "newest first" listings and
//! filenames that can be validated without touching the disk.

use std::{fmt, str::FromStr};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            id: ulid::Ulid,
        }

        impl $name {
            #[must_use]
            pub const fn new(id: ulid::Ulid) -> Self {
                Self { id }
            }

            /// Generate a new unique identifier
            #[must_use]
            pub fn generate() -> Self {
                Self {
                    id: ulid::Ulid::new(),
                }
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.id
            }

            /// Milliseconds since the Unix epoch at which the id was generated
            #[must_use]
            pub const fn timestamp_ms(&self) -> u64 {
                self.id.timestamp_ms()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s).map(Self::new)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

ulid_id!(
    /// Identifier of a single publish job
    JobId
);

ulid_id!(
    /// Identifier of a dead-letter entry, also used as its on-disk filename
    DeadLetterId
);

impl DeadLetterId {
    /// Parse an entry id from a filename like `01ARZ3NDEKTSV4RRFFQ69G5FAV.bin`
    ///
    /// Rejects anything containing path separators or `..`, and anything whose
    /// stem is not a valid ULID.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        filename.strip_suffix(".bin")?.parse().ok()
    }

    /// Filename under which the entry is persisted
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.bin", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_id_filename_validation() {
        assert!(DeadLetterId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_some());

        assert!(DeadLetterId::from_filename("../etc/passwd.bin").is_none());
        assert!(DeadLetterId::from_filename("foo/bar.bin").is_none());
        assert!(DeadLetterId::from_filename("..\\windows\\system32.bin").is_none());

        assert!(DeadLetterId::from_filename("not_a_valid_ulid.bin").is_none());
        assert!(DeadLetterId::from_filename("01ARZ3NDEKTSV4RRFFQ69G5FAV.json").is_none());
        assert!(DeadLetterId::from_filename(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").is_none());
    }

    #[test]
    fn test_filename_round_trips() {
        let id = DeadLetterId::generate();
        assert_eq!(DeadLetterId::from_filename(&id.filename()), Some(id));
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = JobId::new(ulid::Ulid::from_parts(1_000, 7));
        let second = JobId::new(ulid::Ulid::from_parts(2_000, 3));
        assert!(first < second);
    }
}
