use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{BackingStore, FileBackingStore, MemoryBackingStore};

/// Which backing store holds dead-letter entries
///
/// File-backed store in RON config:
/// ```ron
/// store: File(path: "/var/lib/klaxon/dead-letter")
/// ```
///
/// Memory-backed store, optionally bounded:
/// ```ron
/// store: Memory(capacity: Some(10000))
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// One file per entry under `path` (production)
    File { path: PathBuf },
    /// Lost on restart (testing/development)
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/lib/klaxon/dead-letter"),
        }
    }
}

impl StoreConfig {
    /// Build the configured store, validating and creating the directory
    /// when file-backed
    ///
    /// # Errors
    /// If the path is rejected or the directory cannot be prepared
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File { path } => {
                let store = FileBackingStore::builder().path(path).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryBackingStore::new()) as Arc<dyn BackingStore>,
                |capacity| Arc::new(MemoryBackingStore::with_capacity(capacity)),
            )),
        }
    }
}

/// Dead-letter section of the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeadLetterConfig {
    #[serde(default)]
    pub store: StoreConfig,

    /// Entries older than this are purged automatically (omit to keep forever)
    #[serde(default)]
    pub retention_days: Option<u64>,

    /// How often the retention sweep runs (seconds)
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,
}

const fn default_retention_sweep_secs() -> u64 {
    3600
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retention_days: None,
            retention_sweep_secs: default_retention_sweep_secs(),
        }
    }
}

impl DeadLetterConfig {
    #[must_use]
    pub fn retention(&self) -> Option<Duration> {
        self.retention_days
            .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60)))
    }

    #[must_use]
    pub const fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs)
    }
}
