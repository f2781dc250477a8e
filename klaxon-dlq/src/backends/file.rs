use std::path::{Path, PathBuf};

use async_trait::async_trait;
use klaxon_common::{DeadLetterId, internal};
use tokio::fs;

use crate::{DeadLetterEntry, DlqError, SerializationError, r#trait::BackingStore};

const TEMP_PREFIX: &str = ".tmp_";

/// File-based backing store
///
/// Each entry is one bincode file named `{id}.bin`, where `id` is the entry's
/// ULID. Writes go to `.tmp_{id}.bin` first and are renamed into place, so a
/// crash never leaves a half-written entry that `list()` would pick up.
/// Overwrites (marking an entry replayed) use the same path.
///
/// # Security
/// - The directory must be absolute, free of `..`, and outside system paths
/// - Only filenames that parse as a ULID with a `.bin` suffix are read
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl FileBackingStore {
    /// Reject paths that are relative, traverse upwards, or sit in system
    /// directories
    ///
    /// # Errors
    /// Returns [`DlqError::Validation`] describing the offending path
    fn validate_path(path: &Path) -> crate::Result<()> {
        const SENSITIVE_PREFIXES: [&str; 9] = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(DlqError::Validation(format!(
                "Dead-letter path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(DlqError::Validation(format!(
                "Dead-letter path must be absolute: {}",
                path.display()
            )));
        }

        if let Some(prefix) = SENSITIVE_PREFIXES
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(DlqError::Validation(format!(
                "Dead-letter path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory if needed and remove temp files left by a crash
    /// between write and rename
    ///
    /// # Errors
    /// - If the directory cannot be created
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising dead-letter directory {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(DlqError::Validation(format!(
                "Expected {} to be a directory, but it is not",
                self.path.display()
            )));
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary files from dead-letter store"
            );
        }

        Ok(())
    }

    fn entry_path(&self, id: &DeadLetterId) -> PathBuf {
        self.path.join(id.filename())
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    #[tracing::instrument(level = "debug", skip_all, fields(id = %entry.id))]
    async fn write(&self, entry: &DeadLetterEntry) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let final_path = self.entry_path(&entry.id);
        let temp_path = self.path.join(format!("{TEMP_PREFIX}{}", entry.id.filename()));

        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn list(&self) -> crate::Result<Vec<DeadLetterId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            if let Some(id) = DeadLetterId::from_filename(&filename.to_string_lossy()) {
                ids.push(id);
            }
        }

        ids.sort();

        internal!(level = DEBUG, "Found {} dead-letter entries on disk", ids.len());

        Ok(ids)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn read(&self, id: &DeadLetterId) -> crate::Result<DeadLetterEntry> {
        let bytes = match fs::read(self.entry_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DlqError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        let (entry, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(SerializationError::from)?;

        Ok(entry)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, id: &DeadLetterId) -> crate::Result<()> {
        match fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DlqError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for `FileBackingStore`
#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> crate::Result<FileBackingStore> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore { path: self.path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_validation() {
        assert!(FileBackingStore::validate_path(Path::new("/var/lib/klaxon")).is_ok());
        assert!(FileBackingStore::validate_path(Path::new("relative/dir")).is_err());
        assert!(FileBackingStore::validate_path(Path::new("/var/lib/../etc")).is_err());
        assert!(FileBackingStore::validate_path(Path::new("/etc/klaxon")).is_err());
        assert!(FileBackingStore::validate_path(Path::new("/proc/self")).is_err());
    }
}
