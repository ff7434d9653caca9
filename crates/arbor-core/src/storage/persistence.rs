//! Library document persistence
//!
//! The document is a single JSON file written atomically (write to a temp
//! file, sync, then rename), so a crash never leaves a half-written library.
//!
//! Storage location: `~/.local/share/arbor/library.json` (configurable via `Config`)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::{blocking, StorageError, StorageResult};
use crate::config::Config;

/// Where the serialized library lives
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Stored document text, `None` when nothing has been saved yet
    async fn read_document(&self) -> StorageResult<Option<String>>;

    /// Replace the stored document
    async fn write_document(&self, text: String) -> StorageResult<()>;

    /// Keep a copy of the current document aside, e.g. before replacing an
    /// unreadable one; returns where it went
    async fn backup_document(&self) -> StorageResult<Option<String>>;

    /// Human readable location for logs
    fn location(&self) -> String;
}

/// JSON file on the local filesystem
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the configured library path
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.library_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a corrupt document is copied before it gets replaced
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "library.json".into());
        name.push(".corrupt.backup");
        self.path.with_file_name(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[async_trait]
impl DocumentStorage for JsonFileStorage {
    async fn read_document(&self) -> StorageResult<Option<String>> {
        let path = self.path.clone();
        blocking(move || match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_read(e, path)),
        })
        .await
    }

    async fn write_document(&self, text: String) -> StorageResult<()> {
        let path = self.path.clone();
        let len = text.len();
        blocking(move || atomic_write(&path, text.as_bytes())).await?;
        debug!("Wrote {} bytes to {:?}", len, self.path);
        Ok(())
    }

    async fn backup_document(&self) -> StorageResult<Option<String>> {
        let from = self.path.clone();
        let to = self.backup_path();
        blocking(move || {
            if !from.exists() {
                return Ok(None);
            }
            fs::copy(&from, &to).map_err(|e| StorageError::from_io(e, to.clone()))?;
            warn!("Backed up {:?} to {:?}", from, to);
            Ok(Some(to.display().to_string()))
        })
        .await
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}
