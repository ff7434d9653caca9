//! In-memory storage
//!
//! Used by tests and by embedders that keep the library somewhere other than
//! the local filesystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::{StorageError, StorageResult};
use super::files::FileStorage;
use super::persistence::DocumentStorage;
use crate::models::FileId;

/// Document storage that keeps the text in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStorage {
    text: Mutex<Option<String>>,
    backup: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryDocumentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing document
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(Some(text.into())),
            ..Self::default()
        }
    }

    /// Number of completed writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn contents(&self) -> Option<String> {
        self.text.lock().await.clone()
    }

    pub async fn backup(&self) -> Option<String> {
        self.backup.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStorage for MemoryDocumentStorage {
    async fn read_document(&self) -> StorageResult<Option<String>> {
        Ok(self.text.lock().await.clone())
    }

    async fn write_document(&self, text: String) -> StorageResult<()> {
        *self.text.lock().await = Some(text);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn backup_document(&self) -> StorageResult<Option<String>> {
        let current = self.text.lock().await.clone();
        if current.is_none() {
            return Ok(None);
        }
        *self.backup.lock().await = current;
        Ok(Some(self.location()))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// File storage that keeps blobs in memory
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    blobs: Mutex<HashMap<FileId, Vec<u8>>>,
    fail_removals: AtomicBool,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, id: &FileId) -> bool {
        self.blobs.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    /// Make every removal fail, to exercise error paths
    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn read_file(&self, id: &FileId, _mime_type: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::MissingFile { id: id.clone() })
    }

    async fn write_file(&self, id: &FileId, bytes: Vec<u8>, _mime_type: &str) -> StorageResult<()> {
        self.blobs.lock().await.insert(id.clone(), bytes);
        Ok(())
    }

    async fn remove_file(&self, id: &FileId, _mime_type: &str) -> StorageResult<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("refusing to remove {id}"),
            )));
        }
        self.blobs.lock().await.remove(id);
        Ok(())
    }
}
