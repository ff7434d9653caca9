//! Binary file storage
//!
//! File contents live outside the library document, one blob per file id.
//! On disk a blob is `<files_dir>/<id>.<ext>`, with the extension derived from
//! the file's mime type.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::error::{blocking, StorageError, StorageResult};
use super::persistence::atomic_write;
use crate::config::Config;
use crate::models::FileId;

/// Blob store keyed by file id
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn read_file(&self, id: &FileId, mime_type: &str) -> StorageResult<Vec<u8>>;

    async fn write_file(&self, id: &FileId, bytes: Vec<u8>, mime_type: &str) -> StorageResult<()>;

    /// Delete a blob; deleting a missing blob succeeds
    async fn remove_file(&self, id: &FileId, mime_type: &str) -> StorageResult<()>;

    /// Read a blob as UTF-8 text
    async fn read_text_file(&self, id: &FileId, mime_type: &str) -> StorageResult<String> {
        let bytes = self.read_file(id, mime_type).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::NotText { id: id.clone() })
    }
}

/// File extension for a mime type, `bin` when unknown
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/html" => "html",
        "application/json" => "json",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Best guess of a mime type from a file name
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Blobs in a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsFileStorage {
    dir: PathBuf,
}

impl FsFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage in the configured files directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.files_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for `id`
    ///
    /// Ids come from documents on disk, so anything that could escape the
    /// directory is rejected.
    pub fn path_for(&self, id: &FileId, mime_type: &str) -> StorageResult<PathBuf> {
        let raw = id.as_str();
        let unsafe_id = raw.is_empty()
            || raw.contains(['/', '\\'])
            || raw.starts_with('.')
            || raw.contains("..");
        if unsafe_id {
            return Err(StorageError::InvalidFileId(id.clone()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", raw, extension_for_mime(mime_type))))
    }
}

#[async_trait]
impl FileStorage for FsFileStorage {
    async fn read_file(&self, id: &FileId, mime_type: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(id, mime_type)?;
        blocking(move || fs::read(&path).map_err(|e| StorageError::from_read(e, path))).await
    }

    async fn write_file(&self, id: &FileId, bytes: Vec<u8>, mime_type: &str) -> StorageResult<()> {
        let path = self.path_for(id, mime_type)?;
        debug!("Storing {} bytes for file {} at {:?}", bytes.len(), id, path);
        blocking(move || atomic_write(&path, &bytes)).await
    }

    async fn remove_file(&self, id: &FileId, mime_type: &str) -> StorageResult<()> {
        let path = self.path_for(id, mime_type)?;
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, path)),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("IMAGE/JPEG"), "jpg");
        assert_eq!(extension_for_mime("text/plain; charset=utf-8"), "txt");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("/tmp/cat.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("notes.md")), "text/markdown");
        assert_eq!(mime_for_path(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_path_for_rejects_escaping_ids() {
        let storage = FsFileStorage::new("/data/files");
        assert_eq!(
            storage.path_for(&FileId::from("abc"), "image/png").unwrap(),
            PathBuf::from("/data/files/abc.png")
        );
        for bad in ["", "../etc/passwd", "a/b", ".hidden", "a\\b"] {
            assert!(storage.path_for(&FileId::from(bad), "image/png").is_err());
        }
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FsFileStorage::new(temp_dir.path().join("files"));
        let id = FileId::from("f1");

        storage
            .write_file(&id, b"hello".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(temp_dir.path().join("files").join("f1.txt").exists());
        assert_eq!(storage.read_file(&id, "text/plain").await.unwrap(), b"hello");
        assert_eq!(storage.read_text_file(&id, "text/plain").await.unwrap(), "hello");

        storage.remove_file(&id, "text/plain").await.unwrap();
        let err = storage.read_file(&id, "text/plain").await.unwrap_err();
        assert!(err.is_not_found());

        // Removing again is fine
        storage.remove_file(&id, "text/plain").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_text_rejects_binary() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FsFileStorage::new(temp_dir.path());
        let id = FileId::from("bin");

        storage
            .write_file(&id, vec![0xff, 0xfe, 0x00], "application/octet-stream")
            .await
            .unwrap();
        let err = storage
            .read_text_file(&id, "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotText { .. }));
    }
}
