//! Unified storage interface
//!
//! The `Store` owns the in-memory `Library` and coordinates:
//! - the document collaborator (debounced saves through `SaveScheduler`)
//! - the file collaborator (blob contents of registered files)
//! - change notifications for subscribers
//!
//! ## Usage
//!
//! ```text
//! let store = Store::open().await?;  // Creates or loads existing
//!
//! let notes = store.create_directory("/notes")?;
//! store.add_text_node(&notes, "hello")?;
//!
//! store.close().await?;  // Writes anything pending
//! ```

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::LibraryResult;
use crate::library::{Library, Removal};
use crate::models::{
    AnchorPreview, File, FileId, NodeContent, NodeId, RichText, TagId, TextKind,
};
use crate::preview::{LinkPreviewSource, NoPreviews};
use crate::save::{SaveScheduler, SaveStatus};
use crate::storage::{
    mime_for_path, DocumentStorage, FileStorage, FsFileStorage, JsonFileStorage,
    MemoryDocumentStorage, MemoryFileStorage,
};

/// Capacity of the change notification channel
const EVENT_CAPACITY: usize = 256;

/// A change to the library
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    NodeAdded { id: NodeId, parent: NodeId },
    NodeChanged { id: NodeId },
    NodeMoved { id: NodeId, parent: NodeId },
    NodesRemoved { ids: Vec<NodeId> },
    TagsChanged,
    FileAdded { id: FileId },
    FilesRemoved { ids: Vec<FileId> },
}

/// Collaborators a store is built from
pub struct StoreOptions {
    pub documents: Arc<dyn DocumentStorage>,
    pub files: Arc<dyn FileStorage>,
    pub clock: Arc<dyn Clock>,
    pub previews: Arc<dyn LinkPreviewSource>,
    pub save_delay: Duration,
}

impl StoreOptions {
    /// Local filesystem storage as described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            documents: Arc::new(JsonFileStorage::from_config(config)),
            files: Arc::new(FsFileStorage::from_config(config)),
            clock: Arc::new(SystemClock),
            previews: Arc::new(NoPreviews),
            save_delay: config.save_delay(),
        }
    }

    /// Everything in memory
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(MemoryDocumentStorage::new()),
            files: Arc::new(MemoryFileStorage::new()),
            clock: Arc::new(SystemClock),
            previews: Arc::new(NoPreviews),
            save_delay: Duration::from_millis(crate::config::DEFAULT_SAVE_DELAY_MS),
        }
    }

    pub fn with_previews(mut self, previews: Arc<dyn LinkPreviewSource>) -> Self {
        self.previews = previews;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Unified storage interface for Arbor
pub struct Store {
    library: Arc<RwLock<Library>>,
    documents: Arc<dyn DocumentStorage>,
    files: Arc<dyn FileStorage>,
    previews: Arc<dyn LinkPreviewSource>,
    saver: SaveScheduler,
    events: broadcast::Sender<LibraryEvent>,
}

impl Store {
    /// Open the store from the default configuration
    pub async fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(&config).await
    }

    /// Open the store on the local filesystem described by `config`
    pub async fn open_with_config(config: &Config) -> Result<Self> {
        Self::open_with(StoreOptions::from_config(config)).await
    }

    /// Open the store on arbitrary collaborators
    ///
    /// A stored document that cannot be parsed or upgraded is backed up and
    /// replaced by an empty library.
    pub async fn open_with(options: StoreOptions) -> Result<Self> {
        let StoreOptions {
            documents,
            files,
            clock,
            previews,
            save_delay,
        } = options;

        let library = load_library(documents.as_ref(), clock).await?;
        let library = Arc::new(RwLock::new(library));
        let saver = SaveScheduler::spawn(library.clone(), documents.clone(), save_delay);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            library,
            documents,
            files,
            previews,
            saver,
            events,
        })
    }

    /// Run `f` against the current library
    pub fn read<R>(&self, f: impl FnOnce(&Library) -> R) -> Result<R> {
        let library = self
            .library
            .read()
            .map_err(|_| anyhow!("Library lock poisoned"))?;
        Ok(f(&library))
    }

    /// Receive every change made through this store
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.saver.status()
    }

    pub fn watch_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.saver.subscribe_status()
    }

    /// Human readable location of the library document
    pub fn location(&self) -> String {
        self.documents.location()
    }

    /// Apply a mutation and schedule a save
    fn mutate<R>(&self, f: impl FnOnce(&mut Library) -> LibraryResult<R>) -> Result<R> {
        let result = {
            let mut library = self
                .library
                .write()
                .map_err(|_| anyhow!("Library lock poisoned"))?;
            f(&mut library)?
        };
        self.saver.schedule();
        Ok(result)
    }

    fn emit(&self, event: LibraryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn node_added(&self, parent: &NodeId, id: NodeId) -> NodeId {
        self.emit(LibraryEvent::NodeAdded {
            id: id.clone(),
            parent: parent.clone(),
        });
        id
    }

    fn node_changed(&self, id: &NodeId) {
        self.emit(LibraryEvent::NodeChanged { id: id.clone() });
    }

    fn node_moved(&self, id: &NodeId, parent: &NodeId) {
        self.emit(LibraryEvent::NodeMoved {
            id: id.clone(),
            parent: parent.clone(),
        });
    }

    // ==================== Nodes ====================

    pub fn add_node(&self, parent: &NodeId, content: NodeContent) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_node(parent, content))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_text_node(&self, parent: &NodeId, text: impl Into<RichText>) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_text_node(parent, text))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_heading_node(&self, parent: &NodeId, text: impl Into<RichText>) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_heading_node(parent, text))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_quote_node(&self, parent: &NodeId, text: impl Into<RichText>) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_quote_node(parent, text))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_math_node(&self, parent: &NodeId, expression: &str) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_math_node(parent, expression))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_directory(&self, parent: &NodeId, name: Option<&str>) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_directory(parent, name))?;
        Ok(self.node_added(parent, id))
    }

    pub fn add_text_embed_node(&self, parent: &NodeId, file_id: FileId) -> Result<NodeId> {
        let id = self.mutate(|lib| lib.add_text_embed_node(parent, file_id))?;
        Ok(self.node_added(parent, id))
    }

    /// Walk or create `/a/b/c` under Master
    pub fn create_directory(&self, path: &str) -> Result<NodeId> {
        let id = self
            .mutate(|lib| lib.create_directory(path))
            .with_context(|| format!("Failed to create directory {path}"))?;
        self.node_changed(&id);
        Ok(id)
    }

    pub fn move_node_before(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        reference: Option<&NodeId>,
    ) -> Result<()> {
        self.mutate(|lib| lib.move_node_before(id, new_parent, reference))?;
        self.node_moved(id, new_parent);
        Ok(())
    }

    pub fn swap_index(&self, a: &NodeId, b: &NodeId) -> Result<()> {
        self.mutate(|lib| lib.swap_index(a, b))?;
        self.node_changed(a);
        self.node_changed(b);
        Ok(())
    }

    pub fn indent_node(&self, id: &NodeId) -> Result<()> {
        self.mutate(|lib| lib.indent_node(id))?;
        self.node_changed(id);
        Ok(())
    }

    pub fn outdent_node(&self, id: &NodeId) -> Result<()> {
        self.mutate(|lib| lib.outdent_node(id))?;
        self.node_changed(id);
        Ok(())
    }

    pub fn trash_node(&self, id: &NodeId) -> Result<()> {
        self.mutate(|lib| lib.trash_node(id))?;
        self.node_moved(id, &NodeId::trash());
        Ok(())
    }

    pub fn retype_node(&self, id: &NodeId, kind: TextKind) -> Result<()> {
        self.mutate(|lib| lib.retype_node(id, kind))?;
        self.node_changed(id);
        Ok(())
    }

    pub fn set_text(&self, id: &NodeId, text: impl Into<RichText>) -> Result<()> {
        self.mutate(|lib| lib.set_text(id, text))?;
        self.node_changed(id);
        Ok(())
    }

    pub fn set_math_expression(&self, id: &NodeId, expression: &str) -> Result<()> {
        self.mutate(|lib| lib.set_math_expression(id, expression))?;
        self.node_changed(id);
        Ok(())
    }

    pub fn rename_directory(&self, id: &NodeId, name: Option<&str>) -> Result<()> {
        self.mutate(|lib| lib.rename_directory(id, name))?;
        self.node_changed(id);
        Ok(())
    }

    /// Remove a subtree and delete the blobs it no longer needs
    pub async fn remove_node(&self, id: &NodeId) -> Result<Removal> {
        let removal = self.mutate(|lib| lib.remove_node(id))?;
        self.finish_removal(&removal).await;
        Ok(removal)
    }

    /// Remove everything in Trash
    pub async fn empty_trash(&self) -> Result<Removal> {
        let removal = self.mutate(|lib| lib.empty_trash())?;
        self.finish_removal(&removal).await;
        Ok(removal)
    }

    async fn finish_removal(&self, removal: &Removal) {
        for file in &removal.files {
            // The entry is already gone; a stray blob is harmless
            if let Err(e) = self.files.remove_file(&file.id, &file.mime_type).await {
                warn!("Failed to delete stored file {}: {}", file.id, e);
            }
        }
        if !removal.nodes.is_empty() {
            self.emit(LibraryEvent::NodesRemoved {
                ids: removal.nodes.iter().map(|n| n.id.clone()).collect(),
            });
        }
        if !removal.files.is_empty() {
            self.emit(LibraryEvent::FilesRemoved {
                ids: removal.files.iter().map(|f| f.id.clone()).collect(),
            });
        }
    }

    // ==================== Tags ====================

    pub fn create_tag(&self, name: &str) -> Result<TagId> {
        let id = self.mutate(|lib| Ok(lib.create_tag(name)))?;
        self.emit(LibraryEvent::TagsChanged);
        Ok(id)
    }

    pub fn find_or_create_tag(&self, name: &str) -> Result<TagId> {
        let id = self.mutate(|lib| Ok(lib.find_or_create_tag(name)))?;
        self.emit(LibraryEvent::TagsChanged);
        Ok(id)
    }

    pub fn set_tag_color(&self, id: &TagId, color: &str) -> Result<()> {
        self.mutate(|lib| lib.set_tag_color(id, color))?;
        self.emit(LibraryEvent::TagsChanged);
        Ok(())
    }

    /// Delete a tag everywhere; returns how many nodes carried it
    pub fn delete_tag(&self, id: &TagId) -> Result<usize> {
        let count = self.mutate(|lib| lib.delete_tag(id))?;
        self.emit(LibraryEvent::TagsChanged);
        Ok(count)
    }

    pub fn append_tag(&self, node: &NodeId, tag: &TagId) -> Result<bool> {
        let added = self.mutate(|lib| lib.append_tag(node, tag))?;
        if added {
            self.node_changed(node);
        }
        Ok(added)
    }

    pub fn remove_tag_from_node(&self, node: &NodeId, tag: &TagId) -> Result<bool> {
        let removed = self.mutate(|lib| lib.remove_tag_from_node(node, tag))?;
        if removed {
            self.node_changed(node);
        }
        Ok(removed)
    }

    // ==================== Files ====================

    /// Store `bytes` and register a file entry for them
    pub async fn add_file_from_bytes(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        name: Option<&str>,
    ) -> Result<File> {
        let mut file = File::new(mime_type, self.read(|lib| lib.now())?);
        if let Some(name) = name {
            file = file.with_name(name);
        }
        self.files
            .write_file(&file.id, bytes, &file.mime_type)
            .await
            .with_context(|| format!("Failed to store contents of file {}", file.id))?;

        let registered = file.clone();
        self.mutate(|lib| {
            lib.add_file(registered);
            Ok(())
        })?;
        self.emit(LibraryEvent::FileAdded {
            id: file.id.clone(),
        });
        Ok(file)
    }

    /// Copy a file from disk into storage and register it
    pub async fn import_file(&self, path: &Path) -> Result<File> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let name = path.file_name().and_then(|n| n.to_str());
        let file = self
            .add_file_from_bytes(bytes, mime_for_path(path), name)
            .await?;
        info!("Imported {:?} as file {}", path, file.id);
        Ok(file)
    }

    /// Contents of a registered file; records the access
    pub async fn read_file(&self, id: &FileId) -> Result<Vec<u8>> {
        let mime_type = self.touch_file(id)?;
        self.files
            .read_file(id, &mime_type)
            .await
            .with_context(|| format!("Failed to read contents of file {id}"))
    }

    pub async fn read_text_file(&self, id: &FileId) -> Result<String> {
        let mime_type = self.touch_file(id)?;
        self.files
            .read_text_file(id, &mime_type)
            .await
            .with_context(|| format!("Failed to read text of file {id}"))
    }

    fn touch_file(&self, id: &FileId) -> Result<String> {
        self.mutate(|lib| lib.touch_file(id).map(|f| f.mime_type.clone()))
    }

    /// Store image bytes and add an image node for them
    pub async fn add_image_from_bytes(
        &self,
        parent: &NodeId,
        bytes: Vec<u8>,
        mime_type: &str,
        name: Option<&str>,
    ) -> Result<NodeId> {
        self.read(|lib| lib.get_node(parent).map(|_| ()))??;

        let mut file = File::new(mime_type, self.read(|lib| lib.now())?);
        if let Some(name) = name {
            file = file.with_name(name);
        }
        self.files
            .write_file(&file.id, bytes, &file.mime_type)
            .await
            .with_context(|| format!("Failed to store image {}", file.id))?;

        let (file_id, mime) = (file.id.clone(), file.mime_type.clone());
        match self.mutate(|lib| lib.add_image_node(parent, file)) {
            Ok(id) => Ok(self.node_added(parent, id)),
            Err(e) => {
                if let Err(cleanup) = self.files.remove_file(&file_id, &mime).await {
                    warn!("Failed to clean up image {}: {}", file_id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Import an image from disk as a new image node
    pub async fn add_image_from_path(&self, parent: &NodeId, path: &Path) -> Result<NodeId> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {:?}", path))?;
        let name = path.file_name().and_then(|n| n.to_str());
        self.add_image_from_bytes(parent, bytes, mime_for_path(path), name)
            .await
    }

    /// Add an anchor for `url`, enriched by the preview source when it can
    ///
    /// A failing preview source or preview image only loses the enrichment;
    /// the anchor is created either way.
    pub async fn add_anchor_from_url(&self, parent: &NodeId, url: &str) -> Result<NodeId> {
        self.read(|lib| lib.get_node(parent).map(|_| ()))??;
        let now = self.read(|lib| lib.now())?;

        let preview = match self.previews.fetch_preview(url).await {
            Ok(preview) => preview,
            Err(e) => {
                warn!("Preview for {} unavailable, creating bare anchor: {:#}", url, e);
                Default::default()
            }
        };

        let mut anchor = AnchorPreview::bare(url, now);
        anchor.title = preview.title;
        anchor.description = preview.description;
        if let Some(modified) = preview.modified {
            anchor.content_modified = modified;
        }

        let mut preview_file = None;
        if let Some(image) = preview.image {
            let mut file = File::new(image.mime_type, now);
            if let Some(source) = image.url {
                file = file.with_url(source);
            }
            match self
                .files
                .write_file(&file.id, image.bytes, &file.mime_type)
                .await
            {
                Ok(()) => preview_file = Some(file),
                Err(e) => warn!("Failed to store preview image for {}: {}", url, e),
            }
        }

        debug!("Adding anchor for {} under {}", url, parent);
        let id = self.mutate(|lib| lib.add_anchor_node(parent, anchor, preview_file))?;
        Ok(self.node_added(parent, id))
    }

    // ==================== Lifecycle ====================

    /// Write pending changes now
    pub async fn flush(&self) -> Result<()> {
        self.saver.flush().await
    }

    /// Write pending changes and stop saving
    pub async fn close(self) -> Result<()> {
        self.saver.shutdown().await
    }
}

/// Read and parse the stored library, falling back to an empty one
async fn load_library(documents: &dyn DocumentStorage, clock: Arc<dyn Clock>) -> Result<Library> {
    let text = documents
        .read_document()
        .await
        .with_context(|| format!("Failed to read library from {}", documents.location()))?;

    let Some(text) = text else {
        info!("No library at {}, starting empty", documents.location());
        return Ok(Library::new(clock));
    };

    match Library::from_json(&text, clock.clone()) {
        Ok(library) => Ok(library),
        Err(e) => {
            warn!("Library at {} is unreadable: {}", documents.location(), e);
            match documents.backup_document().await {
                Ok(Some(backup)) => warn!("Unreadable library backed up to {}", backup),
                Ok(None) => {}
                Err(backup_err) => {
                    return Err(anyhow::Error::new(backup_err).context(
                        "Library is unreadable and could not be backed up; refusing to replace it",
                    ))
                }
            }
            Ok(Library::new(clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::LibraryError;
    use crate::preview::{LinkPreview, PreviewImage, StaticPreviews};
    use tempfile::TempDir;

    struct Harness {
        documents: Arc<MemoryDocumentStorage>,
        files: Arc<MemoryFileStorage>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                documents: Arc::new(MemoryDocumentStorage::new()),
                files: Arc::new(MemoryFileStorage::new()),
                clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            }
        }

        fn with_document(text: &str) -> Self {
            Self {
                documents: Arc::new(MemoryDocumentStorage::with_text(text)),
                ..Self::new()
            }
        }

        fn options(&self) -> StoreOptions {
            StoreOptions {
                documents: self.documents.clone(),
                files: self.files.clone(),
                clock: self.clock.clone(),
                previews: Arc::new(NoPreviews),
                save_delay: Duration::from_secs(60),
            }
        }

        async fn open(&self) -> Store {
            Store::open_with(self.options()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_open_empty_storage() {
        let harness = Harness::new();
        let store = harness.open().await;
        assert_eq!(store.read(|lib| lib.len()).unwrap(), 2);
        assert_eq!(store.save_status(), SaveStatus::Saved);
        assert_eq!(harness.documents.writes(), 0);
    }

    #[tokio::test]
    async fn test_mutations_persist_and_reload() {
        let harness = Harness::new();
        let store = harness.open().await;
        let dir = store.create_directory("/journal").unwrap();
        let note = store.add_text_node(&dir, "dear diary").unwrap();
        let tag = store.create_tag("private").unwrap();
        store.append_tag(&note, &tag).unwrap();
        store.close().await.unwrap();
        assert_eq!(harness.documents.writes(), 1);

        let reopened = harness.open().await;
        let (path, tags) = reopened
            .read(|lib| {
                (
                    lib.get_path(&dir).unwrap(),
                    lib.get_node(&note).unwrap().node().tags.clone(),
                )
            })
            .unwrap();
        assert_eq!(path, "/journal");
        assert_eq!(tags, vec![tag]);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_backed_up() {
        let harness = Harness::with_document("{ this is not json");
        let store = harness.open().await;

        assert_eq!(store.read(|lib| lib.len()).unwrap(), 2);
        assert_eq!(
            harness.documents.backup().await.as_deref(),
            Some("{ this is not json")
        );
    }

    #[tokio::test]
    async fn test_future_version_falls_back_to_empty() {
        let harness = Harness::with_document(r#"{"nodes": [], "version": 99}"#);
        let store = harness.open().await;
        assert_eq!(store.read(|lib| lib.len()).unwrap(), 2);
        assert!(harness.documents.backup().await.is_some());
    }

    #[tokio::test]
    async fn test_engine_errors_surface() {
        let harness = Harness::new();
        let store = harness.open().await;
        let err = store
            .add_text_node(&NodeId::from("missing"), "x")
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LibraryError>(),
            Some(&LibraryError::NotFound(NodeId::from("missing")))
        );
        assert_eq!(store.save_status(), SaveStatus::Saved);
    }

    #[tokio::test]
    async fn test_remove_image_deletes_blob() {
        let harness = Harness::new();
        let store = harness.open().await;
        let image = store
            .add_image_from_bytes(&NodeId::master(), vec![1, 2, 3], "image/png", Some("dot.png"))
            .await
            .unwrap();
        assert_eq!(harness.files.len().await, 1);

        let removal = store.remove_node(&image).await.unwrap();
        assert_eq!(removal.files.len(), 1);
        assert!(harness.files.is_empty().await);
        assert!(store.read(|lib| lib.files().is_empty()).unwrap());
    }

    #[tokio::test]
    async fn test_blob_removal_failure_is_not_fatal() {
        let harness = Harness::new();
        let store = harness.open().await;
        let image = store
            .add_image_from_bytes(&NodeId::master(), vec![9], "image/png", None)
            .await
            .unwrap();
        store.trash_node(&image).unwrap();

        harness.files.set_fail_removals(true);
        let removal = store.empty_trash().await.unwrap();
        assert_eq!(removal.nodes.len(), 1);
        assert_eq!(store.read(|lib| lib.len()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_image_for_missing_parent_stores_nothing() {
        let harness = Harness::new();
        let store = harness.open().await;
        assert!(store
            .add_image_from_bytes(&NodeId::from("ghost"), vec![1], "image/png", None)
            .await
            .is_err());
        assert!(harness.files.is_empty().await);
    }

    #[tokio::test]
    async fn test_read_file_touches_accessed() {
        let harness = Harness::new();
        let store = harness.open().await;
        let file = store
            .add_file_from_bytes(b"notes".to_vec(), "text/plain", Some("a.txt"))
            .await
            .unwrap();

        harness.clock.advance(5_000);
        assert_eq!(store.read_text_file(&file.id).await.unwrap(), "notes");
        let accessed = store
            .read(|lib| lib.get_file(&file.id).unwrap().accessed)
            .unwrap();
        assert_eq!(accessed.as_millis(), 1_700_000_005_000);

        assert!(store.read_file(&FileId::from("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_import_file_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("readme.md");
        std::fs::write(&path, "# Title").unwrap();

        let harness = Harness::new();
        let store = harness.open().await;
        let file = store.import_file(&path).await.unwrap();
        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.name.as_deref(), Some("readme.md"));

        let embed = store.add_text_embed_node(&NodeId::master(), file.id.clone()).unwrap();
        let removal = store.remove_node(&embed).await.unwrap();
        assert!(removal.files.is_empty());
        assert!(harness.files.contains(&file.id).await);
    }

    #[tokio::test]
    async fn test_anchor_degrades_without_preview() {
        let harness = Harness::new();
        let previews = StaticPreviews::new();
        let store = Store::open_with(harness.options().with_previews(Arc::new(previews)))
            .await
            .unwrap();

        let id = store
            .add_anchor_from_url(&NodeId::master(), "https://unknown.example")
            .await
            .unwrap();
        let content = store.read(|lib| lib.get_node(&id).unwrap().content().clone()).unwrap();
        match content {
            NodeContent::Anchor(preview) => {
                assert_eq!(preview.url, "https://unknown.example");
                assert!(preview.title.is_none());
                assert!(preview.file_id.is_none());
            }
            other => panic!("expected anchor, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anchor_with_preview_image() {
        let harness = Harness::new();
        let previews = StaticPreviews::new().with(
            "https://example.com",
            LinkPreview {
                title: Some("Example Domain".to_string()),
                description: None,
                image: Some(PreviewImage {
                    bytes: vec![0x89, 0x50],
                    mime_type: "image/png".to_string(),
                    url: Some("https://example.com/og.png".to_string()),
                }),
                modified: None,
            },
        );
        let store = Store::open_with(harness.options().with_previews(Arc::new(previews)))
            .await
            .unwrap();

        let id = store
            .add_anchor_from_url(&NodeId::master(), "https://example.com")
            .await
            .unwrap();
        let (file_id, title) = store
            .read(|lib| match lib.get_node(&id).unwrap().content() {
                NodeContent::Anchor(p) => (p.file_id.clone().unwrap(), p.title.clone()),
                _ => unreachable!(),
            })
            .unwrap();
        assert_eq!(title.as_deref(), Some("Example Domain"));
        assert!(harness.files.contains(&file_id).await);

        // Anchors own their preview image
        store.remove_node(&id).await.unwrap();
        assert!(!harness.files.contains(&file_id).await);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let harness = Harness::new();
        let store = harness.open().await;
        let mut events = store.subscribe();

        let id = store.add_math_node(&NodeId::master(), "1+1").unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            LibraryEvent::NodeAdded {
                id: id.clone(),
                parent: NodeId::master()
            }
        );

        store.trash_node(&id).unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            LibraryEvent::NodeMoved {
                id: id.clone(),
                parent: NodeId::trash()
            }
        );

        store.remove_node(&id).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            LibraryEvent::NodesRemoved { ids: vec![id] }
        );
    }

    #[tokio::test]
    async fn test_filesystem_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            save_delay_ms: 10,
            log_file: None,
        };

        let store = Store::open_with_config(&config).await.unwrap();
        let image = store
            .add_image_from_bytes(&NodeId::master(), vec![1, 2], "image/png", None)
            .await
            .unwrap();
        store.flush().await.unwrap();
        assert!(config.library_path().exists());
        store.close().await.unwrap();

        let reopened = Store::open_with_config(&config).await.unwrap();
        let file_id = reopened
            .read(|lib| lib.get_node(&image).unwrap().content().file_refs()[0].clone())
            .unwrap();
        assert_eq!(reopened.read_file(&file_id).await.unwrap(), vec![1, 2]);
    }
}
