//! Tag and file registries
//!
//! Flat lists that nodes point into by id. Neither registry knows about the
//! forest; keeping references consistent is the library's job.

use crate::models::{File, FileId, Tag, TagId};
use crate::timestamp::Timestamp;

/// Colors handed out to new tags, in order
pub const TAG_PALETTE: &[&str] = &[
    "#e57373", "#64b5f6", "#81c784", "#ffb74d", "#ba68c8", "#4db6ac", "#f06292", "#a1887f",
];

/// Color for tags loaded without one
pub const DEFAULT_TAG_COLOR: &str = "#9e9e9e";

/// All known tags
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: Vec<Tag>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tags(tags: Vec<Tag>) -> Self {
        Self { tags }
    }

    /// Create a tag with a fresh id
    ///
    /// Never deduplicates: two calls with the same name produce two tags. Use
    /// `find_tag` first when reuse is wanted.
    pub fn create_tag(&mut self, name: impl Into<String>) -> &Tag {
        let color = TAG_PALETTE[self.tags.len() % TAG_PALETTE.len()].to_string();
        self.create_tag_with_color(name, color)
    }

    pub fn create_tag_with_color(&mut self, name: impl Into<String>, color: impl Into<String>) -> &Tag {
        let index = self.tags.len();
        self.tags.push(Tag {
            id: TagId::generate(),
            name: name.into(),
            color: color.into(),
        });
        &self.tags[index]
    }

    /// First tag whose name matches case-insensitively
    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        let wanted = name.to_lowercase();
        self.tags.iter().find(|t| t.name.to_lowercase() == wanted)
    }

    pub fn get_tag(&self, id: &TagId) -> Option<&Tag> {
        self.tags.iter().find(|t| &t.id == id)
    }

    pub fn get_tag_mut(&mut self, id: &TagId) -> Option<&mut Tag> {
        self.tags.iter_mut().find(|t| &t.id == id)
    }

    /// Drop a tag entry; returns it if it existed
    pub fn remove_tag(&mut self, id: &TagId) -> Option<Tag> {
        let pos = self.tags.iter().position(|t| &t.id == id)?;
        Some(self.tags.remove(pos))
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Metadata of every stored file
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    files: Vec<File>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: Vec<File>) -> Self {
        Self { files }
    }

    /// Register a file; an entry with the same id is replaced
    pub fn add_file(&mut self, file: File) {
        match self.files.iter_mut().find(|f| f.id == file.id) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
    }

    pub fn get_file(&self, id: &FileId) -> Option<&File> {
        self.files.iter().find(|f| &f.id == id)
    }

    /// Remove an entry; the blob itself is the storage collaborator's business
    pub fn remove_file(&mut self, id: &FileId) -> Option<File> {
        let pos = self.files.iter().position(|f| &f.id == id)?;
        Some(self.files.remove(pos))
    }

    /// Record an access
    pub fn touch(&mut self, id: &FileId, now: Timestamp) -> Option<&File> {
        let file = self.files.iter_mut().find(|f| &f.id == id)?;
        file.accessed = now;
        Some(file)
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
