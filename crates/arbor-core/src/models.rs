//! Data models for Arbor
//!
//! Defines the persisted shapes: nodes and their typed payloads, files and tags.
//! Structural data (parent, children order, index, depth) lives in the forest,
//! not here; see `tree`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp::Timestamp;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque node identifier
    NodeId
);
string_id!(
    /// Opaque tag identifier
    TagId
);
string_id!(
    /// Opaque file identifier, also the key in file storage
    FileId
);

impl NodeId {
    /// Id of the reserved Master root
    pub const MASTER: &'static str = "master";
    /// Id of the reserved Trash root
    pub const TRASH: &'static str = "trash";

    pub fn master() -> Self {
        Self(Self::MASTER.to_string())
    }

    pub fn trash() -> Self {
        Self(Self::TRASH.to_string())
    }

    /// Whether this id names one of the two reserved roots
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::MASTER || self.0 == Self::TRASH
    }
}

/// Inline formatting applied to a text segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

/// A run of text sharing the same formatting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    /// Link target when the segment is a hyperlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl TextSegment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
            href: None,
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        if !self.marks.contains(&mark) {
            self.marks.push(mark);
        }
        self
    }
}

/// Inline-formatted content of Text, Heading and Quote nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(pub Vec<TextSegment>);

impl RichText {
    pub fn segments(&self) -> &[TextSegment] {
        &self.0
    }

    /// Concatenated text with formatting dropped
    pub fn plain_text(&self) -> String {
        self.0.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.text.is_empty())
    }
}

impl From<&str> for RichText {
    fn from(s: &str) -> Self {
        Self(vec![TextSegment::plain(s)])
    }
}

impl From<String> for RichText {
    fn from(s: String) -> Self {
        Self(vec![TextSegment::plain(s)])
    }
}

impl From<Vec<TextSegment>> for RichText {
    fn from(segments: Vec<TextSegment>) -> Self {
        Self(segments)
    }
}

/// A captured link preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPreview {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Preview image, stored as a file
    #[serde(rename = "fileID", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    /// When the preview was fetched
    pub content_accessed: Timestamp,
    /// When the linked content reported its last change
    pub content_modified: Timestamp,
}

impl AnchorPreview {
    /// A preview holding only the url
    pub fn bare(url: impl Into<String>, now: Timestamp) -> Self {
        Self {
            url: url.into(),
            title: None,
            description: None,
            file_id: None,
            content_accessed: now,
            content_modified: now,
        }
    }
}

/// Variant-specific payload of a node
///
/// Serialized inline with the node, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeContent {
    Text {
        content: RichText,
    },
    Heading {
        content: RichText,
    },
    Quote {
        content: RichText,
    },
    Image {
        #[serde(rename = "fileID")]
        file_id: FileId,
    },
    TextEmbed {
        #[serde(rename = "fileID")]
        file_id: FileId,
    },
    Math {
        expression: String,
    },
    Anchor(AnchorPreview),
    Canvas {
        #[serde(rename = "fileID")]
        file_id: FileId,
        #[serde(rename = "previewFileID")]
        preview_file_id: FileId,
    },
    Directory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Node kind without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    Heading,
    Quote,
    Image,
    TextEmbed,
    Math,
    Anchor,
    Canvas,
    Directory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Heading => "heading",
            NodeKind::Quote => "quote",
            NodeKind::Image => "image",
            NodeKind::TextEmbed => "textEmbed",
            NodeKind::Math => "math",
            NodeKind::Anchor => "anchor",
            NodeKind::Canvas => "canvas",
            NodeKind::Directory => "directory",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three kinds that carry rich text and can be retyped into each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Text,
    Heading,
    Quote,
}

impl std::str::FromStr for TextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(TextKind::Text),
            "heading" => Ok(TextKind::Heading),
            "quote" => Ok(TextKind::Quote),
            other => Err(format!("unknown text kind '{other}' (expected text|heading|quote)")),
        }
    }
}

impl NodeContent {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeContent::Text { .. } => NodeKind::Text,
            NodeContent::Heading { .. } => NodeKind::Heading,
            NodeContent::Quote { .. } => NodeKind::Quote,
            NodeContent::Image { .. } => NodeKind::Image,
            NodeContent::TextEmbed { .. } => NodeKind::TextEmbed,
            NodeContent::Math { .. } => NodeKind::Math,
            NodeContent::Anchor(_) => NodeKind::Anchor,
            NodeContent::Canvas { .. } => NodeKind::Canvas,
            NodeContent::Directory { .. } => NodeKind::Directory,
        }
    }

    /// Directory name, if this is a named directory
    pub fn directory_name(&self) -> Option<&str> {
        match self {
            NodeContent::Directory { name } => name.as_deref(),
            _ => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, NodeContent::Directory { .. })
    }

    /// Rich text of Text, Heading and Quote nodes
    pub fn rich_text(&self) -> Option<&RichText> {
        match self {
            NodeContent::Text { content }
            | NodeContent::Heading { content }
            | NodeContent::Quote { content } => Some(content),
            _ => None,
        }
    }

    /// Every file id this payload mentions
    pub fn file_refs(&self) -> Vec<&FileId> {
        match self {
            NodeContent::Image { file_id } | NodeContent::TextEmbed { file_id } => vec![file_id],
            NodeContent::Anchor(preview) => preview.file_id.iter().collect(),
            NodeContent::Canvas {
                file_id,
                preview_file_id,
            } => vec![file_id, preview_file_id],
            _ => Vec::new(),
        }
    }

    /// File ids this payload owns; they are released when the node is removed
    ///
    /// Text embeds point at files that may be shared, so they own nothing.
    pub fn owned_files(&self) -> Vec<&FileId> {
        match self {
            NodeContent::Image { .. } | NodeContent::Anchor(_) | NodeContent::Canvas { .. } => {
                self.file_refs()
            }
            _ => Vec::new(),
        }
    }
}

/// A node's persisted fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub created: Timestamp,
    pub modified: Timestamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagId>,
    #[serde(flatten)]
    pub content: NodeContent,
}

impl Node {
    /// Create a node with a fresh id
    pub fn new(content: NodeContent, now: Timestamp) -> Self {
        Self::with_id(NodeId::generate(), content, now)
    }

    /// Create a node with a specific id (reserved roots, loading)
    pub fn with_id(id: NodeId, content: NodeContent, now: Timestamp) -> Self {
        Self {
            id,
            created: now,
            modified: now,
            tags: Vec::new(),
            content,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    /// Add a tag; returns false when it was already present
    pub fn add_tag(&mut self, tag: TagId, now: Timestamp) -> bool {
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        self.modified = now;
        true
    }

    /// Remove a tag; returns false when it was not present
    pub fn remove_tag(&mut self, tag: &TagId, now: Timestamp) -> bool {
        match self.tags.iter().position(|t| t == tag) {
            Some(pos) => {
                self.tags.remove(pos);
                self.modified = now;
                true
            }
            None => false,
        }
    }

    pub fn has_tag(&self, tag: &TagId) -> bool {
        self.tags.contains(tag)
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.modified = now;
    }
}

/// Metadata for an externally stored binary file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: FileId,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub modified: Timestamp,
    pub accessed: Timestamp,
}

impl File {
    /// Create a file entry with a fresh id
    pub fn new(mime_type: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: FileId::generate(),
            mime_type: mime_type.into(),
            name: None,
            url: None,
            modified: now,
            accessed: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A tag for organizing nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
}
