//! The library aggregate
//!
//! `Library` ties the forest to the tag and file registries and stamps every
//! change with the clock. It is a plain synchronous value: persistence,
//! notifications and blob storage are layered on top by `Store`.

mod paths;

pub use paths::TRASH_LABEL;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{LibraryError, LibraryResult};
use crate::models::{
    AnchorPreview, File, FileId, Node, NodeContent, NodeId, NodeKind, RichText, Tag, TagId,
    TextKind,
};
use crate::registry::{FileRegistry, TagRegistry};
use crate::timestamp::Timestamp;
use crate::tree::{Forest, TreeNode, Visit};

/// What a removal took out of the library
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    /// Removed nodes in pre-order
    pub nodes: Vec<Node>,
    /// File entries no surviving node references any more
    pub files: Vec<File>,
}

impl Removal {
    fn merge(&mut self, other: Removal) {
        self.nodes.extend(other.nodes);
        self.files.extend(other.files);
    }
}

/// Forest, files and tags
pub struct Library {
    forest: Forest,
    files: FileRegistry,
    tags: TagRegistry,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("nodes", &self.forest.len())
            .field("files", &self.files.len())
            .field("tags", &self.tags.len())
            .finish()
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Library {
    /// An empty library: just Master and Trash
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let forest = Forest::new(clock.now());
        Self {
            forest,
            files: FileRegistry::new(),
            tags: TagRegistry::new(),
            clock,
        }
    }

    pub(crate) fn from_parts(
        forest: Forest,
        files: FileRegistry,
        tags: TagRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            forest,
            files,
            tags,
            clock,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn files(&self) -> &[File] {
        self.files.files()
    }

    pub fn tags(&self) -> &[Tag] {
        self.tags.tags()
    }

    /// Number of nodes, roots included
    pub fn len(&self) -> usize {
        self.forest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forest.is_empty()
    }

    // ==================== Nodes ====================

    pub fn get_node(&self, id: &NodeId) -> LibraryResult<&TreeNode> {
        self.forest.get(id)
    }

    /// Pre-order traversal of the whole forest
    pub fn visit(&self) -> Visit<'_> {
        self.forest.visit()
    }

    pub fn visit_from(&self, id: &NodeId) -> LibraryResult<Visit<'_>> {
        self.forest.visit_from(id)
    }

    /// Insert a new node with `content` as the last child of `parent`
    ///
    /// Every file the content references must already be registered.
    pub fn add_node(&mut self, parent: &NodeId, content: NodeContent) -> LibraryResult<NodeId> {
        for file_id in content.file_refs() {
            if self.files.get_file(file_id).is_none() {
                return Err(LibraryError::FileNotFound(file_id.clone()));
            }
        }
        let node = Node::new(content, self.clock.now());
        let kind = node.kind();
        let id = self.forest.add_node(parent, node)?;
        debug!("Added {} node {} under {}", kind, id, parent);
        Ok(id)
    }

    pub fn add_text_node(&mut self, parent: &NodeId, text: impl Into<RichText>) -> LibraryResult<NodeId> {
        self.add_node(parent, NodeContent::Text { content: text.into() })
    }

    pub fn add_heading_node(&mut self, parent: &NodeId, text: impl Into<RichText>) -> LibraryResult<NodeId> {
        self.add_node(parent, NodeContent::Heading { content: text.into() })
    }

    pub fn add_quote_node(&mut self, parent: &NodeId, text: impl Into<RichText>) -> LibraryResult<NodeId> {
        self.add_node(parent, NodeContent::Quote { content: text.into() })
    }

    pub fn add_math_node(&mut self, parent: &NodeId, expression: impl Into<String>) -> LibraryResult<NodeId> {
        self.add_node(
            parent,
            NodeContent::Math {
                expression: expression.into(),
            },
        )
    }

    pub fn add_directory(&mut self, parent: &NodeId, name: Option<&str>) -> LibraryResult<NodeId> {
        self.add_node(
            parent,
            NodeContent::Directory {
                name: name.map(str::to_string),
            },
        )
    }

    /// Register `file` and add an image node owning it
    pub fn add_image_node(&mut self, parent: &NodeId, file: File) -> LibraryResult<NodeId> {
        self.forest.get(parent)?;
        let file_id = file.id.clone();
        self.files.add_file(file);
        self.add_node(parent, NodeContent::Image { file_id })
    }

    /// Add a node embedding an already registered file
    pub fn add_text_embed_node(&mut self, parent: &NodeId, file_id: FileId) -> LibraryResult<NodeId> {
        self.add_node(parent, NodeContent::TextEmbed { file_id })
    }

    /// Add a link preview, registering its preview image if there is one
    pub fn add_anchor_node(
        &mut self,
        parent: &NodeId,
        mut preview: AnchorPreview,
        preview_file: Option<File>,
    ) -> LibraryResult<NodeId> {
        self.forest.get(parent)?;
        if let Some(file) = preview_file {
            preview.file_id = Some(file.id.clone());
            self.files.add_file(file);
        }
        self.add_node(parent, NodeContent::Anchor(preview))
    }

    /// Register both canvas files and add the canvas node
    pub fn add_canvas_node(&mut self, parent: &NodeId, file: File, preview: File) -> LibraryResult<NodeId> {
        self.forest.get(parent)?;
        let content = NodeContent::Canvas {
            file_id: file.id.clone(),
            preview_file_id: preview.id.clone(),
        };
        self.files.add_file(file);
        self.files.add_file(preview);
        self.add_node(parent, content)
    }

    /// Remove a node and its subtree
    ///
    /// Files owned by removed image, anchor and canvas nodes are dropped from the
    /// registry unless a surviving node still references them. The caller deletes
    /// the blobs of the returned files.
    pub fn remove_node(&mut self, id: &NodeId) -> LibraryResult<Removal> {
        let nodes = self.forest.remove_node(id)?;

        let candidates: Vec<FileId> = nodes
            .iter()
            .flat_map(|node| node.content.owned_files())
            .cloned()
            .collect();

        let mut files = Vec::new();
        if !candidates.is_empty() {
            let still_used = self.referenced_files();
            for file_id in candidates {
                if still_used.contains(&file_id) {
                    continue;
                }
                if let Some(file) = self.files.remove_file(&file_id) {
                    files.push(file);
                }
            }
        }

        debug!(
            "Removed {} node(s) and {} file(s) starting at {}",
            nodes.len(),
            files.len(),
            id
        );
        Ok(Removal { nodes, files })
    }

    /// Every file id referenced by a node in the forest
    fn referenced_files(&self) -> HashSet<FileId> {
        self.forest
            .visit()
            .flat_map(|entry| entry.content().file_refs())
            .cloned()
            .collect()
    }

    /// Nodes whose payload references `file_id`
    pub fn nodes_referencing_file(&self, file_id: &FileId) -> Vec<NodeId> {
        self.forest
            .filter(|entry| entry.content().file_refs().contains(&file_id))
            .map(|entry| entry.id().clone())
            .collect()
    }

    // ==================== Structure ====================

    /// Move `id` under `new_parent`, before `reference` or at the end
    pub fn move_node_before(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        reference: Option<&NodeId>,
    ) -> LibraryResult<()> {
        self.forest.move_node_before(id, new_parent, reference)?;
        self.touch(id)
    }

    pub fn swap_index(&mut self, a: &NodeId, b: &NodeId) -> LibraryResult<()> {
        self.forest.swap_index(a, b)?;
        self.touch(a)?;
        self.touch(b)
    }

    pub fn indent_node(&mut self, id: &NodeId) -> LibraryResult<()> {
        self.forest.indent_node(id)?;
        self.touch(id)
    }

    pub fn outdent_node(&mut self, id: &NodeId) -> LibraryResult<()> {
        self.forest.outdent_node(id)?;
        self.touch(id)
    }

    /// Move a node to the end of Trash
    pub fn trash_node(&mut self, id: &NodeId) -> LibraryResult<()> {
        self.move_node_before(id, &NodeId::trash(), None)
    }

    /// Remove everything in Trash
    pub fn empty_trash(&mut self) -> LibraryResult<Removal> {
        let children = self.forest.get(&NodeId::trash())?.children().to_vec();
        let mut removal = Removal::default();
        for child in children {
            removal.merge(self.remove_node(&child)?);
        }
        Ok(removal)
    }

    // ==================== Content ====================

    /// Switch between text, heading and quote keeping the content
    pub fn retype_node(&mut self, id: &NodeId, kind: TextKind) -> LibraryResult<()> {
        let now = self.clock.now();
        let node = self.forest.node_mut(id)?;
        let content = node
            .content
            .rich_text()
            .cloned()
            .ok_or_else(|| LibraryError::NotTextual {
                id: id.clone(),
                kind: node.kind(),
            })?;
        node.content = match kind {
            TextKind::Text => NodeContent::Text { content },
            TextKind::Heading => NodeContent::Heading { content },
            TextKind::Quote => NodeContent::Quote { content },
        };
        node.touch(now);
        Ok(())
    }

    /// Replace the rich text of a text, heading or quote node
    pub fn set_text(&mut self, id: &NodeId, text: impl Into<RichText>) -> LibraryResult<()> {
        let now = self.clock.now();
        let node = self.forest.node_mut(id)?;
        match &mut node.content {
            NodeContent::Text { content }
            | NodeContent::Heading { content }
            | NodeContent::Quote { content } => *content = text.into(),
            other => {
                return Err(LibraryError::NotTextual {
                    id: id.clone(),
                    kind: other.kind(),
                })
            }
        }
        node.touch(now);
        Ok(())
    }

    pub fn set_math_expression(&mut self, id: &NodeId, expression: impl Into<String>) -> LibraryResult<()> {
        let now = self.clock.now();
        let node = self.forest.node_mut(id)?;
        match &mut node.content {
            NodeContent::Math { expression: current } => *current = expression.into(),
            other => {
                return Err(LibraryError::WrongKind {
                    id: id.clone(),
                    kind: other.kind(),
                    expected: NodeKind::Math,
                })
            }
        }
        node.touch(now);
        Ok(())
    }

    /// Rename a directory, keeping sibling names unique
    pub fn rename_directory(&mut self, id: &NodeId, name: Option<&str>) -> LibraryResult<()> {
        if id.is_reserved() {
            return Err(LibraryError::ReservedNode(id.clone()));
        }
        let entry = self.forest.get(id)?;
        if !entry.content().is_directory() {
            return Err(LibraryError::WrongKind {
                id: id.clone(),
                kind: entry.content().kind(),
                expected: NodeKind::Directory,
            });
        }
        let renamed = NodeContent::Directory {
            name: name.map(str::to_string),
        };
        if let Some(parent) = entry.parent().cloned() {
            self.forest.check_directory_name(&parent, &renamed, Some(id))?;
        }

        let now = self.clock.now();
        let node = self.forest.node_mut(id)?;
        node.content = renamed;
        node.touch(now);
        Ok(())
    }

    fn touch(&mut self, id: &NodeId) -> LibraryResult<()> {
        let now = self.clock.now();
        self.forest.node_mut(id)?.touch(now);
        Ok(())
    }

    // ==================== Tags ====================

    /// Create a tag; always a new id, even if the name is taken
    pub fn create_tag(&mut self, name: impl Into<String>) -> TagId {
        self.tags.create_tag(name).id.clone()
    }

    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.find_tag(name)
    }

    pub fn get_tag(&self, id: &TagId) -> Option<&Tag> {
        self.tags.get_tag(id)
    }

    /// Existing tag with this name, or a new one
    pub fn find_or_create_tag(&mut self, name: &str) -> TagId {
        match self.tags.find_tag(name) {
            Some(tag) => tag.id.clone(),
            None => self.create_tag(name),
        }
    }

    pub fn set_tag_color(&mut self, id: &TagId, color: impl Into<String>) -> LibraryResult<()> {
        let tag = self
            .tags
            .get_tag_mut(id)
            .ok_or_else(|| LibraryError::TagNotFound(id.clone()))?;
        tag.color = color.into();
        Ok(())
    }

    /// Tag a node; returns false when the node already had the tag
    pub fn append_tag(&mut self, node_id: &NodeId, tag_id: &TagId) -> LibraryResult<bool> {
        if self.tags.get_tag(tag_id).is_none() {
            return Err(LibraryError::TagNotFound(tag_id.clone()));
        }
        let now = self.clock.now();
        Ok(self.forest.node_mut(node_id)?.add_tag(tag_id.clone(), now))
    }

    /// Untag a node; returns false when the node did not have the tag
    pub fn remove_tag_from_node(&mut self, node_id: &NodeId, tag_id: &TagId) -> LibraryResult<bool> {
        let now = self.clock.now();
        Ok(self.forest.node_mut(node_id)?.remove_tag(tag_id, now))
    }

    /// Delete a tag and strip it from every node; returns how many nodes had it
    pub fn delete_tag(&mut self, tag_id: &TagId) -> LibraryResult<usize> {
        self.tags
            .remove_tag(tag_id)
            .ok_or_else(|| LibraryError::TagNotFound(tag_id.clone()))?;

        let tagged: Vec<NodeId> = self.nodes_with_tag(tag_id).map(|e| e.id().clone()).collect();
        let now = self.clock.now();
        for id in &tagged {
            self.forest.node_mut(id)?.remove_tag(tag_id, now);
        }
        Ok(tagged.len())
    }

    /// Nodes carrying `tag_id`, in pre-order
    pub fn nodes_with_tag<'a>(&'a self, tag_id: &'a TagId) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.forest.filter(move |entry| entry.node().has_tag(tag_id))
    }

    // ==================== Files ====================

    pub fn add_file(&mut self, file: File) {
        self.files.add_file(file);
    }

    pub fn get_file(&self, id: &FileId) -> Option<&File> {
        self.files.get_file(id)
    }

    /// Drop a file entry regardless of references
    pub fn remove_file(&mut self, id: &FileId) -> LibraryResult<File> {
        self.files
            .remove_file(id)
            .ok_or_else(|| LibraryError::FileNotFound(id.clone()))
    }

    /// Record that a file was read
    pub fn touch_file(&mut self, id: &FileId) -> LibraryResult<&File> {
        let now = self.clock.now();
        self.files
            .touch(id, now)
            .ok_or_else(|| LibraryError::FileNotFound(id.clone()))
    }

    pub(crate) fn file_registry(&self) -> &FileRegistry {
        &self.files
    }

    pub(crate) fn tag_registry(&self) -> &TagRegistry {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::InvalidMoveReason;
    use crate::tree::testing::assert_consistent;

    fn library() -> (Library, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        (Library::new(clock.clone()), clock)
    }

    fn file(clock: &ManualClock, mime: &str) -> File {
        File::new(mime, clock.now())
    }

    #[test]
    fn test_factories_stamp_clock_time() {
        let (mut lib, clock) = library();
        clock.set(42_000);
        let id = lib.add_text_node(&NodeId::master(), "hello").unwrap();
        let node = lib.get_node(&id).unwrap();
        assert_eq!(node.node().created.as_millis(), 42_000);
        assert_eq!(node.node().modified.as_millis(), 42_000);
        assert_eq!(node.content().rich_text().unwrap().plain_text(), "hello");
        assert_eq!(node.depth(), 1);
    }

    #[test]
    fn test_add_node_requires_registered_files() {
        let (mut lib, _) = library();
        let err = lib
            .add_text_embed_node(&NodeId::master(), FileId::from("missing"))
            .unwrap_err();
        assert_eq!(err, LibraryError::FileNotFound(FileId::from("missing")));
    }

    #[test]
    fn test_move_refreshes_modified() {
        let (mut lib, clock) = library();
        let a = lib.add_text_node(&NodeId::master(), "a").unwrap();
        lib.add_text_node(&NodeId::master(), "b").unwrap();
        clock.advance(10);
        lib.move_node_before(&a, &NodeId::master(), None).unwrap();
        assert_eq!(lib.get_node(&a).unwrap().node().modified.as_millis(), 1_010);
        assert_consistent(lib.forest());
    }

    #[test]
    fn test_remove_image_releases_its_file() {
        let (mut lib, clock) = library();
        let png = file(&clock, "image/png");
        let file_id = png.id.clone();
        let image = lib.add_image_node(&NodeId::master(), png).unwrap();

        let removal = lib.remove_node(&image).unwrap();
        assert_eq!(removal.nodes.len(), 1);
        assert_eq!(removal.files.len(), 1);
        assert_eq!(removal.files[0].id, file_id);
        assert!(lib.get_file(&file_id).is_none());
    }

    #[test]
    fn test_remove_keeps_files_still_referenced() {
        let (mut lib, clock) = library();
        let png = file(&clock, "image/png");
        let file_id = png.id.clone();
        let image = lib.add_image_node(&NodeId::master(), png).unwrap();
        lib.add_text_embed_node(&NodeId::master(), file_id.clone()).unwrap();

        let removal = lib.remove_node(&image).unwrap();
        assert!(removal.files.is_empty());
        assert!(lib.get_file(&file_id).is_some());
    }

    #[test]
    fn test_remove_text_embed_keeps_file() {
        let (mut lib, clock) = library();
        let txt = file(&clock, "text/plain");
        let file_id = txt.id.clone();
        lib.add_file(txt);
        let embed = lib.add_text_embed_node(&NodeId::master(), file_id.clone()).unwrap();

        let removal = lib.remove_node(&embed).unwrap();
        assert!(removal.files.is_empty());
        assert!(lib.get_file(&file_id).is_some());
    }

    #[test]
    fn test_remove_subtree_releases_nested_canvas_and_anchor_files() {
        let (mut lib, clock) = library();
        let folder = lib.add_directory(&NodeId::master(), Some("Sketches")).unwrap();
        lib.add_canvas_node(
            &folder,
            file(&clock, "application/json"),
            file(&clock, "image/png"),
        )
        .unwrap();
        let preview = AnchorPreview::bare("https://example.com", clock.now());
        lib.add_anchor_node(&folder, preview, Some(file(&clock, "image/jpeg")))
            .unwrap();
        assert_eq!(lib.files().len(), 3);

        let removal = lib.remove_node(&folder).unwrap();
        assert_eq!(removal.nodes.len(), 3);
        assert_eq!(removal.files.len(), 3);
        assert!(lib.files().is_empty());
        assert_consistent(lib.forest());
    }

    #[test]
    fn test_trash_and_empty_trash() {
        let (mut lib, clock) = library();
        let a = lib.add_text_node(&NodeId::master(), "a").unwrap();
        let b = lib.add_image_node(&NodeId::master(), file(&clock, "image/png")).unwrap();
        lib.trash_node(&a).unwrap();
        lib.trash_node(&b).unwrap();
        assert_eq!(lib.get_node(&NodeId::trash()).unwrap().children().len(), 2);
        assert_consistent(lib.forest());

        let removal = lib.empty_trash().unwrap();
        assert_eq!(removal.nodes.len(), 2);
        assert_eq!(removal.files.len(), 1);
        assert_eq!(lib.len(), 2);
        assert_consistent(lib.forest());
    }

    #[test]
    fn test_retype_keeps_content() {
        let (mut lib, _) = library();
        let id = lib.add_text_node(&NodeId::master(), "Title").unwrap();
        lib.retype_node(&id, TextKind::Heading).unwrap();
        let node = lib.get_node(&id).unwrap();
        assert_eq!(node.content().kind(), NodeKind::Heading);
        assert_eq!(node.content().rich_text().unwrap().plain_text(), "Title");

        let math = lib.add_math_node(&NodeId::master(), "x^2").unwrap();
        assert!(matches!(
            lib.retype_node(&math, TextKind::Quote),
            Err(LibraryError::NotTextual { .. })
        ));
    }

    #[test]
    fn test_set_text_and_math() {
        let (mut lib, _) = library();
        let quote = lib.add_quote_node(&NodeId::master(), "old").unwrap();
        lib.set_text(&quote, "new").unwrap();
        assert_eq!(
            lib.get_node(&quote).unwrap().content().rich_text().unwrap().plain_text(),
            "new"
        );

        let math = lib.add_math_node(&NodeId::master(), "a+b").unwrap();
        lib.set_math_expression(&math, "a-b").unwrap();
        assert_eq!(
            lib.get_node(&math).unwrap().content(),
            &NodeContent::Math {
                expression: "a-b".to_string()
            }
        );
        assert!(matches!(
            lib.set_math_expression(&quote, "1"),
            Err(LibraryError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_rename_directory_checks_siblings() {
        let (mut lib, _) = library();
        let a = lib.add_directory(&NodeId::master(), Some("Alpha")).unwrap();
        lib.add_directory(&NodeId::master(), Some("Beta")).unwrap();

        assert!(matches!(
            lib.rename_directory(&a, Some("BETA")),
            Err(LibraryError::DuplicateName { .. })
        ));
        lib.rename_directory(&a, Some("ALPHA")).unwrap();
        assert_eq!(
            lib.get_node(&a).unwrap().content().directory_name(),
            Some("ALPHA")
        );
        assert!(matches!(
            lib.rename_directory(&NodeId::master(), Some("x")),
            Err(LibraryError::ReservedNode(_))
        ));
    }

    #[test]
    fn test_tags() {
        let (mut lib, _) = library();
        let node = lib.add_text_node(&NodeId::master(), "tagged").unwrap();
        let tag = lib.create_tag("Important");

        assert!(lib.append_tag(&node, &tag).unwrap());
        assert!(!lib.append_tag(&node, &tag).unwrap());
        assert_eq!(lib.get_node(&node).unwrap().node().tags, vec![tag.clone()]);
        assert_eq!(lib.find_tag("important").unwrap().id, tag);
        assert_eq!(lib.nodes_with_tag(&tag).count(), 1);

        assert!(matches!(
            lib.append_tag(&node, &TagId::from("nope")),
            Err(LibraryError::TagNotFound(_))
        ));

        assert_eq!(lib.delete_tag(&tag).unwrap(), 1);
        assert!(lib.get_node(&node).unwrap().node().tags.is_empty());
        assert!(lib.find_tag("important").is_none());
    }

    #[test]
    fn test_find_or_create_tag_reuses() {
        let (mut lib, _) = library();
        let first = lib.find_or_create_tag("work");
        let second = lib.find_or_create_tag("WORK");
        assert_eq!(first, second);
        assert_eq!(lib.tags().len(), 1);
    }

    #[test]
    fn test_touch_file() {
        let (mut lib, clock) = library();
        let txt = file(&clock, "text/plain");
        let id = txt.id.clone();
        lib.add_file(txt);
        clock.advance(99);
        assert_eq!(lib.touch_file(&id).unwrap().accessed.as_millis(), 1_099);
        assert!(lib.touch_file(&FileId::from("x")).is_err());
    }

    #[test]
    fn test_indent_reports_invalid_move() {
        let (mut lib, _) = library();
        let a = lib.add_text_node(&NodeId::master(), "a").unwrap();
        assert_eq!(
            lib.indent_node(&a).unwrap_err(),
            LibraryError::InvalidMove {
                node: a.clone(),
                reason: InvalidMoveReason::NoPreviousSibling
            }
        );
    }
}
