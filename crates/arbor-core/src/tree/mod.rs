//! Node forest
//!
//! The forest is an arena keyed by `NodeId`. Each entry stores its parent id and
//! ordered child ids as plain data, plus the memoized pre-order `index` and
//! `depth`. Two reserved directory roots, Master and Trash, always exist; Master's
//! subtree precedes Trash's in pre-order.
//!
//! ## Invariants
//!
//! - `index` over the whole forest is a dense permutation of `[0, len)` matching
//!   pre-order (children in order, Master before Trash).
//! - `depth(child) == depth(parent) + 1`, roots are at depth 0.
//! - `parent(child)` is the entry whose `children` lists the child.
//! - No entry is its own ancestor.
//! - Sibling directories have case-insensitively unique names.
//!
//! Mutations patch `index`/`depth` over the affected span only (see `ordering`
//! and `moves`). Removal shifts every later index, which is O(N).

mod moves;
mod ordering;

use std::collections::HashMap;

use crate::error::{LibraryError, LibraryResult};
use crate::models::{Node, NodeContent, NodeId};
use crate::timestamp::Timestamp;

/// A node together with its position in the forest
#[derive(Debug, Clone)]
pub struct TreeNode {
    node: Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    index: usize,
    depth: usize,
}

impl TreeNode {
    fn detached(node: Node) -> Self {
        Self {
            node,
            parent: None,
            children: Vec::new(),
            index: 0,
            depth: 0,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    /// Persisted fields
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn content(&self) -> &NodeContent {
        &self.node.content
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Global pre-order position
    pub fn index(&self) -> usize {
        self.index
    }

    /// Distance from the root
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// The two-rooted forest of nodes
#[derive(Debug, Clone)]
pub struct Forest {
    entries: HashMap<NodeId, TreeNode>,
    roots: [NodeId; 2],
}

impl Forest {
    /// Create a forest holding only empty Master and Trash directories
    pub fn new(now: Timestamp) -> Self {
        let mut forest = Self {
            entries: HashMap::new(),
            roots: [NodeId::master(), NodeId::trash()],
        };
        for id in [NodeId::master(), NodeId::trash()] {
            let root = Node::with_id(id.clone(), NodeContent::Directory { name: None }, now);
            forest.entries.insert(id, TreeNode::detached(root));
        }
        forest.rebuild();
        forest
    }

    /// Assemble a forest from loaded nodes
    ///
    /// `nodes` lists `(node, parent)` pairs in pre-order with children in their
    /// stored order; the caller guarantees the reserved roots come first in their
    /// own subtrees. Structure is then recomputed by a full walk.
    pub(crate) fn from_preorder(
        master: Node,
        trash: Node,
        nodes: Vec<(Node, NodeId)>,
    ) -> Result<Self, NodeId> {
        let mut forest = Self {
            entries: HashMap::new(),
            roots: [NodeId::master(), NodeId::trash()],
        };
        forest.entries.insert(master.id.clone(), TreeNode::detached(master));
        forest.entries.insert(trash.id.clone(), TreeNode::detached(trash));

        for (node, parent) in nodes {
            let id = node.id.clone();
            if forest.entries.contains_key(&id) {
                return Err(id);
            }
            match forest.entries.get_mut(&parent) {
                Some(entry) => entry.children.push(id.clone()),
                None => return Err(parent),
            }
            let mut entry = TreeNode::detached(node);
            entry.parent = Some(parent);
            forest.entries.insert(id, entry);
        }

        forest.rebuild();
        Ok(forest)
    }

    /// Number of nodes, roots included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up a node, failing with `NotFound`
    pub fn get(&self, id: &NodeId) -> LibraryResult<&TreeNode> {
        self.entries
            .get(id)
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> LibraryResult<&mut TreeNode> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| LibraryError::NotFound(id.clone()))
    }

    /// Mutable access to a node's persisted fields
    pub(crate) fn node_mut(&mut self, id: &NodeId) -> LibraryResult<&mut Node> {
        self.get_mut(id).map(|entry| &mut entry.node)
    }

    /// Pre-order traversal of the whole forest
    pub fn visit(&self) -> Visit<'_> {
        Visit::new(self, self.roots.iter().rev().cloned().collect())
    }

    /// Pre-order traversal of one subtree, starting with `id` itself
    pub fn visit_from(&self, id: &NodeId) -> LibraryResult<Visit<'_>> {
        self.get(id)?;
        Ok(Visit::new(self, vec![id.clone()]))
    }

    /// Number of nodes in the subtree rooted at `id`
    pub fn subtree_size(&self, id: &NodeId) -> LibraryResult<usize> {
        Ok(self.visit_from(id)?.count())
    }

    /// Whether `ancestor` lies strictly above `id`
    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut current = self.entries.get(id).and_then(|e| e.parent.as_ref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.entries.get(parent).and_then(|e| e.parent.as_ref());
        }
        false
    }

    /// Root of the tree containing `id`
    pub fn root_of(&self, id: &NodeId) -> LibraryResult<&NodeId> {
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent.as_ref() {
            current = self.get(parent)?;
        }
        Ok(current.id())
    }

    /// Child directory of `parent` whose name matches case-insensitively
    pub fn find_child_directory(&self, parent: &NodeId, name: &str) -> LibraryResult<Option<&NodeId>> {
        let parent = self.get(parent)?;
        Ok(parent.children.iter().find(|child| {
            self.entries
                .get(*child)
                .and_then(|entry| entry.node.content.directory_name())
                .is_some_and(|existing| names_match(existing, name))
        }))
    }

    /// Reject `content` under `parent` if it is a directory whose name a sibling
    /// directory already uses; `moving` is ignored as a sibling
    pub(crate) fn check_directory_name(
        &self,
        parent: &NodeId,
        content: &NodeContent,
        moving: Option<&NodeId>,
    ) -> LibraryResult<()> {
        let Some(name) = content.directory_name() else {
            return Ok(());
        };
        match self.find_child_directory(parent, name)? {
            Some(existing) if Some(existing) != moving => Err(LibraryError::DuplicateName {
                parent: parent.clone(),
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Append `node` as the last child of `parent`
    ///
    /// The new node's index follows its pre-order predecessor (the parent's
    /// previous last descendant) and every later node moves up by one.
    pub fn add_node(&mut self, parent: &NodeId, node: Node) -> LibraryResult<NodeId> {
        let parent_entry = self.get(parent)?;
        self.check_directory_name(parent, &node.content, None)?;

        let predecessor = self.last_descendant(parent);
        let index = self.get(&predecessor)?.index + 1;
        let depth = parent_entry.depth + 1;

        let id = node.id.clone();
        debug_assert!(!self.entries.contains_key(&id), "duplicate node id {id}");

        let mut entry = TreeNode::detached(node);
        entry.parent = Some(parent.clone());
        entry.index = index;
        entry.depth = depth;
        self.entries.insert(id.clone(), entry);
        self.get_mut(parent)?.children.push(id.clone());

        self.update_index(Some(id.clone()), None, index);
        Ok(id)
    }

    /// Detach and drop the subtree rooted at `id`
    ///
    /// Returns the removed nodes in pre-order.
    pub fn remove_node(&mut self, id: &NodeId) -> LibraryResult<Vec<Node>> {
        if id.is_reserved() {
            return Err(LibraryError::ReservedNode(id.clone()));
        }
        let removed_index = self.get(id)?.index;
        let removed_ids: Vec<NodeId> = self.visit_from(id)?.map(|e| e.id().clone()).collect();
        let count = removed_ids.len();

        if let Some(parent) = self.get(id)?.parent.clone() {
            self.get_mut(&parent)?.children.retain(|child| child != id);
        }

        let removed = removed_ids
            .iter()
            .filter_map(|removed_id| self.entries.remove(removed_id))
            .map(|entry| entry.node)
            .collect();

        for entry in self.entries.values_mut() {
            if entry.index > removed_index {
                entry.index -= count;
            }
        }

        Ok(removed)
    }

    /// Last node of `id`'s subtree in pre-order (`id` itself for a leaf)
    pub fn last_descendant(&self, id: &NodeId) -> NodeId {
        let mut current = id;
        while let Some(last) = self.entries.get(current).and_then(|e| e.children.last()) {
            current = last;
        }
        current.clone()
    }

    /// Ids sharing `id`'s parent (the root list for roots)
    fn siblings(&self, id: &NodeId) -> &[NodeId] {
        match self.entries.get(id).and_then(|e| e.parent.as_ref()) {
            Some(parent) => self
                .entries
                .get(parent)
                .map(|p| p.children.as_slice())
                .unwrap_or(&[]),
            None => &self.roots,
        }
    }

    pub fn next_sibling(&self, id: &NodeId) -> Option<&NodeId> {
        let siblings = self.siblings(id);
        let pos = siblings.iter().position(|s| s == id)?;
        siblings.get(pos + 1)
    }

    pub fn previous_sibling(&self, id: &NodeId) -> Option<&NodeId> {
        let siblings = self.siblings(id);
        let pos = siblings.iter().position(|s| s == id)?;
        pos.checked_sub(1).and_then(|p| siblings.get(p))
    }

    /// Entries that satisfy `predicate`, in pre-order
    pub fn filter<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a TreeNode> + 'a
    where
        P: Fn(&TreeNode) -> bool + 'a,
    {
        self.visit().filter(move |entry| predicate(entry))
    }
}

/// Case-insensitive directory name comparison
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Lazy pre-order traversal
///
/// Borrows the forest, so the forest cannot change while a traversal is alive:
/// every `Visit` sees one consistent snapshot. Clone it to restart from the same
/// position, or call `visit` again to start over.
#[derive(Debug, Clone)]
pub struct Visit<'a> {
    forest: &'a Forest,
    stack: Vec<NodeId>,
}

impl<'a> Visit<'a> {
    fn new(forest: &'a Forest, stack: Vec<NodeId>) -> Self {
        Self { forest, stack }
    }
}

impl<'a> Iterator for Visit<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(entry) = self.forest.entries.get(&id) {
                self.stack.extend(entry.children.iter().rev().cloned());
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Assert every structural invariant of the forest
    pub(crate) fn assert_consistent(forest: &Forest) {
        let order: Vec<&TreeNode> = forest.visit().collect();
        assert_eq!(order.len(), forest.len(), "traversal must reach every node");

        for (position, entry) in order.iter().enumerate() {
            assert_eq!(entry.index(), position, "index of {} is not dense pre-order", entry.id());
        }

        for root in forest.roots() {
            let entry = forest.get(root).unwrap();
            assert!(entry.parent().is_none());
            assert_eq!(entry.depth(), 0);
        }

        for entry in &order {
            for child in entry.children() {
                let child_entry = forest.get(child).unwrap();
                assert_eq!(child_entry.parent(), Some(entry.id()));
                assert_eq!(child_entry.depth(), entry.depth() + 1);
            }
            if let Some(parent) = entry.parent() {
                let owners = order
                    .iter()
                    .filter(|other| other.children().contains(entry.id()))
                    .count();
                assert_eq!(owners, 1, "{} must have exactly one owner", entry.id());
                assert!(forest.get(parent).unwrap().children().contains(entry.id()));
            }
            assert!(!forest.is_ancestor(entry.id(), entry.id()));

            let mut names: Vec<String> = entry
                .children()
                .iter()
                .filter_map(|c| forest.get(c).unwrap().content().directory_name())
                .map(str::to_lowercase)
                .collect();
            let before = names.len();
            names.sort();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate directory names under {}", entry.id());
        }
    }

    pub(crate) fn ts() -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000).unwrap()
    }

    pub(crate) fn text(label: &str) -> Node {
        Node::with_id(
            NodeId::from(label),
            NodeContent::Text {
                content: label.into(),
            },
            ts(),
        )
    }

    pub(crate) fn dir(id: &str, name: &str) -> Node {
        Node::with_id(
            NodeId::from(id),
            NodeContent::Directory {
                name: Some(name.to_string()),
            },
            ts(),
        )
    }

    pub(crate) fn ids(forest: &Forest, parent: &str) -> Vec<String> {
        forest
            .get(&NodeId::from(parent))
            .unwrap()
            .children()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    pub(crate) fn index_of(forest: &Forest, id: &str) -> usize {
        forest.get(&NodeId::from(id)).unwrap().index()
    }
}
