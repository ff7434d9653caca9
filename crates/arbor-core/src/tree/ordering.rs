//! Pre-order index and depth maintenance
//!
//! The forest is threaded in pre-order: a node's successor is its first child,
//! or else the next sibling of the nearest ancestor-or-self that has one. Index
//! patches walk this order over a bounded span instead of renumbering everything.

use super::Forest;
use crate::models::NodeId;

impl Forest {
    /// Successor of `id` in pre-order, `None` at the end of the forest
    pub fn next_index_node(&self, id: &NodeId) -> Option<NodeId> {
        let entry = self.entries.get(id)?;
        if let Some(first) = entry.children.first() {
            return Some(first.clone());
        }
        self.next_after_subtree(id)
    }

    /// First node after `id`'s whole subtree in pre-order
    pub fn next_after_subtree(&self, id: &NodeId) -> Option<NodeId> {
        let mut current = id.clone();
        loop {
            if let Some(sibling) = self.next_sibling(&current) {
                return Some(sibling.clone());
            }
            current = self.entries.get(&current)?.parent.clone()?;
        }
    }

    /// Predecessor of `id` in pre-order, `None` for the first root
    pub fn prev_index_node(&self, id: &NodeId) -> Option<NodeId> {
        if let Some(sibling) = self.previous_sibling(id) {
            return Some(self.last_descendant(sibling));
        }
        self.entries.get(id)?.parent.clone()
    }

    /// Assign `base, base + 1, ...` walking successors from `begin` up to but
    /// excluding `end` (or to the end of the forest)
    pub(crate) fn update_index(&mut self, begin: Option<NodeId>, end: Option<&NodeId>, base: usize) {
        let mut current = begin;
        let mut index = base;
        while let Some(id) = current {
            if Some(&id) == end {
                break;
            }
            match self.entries.get_mut(&id) {
                Some(entry) => entry.index = index,
                None => break,
            }
            index += 1;
            current = self.next_index_node(&id);
        }
    }

    /// Set `id` to `depth` and its descendants to `depth + 1, depth + 2, ...`
    pub(crate) fn update_depth(&mut self, id: &NodeId, depth: usize) {
        let mut pending = vec![(id.clone(), depth)];
        while let Some((current, depth)) = pending.pop() {
            if let Some(entry) = self.entries.get_mut(&current) {
                entry.depth = depth;
                pending.extend(entry.children.iter().map(|c| (c.clone(), depth + 1)));
            }
        }
    }

    /// Point `id` at `parent` and re-assert back references through its subtree
    pub(crate) fn update_parent(&mut self, id: &NodeId, parent: Option<NodeId>) {
        let mut pending = vec![(id.clone(), parent)];
        while let Some((current, parent)) = pending.pop() {
            if let Some(entry) = self.entries.get_mut(&current) {
                entry.parent = parent;
                pending.extend(
                    entry
                        .children
                        .iter()
                        .map(|c| (c.clone(), Some(current.clone()))),
                );
            }
        }
    }

    /// Recompute parent, index and depth of every node from the tree shape
    pub(crate) fn rebuild(&mut self) {
        let mut index = 0;
        let mut pending: Vec<(NodeId, Option<NodeId>, usize)> = self
            .roots
            .iter()
            .rev()
            .map(|root| (root.clone(), None, 0))
            .collect();

        while let Some((id, parent, depth)) = pending.pop() {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            entry.parent = parent;
            entry.depth = depth;
            entry.index = index;
            index += 1;
            pending.extend(
                entry
                    .children
                    .iter()
                    .rev()
                    .map(|c| (c.clone(), Some(id.clone()), depth + 1)),
            );
        }
    }
}
