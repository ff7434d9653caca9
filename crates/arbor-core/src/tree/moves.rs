//! Validated structural moves
//!
//! `move_node_before` checks every precondition before touching the forest, then
//! splices the node and renumbers only the span of nodes whose pre-order position
//! actually changed.

use super::Forest;
use crate::error::{InvalidMoveReason, LibraryError, LibraryResult};
use crate::models::NodeId;

impl Forest {
    /// Check that `id` may become a child of `new_parent`, placed before `reference`
    fn validate_move(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        reference: Option<&NodeId>,
    ) -> LibraryResult<()> {
        let entry = self.get(id)?;
        self.get(new_parent)?;

        if id.is_reserved() {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::ReservedRoot));
        }
        if id == new_parent {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::SelfParent));
        }
        if self.is_ancestor(id, new_parent) {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::IntoDescendant));
        }
        if let Some(reference) = reference {
            let reference_entry = self.get(reference)?;
            if reference_entry.parent.as_ref() != Some(new_parent) {
                return Err(LibraryError::invalid_move(
                    id,
                    InvalidMoveReason::ReferenceNotChild,
                ));
            }
        }
        self.check_directory_name(new_parent, &entry.node.content, Some(id))
    }

    /// Make `id` a child of `new_parent`, directly before `reference` or last
    ///
    /// Moving forward in pre-order, the nodes between the old subtree and the
    /// target slide down to fill the gap; moving backward, the nodes between the
    /// target and the old position slide up. Only that span is renumbered.
    pub fn move_node_before(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        reference: Option<&NodeId>,
    ) -> LibraryResult<()> {
        self.validate_move(id, new_parent, reference)?;
        self.splice_before(id, new_parent, reference)
    }

    /// Relink an already validated move and renumber the affected span
    fn splice_before(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        reference: Option<&NodeId>,
    ) -> LibraryResult<()> {
        if reference == Some(id) {
            return Ok(());
        }

        let old_index = self.get(id)?.index;
        let old_after = self.next_after_subtree(id);
        let (target_index, target_node) = match reference {
            Some(reference) => (self.get(reference)?.index, Some(reference.clone())),
            None => {
                let last = self.last_descendant(new_parent);
                (self.get(&last)?.index + 1, self.next_after_subtree(new_parent))
            }
        };

        // Splice
        if let Some(old_parent) = self.get(id)?.parent.clone() {
            self.get_mut(&old_parent)?.children.retain(|child| child != id);
        }
        let position = match reference {
            Some(reference) => self
                .get(new_parent)?
                .children
                .iter()
                .position(|child| child == reference)
                .ok_or_else(|| LibraryError::invalid_move(id, InvalidMoveReason::ReferenceNotChild))?,
            None => self.get(new_parent)?.children.len(),
        };
        self.get_mut(new_parent)?.children.insert(position, id.clone());

        let depth = self.get(new_parent)?.depth + 1;
        self.update_parent(id, Some(new_parent.clone()));
        self.update_depth(id, depth);

        let (begin, end) = if target_index > old_index {
            (old_after, target_node)
        } else if target_index < old_index {
            (Some(id.clone()), old_after)
        } else {
            return Ok(());
        };

        let base = begin
            .as_ref()
            .and_then(|b| self.prev_index_node(b))
            .and_then(|p| self.entries.get(&p).map(|e| e.index + 1))
            .unwrap_or(0);
        self.update_index(begin, end.as_ref(), base);
        Ok(())
    }

    /// Exchange the pre-order positions of two nodes
    pub fn swap_index(&mut self, a: &NodeId, b: &NodeId) -> LibraryResult<()> {
        self.get(a)?;
        self.get(b)?;
        if a == b {
            return Ok(());
        }

        if self.next_index_node(a).as_ref() == Some(b) {
            let parent = self.parent_for_move(a)?;
            return self.move_node_before(b, &parent, Some(a));
        }
        if self.next_index_node(b).as_ref() == Some(a) {
            let parent = self.parent_for_move(b)?;
            return self.move_node_before(a, &parent, Some(b));
        }

        // Adjacent siblings with children: one move puts b in front of a
        if self.next_sibling(a) == Some(b) {
            let parent = self.parent_for_move(a)?;
            return self.move_node_before(b, &parent, Some(a));
        }
        if self.next_sibling(b) == Some(a) {
            let parent = self.parent_for_move(b)?;
            return self.move_node_before(a, &parent, Some(b));
        }

        let a_parent = self.parent_for_move(a)?;
        let b_parent = self.parent_for_move(b)?;
        let a_next = self.next_sibling(a).cloned();

        // Check both halves before relinking anything
        self.validate_swap_side(a, &b_parent, b)?;
        self.validate_swap_side(b, &a_parent, a)?;

        self.splice_before(a, &b_parent, Some(b))?;
        self.splice_before(b, &a_parent, a_next.as_ref())
    }

    /// Check that `id` may take the place of `other` under `new_parent`
    ///
    /// `other` leaves `new_parent` during the swap, so its name does not collide.
    fn validate_swap_side(&self, id: &NodeId, new_parent: &NodeId, other: &NodeId) -> LibraryResult<()> {
        if id == new_parent {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::SelfParent));
        }
        if self.is_ancestor(id, new_parent) {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::IntoDescendant));
        }
        let Some(name) = self.get(id)?.node.content.directory_name() else {
            return Ok(());
        };
        match self.find_child_directory(new_parent, name)? {
            Some(existing) if existing != id && existing != other => Err(LibraryError::DuplicateName {
                parent: new_parent.clone(),
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Move `id` under its previous sibling, as that sibling's last child
    pub fn indent_node(&mut self, id: &NodeId) -> LibraryResult<()> {
        self.get(id)?;
        if id.is_reserved() {
            return Err(LibraryError::invalid_move(id, InvalidMoveReason::ReservedRoot));
        }
        let previous = self
            .previous_sibling(id)
            .cloned()
            .ok_or_else(|| LibraryError::invalid_move(id, InvalidMoveReason::NoPreviousSibling))?;
        self.move_node_before(id, &previous, None)
    }

    /// Move `id` out of its parent, right after that parent
    pub fn outdent_node(&mut self, id: &NodeId) -> LibraryResult<()> {
        let parent = self.parent_for_move(id)?;
        let grandparent = self
            .get(&parent)?
            .parent
            .clone()
            .ok_or_else(|| LibraryError::invalid_move(id, InvalidMoveReason::AlreadyTopLevel))?;
        let after_parent = self.next_sibling(&parent).cloned();
        self.move_node_before(id, &grandparent, after_parent.as_ref())
    }

    fn parent_for_move(&self, id: &NodeId) -> LibraryResult<NodeId> {
        self.get(id)?
            .parent
            .clone()
            .ok_or_else(|| LibraryError::invalid_move(id, InvalidMoveReason::ReservedRoot))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn sample() -> Forest {
        // master: A [A1, A2 [A2a]], B, C ; trash: T
        let mut forest = Forest::new(ts());
        forest.add_node(&NodeId::master(), text("A")).unwrap();
        forest.add_node(&n("A"), text("A1")).unwrap();
        forest.add_node(&n("A"), text("A2")).unwrap();
        forest.add_node(&n("A2"), text("A2a")).unwrap();
        forest.add_node(&NodeId::master(), text("B")).unwrap();
        forest.add_node(&NodeId::master(), text("C")).unwrap();
        forest.add_node(&NodeId::trash(), text("T")).unwrap();
        forest
    }

    fn order(forest: &Forest) -> Vec<String> {
        forest.visit().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_move_to_end_keeps_depth() {
        let mut forest = Forest::new(ts());
        forest.add_node(&NodeId::master(), text("A")).unwrap();
        forest.add_node(&NodeId::master(), text("B")).unwrap();

        forest.move_node_before(&n("A"), &NodeId::master(), None).unwrap();

        assert_eq!(ids(&forest, "master"), vec!["B", "A"]);
        assert_eq!(
            forest.get(&n("A")).unwrap().depth(),
            forest.get(&n("B")).unwrap().depth()
        );
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_forward_with_subtree() {
        let mut forest = sample();
        forest.move_node_before(&n("A"), &NodeId::master(), Some(&n("C"))).unwrap();
        assert_eq!(
            order(&forest),
            vec!["master", "B", "A", "A1", "A2", "A2a", "C", "trash", "T"]
        );
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_backward_into_other_parent() {
        let mut forest = sample();
        forest.move_node_before(&n("C"), &n("A2"), Some(&n("A2a"))).unwrap();
        assert_eq!(
            order(&forest),
            vec!["master", "A", "A1", "A2", "C", "A2a", "B", "trash", "T"]
        );
        assert_eq!(forest.get(&n("C")).unwrap().depth(), 3);
        assert_eq!(forest.get(&n("C")).unwrap().parent(), Some(&n("A2")));
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_across_roots() {
        let mut forest = sample();
        forest.move_node_before(&n("A2"), &NodeId::trash(), None).unwrap();
        assert_eq!(
            order(&forest),
            vec!["master", "A", "A1", "B", "C", "trash", "T", "A2", "A2a"]
        );
        assert_consistent(&forest);

        forest.move_node_before(&n("A2"), &NodeId::master(), Some(&n("A"))).unwrap();
        assert_eq!(
            order(&forest),
            vec!["master", "A2", "A2a", "A", "A1", "B", "C", "trash", "T"]
        );
        assert_eq!(forest.get(&n("A2a")).unwrap().depth(), 2);
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_into_ancestor_end_is_stable() {
        let mut forest = sample();
        // A2 is already A's last subtree, so nothing is renumbered
        forest.move_node_before(&n("A2"), &n("A"), None).unwrap();
        assert_eq!(ids(&forest, "A"), vec!["A1", "A2"]);
        forest.move_node_before(&n("A2a"), &n("A"), None).unwrap();
        assert_eq!(ids(&forest, "A"), vec!["A1", "A2", "A2a"]);
        assert_eq!(forest.get(&n("A2a")).unwrap().depth(), 2);
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_before_itself_is_noop() {
        let mut forest = sample();
        let before = order(&forest);
        forest.move_node_before(&n("B"), &NodeId::master(), Some(&n("B"))).unwrap();
        assert_eq!(order(&forest), before);
        assert_consistent(&forest);
    }

    #[test]
    fn test_invalid_moves() {
        let mut forest = sample();

        let err = forest.move_node_before(&n("A"), &n("A"), None).unwrap_err();
        assert_eq!(err, LibraryError::invalid_move(&n("A"), InvalidMoveReason::SelfParent));

        let err = forest.move_node_before(&n("A"), &n("A2a"), None).unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("A"), InvalidMoveReason::IntoDescendant)
        );

        let err = forest
            .move_node_before(&n("B"), &n("A"), Some(&n("C")))
            .unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("B"), InvalidMoveReason::ReferenceNotChild)
        );

        let err = forest
            .move_node_before(&NodeId::trash(), &NodeId::master(), None)
            .unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&NodeId::trash(), InvalidMoveReason::ReservedRoot)
        );

        assert!(matches!(
            forest.move_node_before(&n("ghost"), &NodeId::master(), None),
            Err(LibraryError::NotFound(_))
        ));
        assert_consistent(&forest);
    }

    #[test]
    fn test_move_directory_name_collision() {
        let mut forest = Forest::new(ts());
        forest.add_node(&NodeId::master(), dir("d1", "Notes")).unwrap();
        forest.add_node(&NodeId::trash(), dir("d2", "NOTES")).unwrap();

        let err = forest.move_node_before(&n("d2"), &NodeId::master(), None).unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateName { .. }));

        // Reordering among its own siblings does not collide with itself
        forest.add_node(&NodeId::master(), text("x")).unwrap();
        forest.move_node_before(&n("d1"), &NodeId::master(), None).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["x", "d1"]);
        assert_consistent(&forest);
    }

    #[test]
    fn test_swap_adjacent() {
        let mut forest = sample();
        forest.swap_index(&n("B"), &n("C")).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["A", "C", "B"]);
        forest.swap_index(&n("B"), &n("C")).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["A", "B", "C"]);
        assert_consistent(&forest);
    }

    #[test]
    fn test_swap_adjacent_siblings_with_children() {
        let mut forest = sample();
        forest.swap_index(&n("A"), &n("B")).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["B", "A", "C"]);
        assert_consistent(&forest);
    }

    #[test]
    fn test_swap_distant() {
        let mut forest = sample();
        forest.swap_index(&n("A1"), &n("C")).unwrap();
        assert_eq!(ids(&forest, "A"), vec!["C", "A2"]);
        assert_eq!(ids(&forest, "master"), vec!["A", "B", "A1"]);
        assert_consistent(&forest);
    }

    #[test]
    fn test_failed_swap_changes_nothing() {
        let mut forest = sample();
        let before = order(&forest);

        // A would have to move under its own descendant A2
        let err = forest.swap_index(&n("A2a"), &n("A")).unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("A"), InvalidMoveReason::IntoDescendant)
        );
        assert_eq!(order(&forest), before);

        let err = forest.swap_index(&n("A"), &n("A2a")).unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("A"), InvalidMoveReason::IntoDescendant)
        );
        assert_eq!(order(&forest), before);
        assert_consistent(&forest);
    }

    #[test]
    fn test_failed_swap_on_name_collision_changes_nothing() {
        let mut forest = Forest::new(ts());
        forest.add_node(&NodeId::master(), dir("d1", "Notes")).unwrap();
        forest.add_node(&NodeId::master(), text("x")).unwrap();
        forest.add_node(&NodeId::master(), text("y")).unwrap();
        forest.add_node(&NodeId::trash(), text("t")).unwrap();
        forest.add_node(&NodeId::trash(), dir("d2", "notes")).unwrap();
        let before = order(&forest);

        // d2 would land next to d1 in Master
        let err = forest.swap_index(&n("d2"), &n("x")).unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateName { .. }));
        assert_eq!(order(&forest), before);

        let err = forest.swap_index(&n("y"), &n("d2")).unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateName { .. }));
        assert_eq!(order(&forest), before);
        assert_consistent(&forest);
    }

    #[test]
    fn test_swap_directories_with_matching_names_across_parents() {
        let mut forest = Forest::new(ts());
        forest.add_node(&NodeId::master(), dir("d1", "Notes")).unwrap();
        forest.add_node(&NodeId::master(), text("x")).unwrap();
        forest.add_node(&NodeId::trash(), text("t")).unwrap();
        forest.add_node(&NodeId::trash(), dir("d2", "NOTES")).unwrap();

        forest.swap_index(&n("d1"), &n("d2")).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["d2", "x"]);
        assert_eq!(ids(&forest, "trash"), vec!["t", "d1"]);
        assert_consistent(&forest);
    }

    #[test]
    fn test_indent_and_outdent() {
        let mut forest = sample();
        forest.indent_node(&n("B")).unwrap();
        assert_eq!(ids(&forest, "A"), vec!["A1", "A2", "B"]);
        assert_eq!(forest.get(&n("B")).unwrap().depth(), 2);
        assert_consistent(&forest);

        forest.outdent_node(&n("B")).unwrap();
        assert_eq!(ids(&forest, "master"), vec!["A", "B", "C"]);
        assert_consistent(&forest);

        let err = forest.indent_node(&n("A1")).unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("A1"), InvalidMoveReason::NoPreviousSibling)
        );
        let err = forest.outdent_node(&n("A")).unwrap_err();
        assert_eq!(
            err,
            LibraryError::invalid_move(&n("A"), InvalidMoveReason::AlreadyTopLevel)
        );
    }

    /// Small deterministic generator so the sequence is reproducible
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound
        }
    }

    #[test]
    fn test_random_operation_sequences_keep_invariants() {
        const NAMES: &[&str] = &["a", "A", "b", "B", "c"];

        for seed in 1..=20u64 {
            let mut rng = Lcg(seed);
            let mut forest = Forest::new(ts());
            let mut counter = 0;

            for _ in 0..150 {
                let all: Vec<NodeId> = forest.visit().map(|e| e.id().clone()).collect();
                let pick = |rng: &mut Lcg| all[rng.next(all.len())].clone();

                match rng.next(12) {
                    0..=2 => {
                        counter += 1;
                        let parent = pick(&mut rng);
                        forest.add_node(&parent, text(&format!("n{counter}"))).unwrap();
                    }
                    3..=4 => {
                        counter += 1;
                        let parent = pick(&mut rng);
                        let name = NAMES[rng.next(NAMES.len())];
                        let taken = forest.find_child_directory(&parent, name).unwrap().is_some();
                        let before = order(&forest);
                        let result = forest.add_node(&parent, dir(&format!("d{counter}"), name));
                        if taken {
                            assert!(
                                matches!(result, Err(LibraryError::DuplicateName { .. })),
                                "seed {seed}: directory {name} under {parent}"
                            );
                            assert_eq!(order(&forest), before);
                        } else {
                            assert!(result.is_ok(), "seed {seed}: directory {name} under {parent}");
                        }
                    }
                    5..=7 => {
                        let node = pick(&mut rng);
                        let parent = pick(&mut rng);
                        let children = forest.get(&parent).unwrap().children().to_vec();
                        let reference = if children.is_empty() || rng.next(3) == 0 {
                            None
                        } else {
                            Some(children[rng.next(children.len())].clone())
                        };
                        let collides = forest
                            .get(&node)
                            .unwrap()
                            .content()
                            .directory_name()
                            .and_then(|name| forest.find_child_directory(&parent, name).unwrap())
                            .is_some_and(|existing| *existing != node);
                        let legal = !node.is_reserved()
                            && node != parent
                            && !forest.is_ancestor(&node, &parent)
                            && !collides;
                        let before = order(&forest);
                        let result = forest.move_node_before(&node, &parent, reference.as_ref());
                        assert_eq!(result.is_ok(), legal, "seed {seed}: move {node} -> {parent}");
                        if result.is_err() {
                            assert_eq!(order(&forest), before);
                        }
                    }
                    8..=9 => {
                        let a = pick(&mut rng);
                        let b = pick(&mut rng);
                        let before = order(&forest);
                        if forest.swap_index(&a, &b).is_err() {
                            assert_eq!(order(&forest), before, "seed {seed}: failed swap {a} <-> {b}");
                        }
                    }
                    _ => {
                        let node = pick(&mut rng);
                        if !node.is_reserved() {
                            let size = forest.subtree_size(&node).unwrap();
                            let len = forest.len();
                            forest.remove_node(&node).unwrap();
                            assert_eq!(forest.len(), len - size);
                        }
                    }
                }
                assert_consistent(&forest);
            }
        }
    }
}
