//! Slash-separated directory paths
//!
//! Paths are rooted at Master: `/` is Master itself and `/a/b` is directory `b`
//! inside `a`. Nodes under Trash render as `Trash/...`. Segments match directory
//! names case-insensitively.

use tracing::debug;

use super::Library;
use crate::error::LibraryResult;
use crate::models::{NodeContent, NodeId};

/// Label used for the Trash root in rendered paths
pub const TRASH_LABEL: &str = "Trash";

impl Library {
    /// Walk `path` from Master, creating missing directories; returns the leaf id
    ///
    /// Empty segments are ignored, so `/`, `` and `//` all resolve to Master.
    pub fn create_directory(&mut self, path: &str) -> LibraryResult<NodeId> {
        let mut current = NodeId::master();
        for segment in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            let existing = self.forest.find_child_directory(&current, segment)?.cloned();
            current = match existing {
                Some(id) => id,
                None => {
                    debug!("Creating directory '{}' under {}", segment, current);
                    self.add_directory(&current, Some(segment))?
                }
            };
        }
        Ok(current)
    }

    /// Directory at `path` under Master, without creating anything
    pub fn resolve_path(&self, path: &str) -> LibraryResult<Option<NodeId>> {
        let mut current = NodeId::master();
        for segment in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            match self.forest.find_child_directory(&current, segment)? {
                Some(id) => current = id.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Render the path of `id`
    ///
    /// Named directories contribute their name, anything else its id.
    pub fn get_path(&self, id: &NodeId) -> LibraryResult<String> {
        let mut segments = Vec::new();
        let mut current = self.forest.get(id)?;
        while let Some(parent) = current.parent() {
            let segment = match current.content() {
                NodeContent::Directory { name: Some(name) } => name.clone(),
                _ => current.id().to_string(),
            };
            segments.push(segment);
            current = self.forest.get(parent)?;
        }
        segments.reverse();

        let rendered = if current.id().as_str() == NodeId::TRASH {
            std::iter::once(TRASH_LABEL.to_string())
                .chain(segments)
                .collect::<Vec<_>>()
                .join("/")
        } else {
            format!("/{}", segments.join("/"))
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::tree::testing::assert_consistent;

    fn library() -> Library {
        Library::new(Arc::new(ManualClock::new(0)))
    }

    #[test]
    fn test_create_directory_builds_missing_segments() {
        let mut lib = library();
        let leaf = lib.create_directory("/projects/arbor/notes").unwrap();
        assert_eq!(lib.get_path(&leaf).unwrap(), "/projects/arbor/notes");
        assert_eq!(lib.len(), 5);
        assert_consistent(lib.forest());
    }

    #[test]
    fn test_create_directory_reuses_existing_case_insensitively() {
        let mut lib = library();
        let first = lib.create_directory("/Projects/Arbor").unwrap();
        let second = lib.create_directory("projects//ARBOR/").unwrap();
        assert_eq!(first, second);
        assert_eq!(lib.len(), 4);
    }

    #[test]
    fn test_root_paths() {
        let mut lib = library();
        assert_eq!(lib.create_directory("/").unwrap(), NodeId::master());
        assert_eq!(lib.get_path(&NodeId::master()).unwrap(), "/");
        assert_eq!(lib.get_path(&NodeId::trash()).unwrap(), "Trash");
    }

    #[test]
    fn test_paths_under_trash_and_non_directories() {
        let mut lib = library();
        let dir = lib.create_directory("/old").unwrap();
        let note = lib.add_text_node(&dir, "note").unwrap();
        lib.trash_node(&dir).unwrap();

        assert_eq!(lib.get_path(&dir).unwrap(), "Trash/old");
        assert_eq!(lib.get_path(&note).unwrap(), format!("Trash/old/{note}"));
    }

    #[test]
    fn test_resolve_path() {
        let mut lib = library();
        let leaf = lib.create_directory("/a/b").unwrap();
        assert_eq!(lib.resolve_path("/A/B").unwrap(), Some(leaf));
        assert_eq!(lib.resolve_path("/a/c").unwrap(), None);
        assert_eq!(lib.resolve_path("").unwrap(), Some(NodeId::master()));
    }

    #[test]
    fn test_get_path_unknown_node() {
        let lib = library();
        assert!(lib.get_path(&NodeId::from("ghost")).is_err());
    }
}
