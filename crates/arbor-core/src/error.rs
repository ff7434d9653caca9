//! Engine error types
//!
//! Precondition failures of library mutations. They are reported to the caller
//! as-is; the engine never retries or repairs.

use std::fmt;

use thiserror::Error;

use crate::models::{FileId, NodeId, NodeKind, TagId};

/// Why a structural move was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidMoveReason {
    /// Node and new parent are the same node
    SelfParent,
    /// New parent lies inside the node's own subtree
    IntoDescendant,
    /// The reference node is not a child of the new parent
    ReferenceNotChild,
    /// Reserved roots never move
    ReservedRoot,
    /// Indent needs a previous sibling to move under
    NoPreviousSibling,
    /// Outdent needs a parent that is not a root
    AlreadyTopLevel,
}

impl fmt::Display for InvalidMoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidMoveReason::SelfParent => "node cannot be its own parent",
            InvalidMoveReason::IntoDescendant => "node cannot move into its own subtree",
            InvalidMoveReason::ReferenceNotChild => "reference is not a child of the new parent",
            InvalidMoveReason::ReservedRoot => "reserved roots cannot be moved",
            InvalidMoveReason::NoPreviousSibling => "node has no previous sibling to indent under",
            InvalidMoveReason::AlreadyTopLevel => "node is already at the top level",
        };
        f.write_str(text)
    }
}

/// Errors from library operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    #[error("A directory named '{name}' already exists under {parent}")]
    DuplicateName { parent: NodeId, name: String },

    #[error("Invalid move of {node}: {reason}")]
    InvalidMove {
        node: NodeId,
        reason: InvalidMoveReason,
    },

    #[error("Reserved node {0} cannot be removed")]
    ReservedNode(NodeId),

    #[error("Tag not found: {0}")]
    TagNotFound(TagId),

    #[error("File not found: {0}")]
    FileNotFound(FileId),

    #[error("Node {id} is a {kind} node, expected text, heading or quote")]
    NotTextual { id: NodeId, kind: NodeKind },

    #[error("Node {id} is a {kind} node, expected {expected}")]
    WrongKind {
        id: NodeId,
        kind: NodeKind,
        expected: NodeKind,
    },
}

impl LibraryError {
    pub(crate) fn invalid_move(node: &NodeId, reason: InvalidMoveReason) -> Self {
        LibraryError::InvalidMove {
            node: node.clone(),
            reason,
        }
    }
}

/// Result type for library operations
pub type LibraryResult<T> = Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LibraryError::DuplicateName {
            parent: NodeId::master(),
            name: "Work".to_string(),
        };
        assert!(err.to_string().contains("'Work'"));
        assert!(err.to_string().contains("master"));

        let err = LibraryError::invalid_move(&NodeId::from("n1"), InvalidMoveReason::IntoDescendant);
        assert!(err.to_string().contains("own subtree"));
    }
}
