//! Persisted library document
//!
//! The library is stored as one JSON object:
//!
//! ```json
//! { "nodes": [ { "id": "master", ... }, { "id": "trash", ... } ],
//!   "files": [ ... ], "tags": [ ... ], "version": 11 }
//! ```
//!
//! Nodes nest through `children`; `parent`, `index` and `depth` are never
//! written and are recomputed by one walk after loading. Older documents are
//! brought up to [`CURRENT_VERSION`] by the chain in `migrations`.

mod migrations;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::library::Library;
use crate::models::{File, Node, NodeId, Tag};
use crate::registry::{FileRegistry, TagRegistry};
use crate::timestamp::TimestampError;
use crate::tree::Forest;

pub use migrations::{MigrationContext, TIMESTAMP_FIELDS};

/// Schema version written by this build
pub const CURRENT_VERSION: u32 = 11;

/// Oldest schema version that can still be upgraded
pub const OLDEST_VERSION: u32 = 1;

/// Errors raised while reading or upgrading a document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document has no version field")]
    MissingVersion,

    #[error(
        "Unsupported document version {found} (this build reads {} to {})",
        OLDEST_VERSION,
        CURRENT_VERSION
    )]
    UnsupportedVersion { found: i64 },

    #[error("Invalid timestamp in '{field}': {source}")]
    Timestamp {
        field: String,
        #[source]
        source: TimestampError,
    },

    #[error("Migration from version {from} failed: {reason}")]
    Migration { from: u32, reason: String },

    #[error("Reserved root '{0}' is missing")]
    MissingRoot(&'static str),

    #[error("Unexpected top-level node '{0}'")]
    UnexpectedRoot(NodeId),

    #[error("Node '{0}' is duplicated or attached to an unknown parent")]
    InconsistentNode(NodeId),

    #[error("Reserved root '{0}' is not a directory")]
    RootNotDirectory(NodeId),

    #[error("Directory '{name}' appears more than once under '{parent}'")]
    DuplicateDirectory { parent: NodeId, name: String },
}

/// A node with its children, as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(flatten)]
    pub node: Node,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

/// The stored shape of a library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub version: u32,
}

impl LibraryDocument {
    /// Snapshot a library at the current schema version
    pub fn from_library(library: &Library) -> Self {
        let forest = library.forest();
        let nodes = forest
            .roots()
            .iter()
            .filter_map(|root| record(forest, root))
            .collect();
        Self {
            nodes,
            files: library.file_registry().files().to_vec(),
            tags: library.tag_registry().tags().to_vec(),
            version: CURRENT_VERSION,
        }
    }

    /// Rebuild the in-memory library; index, depth and parent are derived here
    pub fn into_library(self, clock: Arc<dyn Clock>) -> Result<Library, DocumentError> {
        let mut master = None;
        let mut trash = None;
        for record in self.nodes {
            match record.node.id.as_str() {
                NodeId::MASTER if master.is_none() => master = Some(record),
                NodeId::TRASH if trash.is_none() => trash = Some(record),
                _ => return Err(DocumentError::UnexpectedRoot(record.node.id)),
            }
        }
        let master = master.ok_or(DocumentError::MissingRoot(NodeId::MASTER))?;
        let trash = trash.ok_or(DocumentError::MissingRoot(NodeId::TRASH))?;
        for root in [&master, &trash] {
            if !root.node.content.is_directory() {
                return Err(DocumentError::RootNotDirectory(root.node.id.clone()));
            }
        }

        let mut flat = Vec::new();
        let master_node = flatten(master, &mut flat);
        let trash_node = flatten(trash, &mut flat);

        let forest = Forest::from_preorder(master_node, trash_node, flat)
            .map_err(DocumentError::InconsistentNode)?;
        check_directory_names(&forest)?;

        Ok(Library::from_parts(
            forest,
            FileRegistry::from_files(self.files),
            TagRegistry::from_tags(self.tags),
            clock,
        ))
    }
}

/// Nested record for `id` and everything below it
fn record(forest: &Forest, id: &NodeId) -> Option<NodeRecord> {
    let entry = forest.get(id).ok()?;
    Some(NodeRecord {
        node: entry.node().clone(),
        children: entry
            .children()
            .iter()
            .filter_map(|child| record(forest, child))
            .collect(),
    })
}

/// Reject sibling directories whose names match case-insensitively
fn check_directory_names(forest: &Forest) -> Result<(), DocumentError> {
    for entry in forest.visit() {
        let mut seen = HashSet::new();
        for child in entry.children() {
            let Some(name) = forest.get(child).ok().and_then(|c| c.content().directory_name()) else {
                continue;
            };
            if !seen.insert(name.to_lowercase()) {
                return Err(DocumentError::DuplicateDirectory {
                    parent: entry.id().clone(),
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Push the descendants of `record` onto `out` in pre-order as `(node, parent)`
/// pairs and return the record's own node
fn flatten(record: NodeRecord, out: &mut Vec<(Node, NodeId)>) -> Node {
    let NodeRecord { node, children } = record;
    let mut pending: Vec<(NodeRecord, NodeId)> = children
        .into_iter()
        .rev()
        .map(|child| (child, node.id.clone()))
        .collect();

    while let Some((record, parent)) = pending.pop() {
        let NodeRecord { node: child, children } = record;
        pending.extend(children.into_iter().rev().map(|c| (c, child.id.clone())));
        out.push((child, parent));
    }
    node
}

impl Library {
    /// Snapshot as a document value
    pub fn to_document(&self) -> LibraryDocument {
        LibraryDocument::from_library(self)
    }

    /// Compact JSON at the current version
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(&self.to_document())?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Load a library from JSON text of any supported version
    ///
    /// Timestamps are revived, migrations run in version order, then the forest
    /// is walked once to rebuild the memoized structure.
    pub fn from_json(text: &str, clock: Arc<dyn Clock>) -> Result<Library, DocumentError> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let context = MigrationContext { now: clock.now() };
        let upgraded = migrations::upgrade(raw, &context)?;
        let document: LibraryDocument = serde_json::from_value(upgraded)?;
        let library = document.into_library(clock)?;
        debug!(
            "Loaded library: {} nodes, {} files, {} tags",
            library.len(),
            library.files().len(),
            library.tags().len()
        );
        Ok(library)
    }
}
