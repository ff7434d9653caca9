//! Arbor Core Library
//!
//! This crate provides the core functionality for Arbor, a hierarchical
//! note-taking system that keeps its whole library in one versioned JSON
//! document.
//!
//! # Architecture
//!
//! - **Library**: an in-memory forest rooted at Master and Trash, plus tag and
//!   file registries. Every query and mutation runs against it.
//! - **Document**: the JSON form of the library, upgraded from older versions
//!   on load.
//! - **Store**: the async shell that debounces saves, stores file blobs and
//!   announces changes.
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open().await?;
//!
//! // Add a note under a directory
//! let journal = store.create_directory("/journal")?;
//! store.add_text_node(&journal, "dear diary")?;
//!
//! // Query it back
//! let path = store.read(|lib| lib.get_path(&journal))??;
//!
//! store.close().await?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `library`: The library aggregate and its operations
//! - `tree`: Ordered forest with structural edits
//! - `models`: Data structures for nodes, files, and tags
//! - `document`: JSON document format and migrations
//! - `storage`: Document and file persistence
//! - `save`: Debounced background saving
//! - `config`: Application configuration

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod library;
pub mod models;
pub mod preview;
pub mod registry;
pub mod save;
pub mod storage;
pub mod store;
pub mod timestamp;
pub mod tree;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use document::{DocumentError, LibraryDocument, CURRENT_VERSION};
pub use error::{InvalidMoveReason, LibraryError, LibraryResult};
pub use library::{Library, Removal, TRASH_LABEL};
pub use models::{
    AnchorPreview, File, FileId, Mark, Node, NodeContent, NodeId, NodeKind, RichText, Tag, TagId,
    TextKind, TextSegment,
};
pub use preview::{LinkPreview, LinkPreviewSource, NoPreviews, PreviewImage, StaticPreviews};
pub use save::{SaveScheduler, SaveStatus};
pub use storage::{DocumentStorage, FileStorage, StorageError};
pub use store::{LibraryEvent, Store, StoreOptions};
pub use timestamp::Timestamp;
pub use tree::{Forest, TreeNode, Visit};
