//! Storage layer
//!
//! Two collaborators sit behind traits so the store can run against disk or
//! memory:
//!
//! - **`DocumentStorage`**: the serialized library (`library.json`)
//! - **`FileStorage`**: blob contents of registered files (`files/<id>.<ext>`)

pub mod error;
pub mod files;
pub mod memory;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use files::{extension_for_mime, mime_for_path, FileStorage, FsFileStorage};
pub use memory::{MemoryDocumentStorage, MemoryFileStorage};
pub use persistence::{DocumentStorage, JsonFileStorage};
