//! Persistent vector index for email embeddings.
//!
//! - `vector`: in-memory index with cosine-distance nearest-neighbor search
//! - `storage`: binary file I/O for named collections on disk

mod storage;
mod vector;

pub use storage::{CollectionStore, StoreError};
pub use vector::{Hit, IndexEntry, IndexError, VectorIndex};

/// Default collection name, matching the original email corpus layout.
pub const DEFAULT_COLLECTION: &str = "email_collection";
