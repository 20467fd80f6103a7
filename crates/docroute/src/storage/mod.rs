//! Object storage adapter, content hashing and scoped local copies.

pub mod hash;
pub mod local;
pub mod temp;

use crate::error::StorageError;

pub use hash::{content_hash, hash_bytes, hash_file};
pub use local::LocalObjectStore;
pub use temp::TempDocument;

/// Opaque document storage addressed by `/`-separated references.
pub trait ObjectStore: Send + Sync {
    fn fetch(&self, file_ref: &str) -> Result<Vec<u8>, StorageError>;
    fn put(&self, file_ref: &str, bytes: &[u8]) -> Result<(), StorageError>;
    /// Deletes an object. Removing one that does not exist is not an error.
    fn remove(&self, file_ref: &str) -> Result<(), StorageError>;
}
