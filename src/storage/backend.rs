//! Storage backend trait definition.
//!
//! Abstracts over the local filesystem and S3-compatible object storage so
//! LFS objects and avatars can live in either.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Object not found
    NotFound(String),
    /// Key escapes the namespace or is otherwise unusable
    InvalidKey(String),
    /// IO error
    Io(std::io::Error),
    /// Other error
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "Object not found: {}", key),
            StorageError::InvalidKey(key) => write!(f, "Invalid key: {}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed reader returned by [`StorageBackend::get_stream`].
///
/// Dropping it releases the underlying file handle or HTTP body.
pub type ObjectReader = Box<dyn tokio::io::AsyncRead + Unpin + Send>;

/// Storage backend trait for pluggable storage.
///
/// Keys are relative paths inside a namespace (e.g. `ab/cd/ef01...` for LFS
/// objects) so that the same layout works on disk and in a bucket.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get an object by namespace and key
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes>;

    /// Put an object by namespace and key
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object by namespace and key. Deleting a missing object succeeds.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Get the size of an object without reading it
    async fn size(&self, namespace: &str, key: &str) -> StorageResult<u64>;

    /// Open an object for streaming
    async fn get_stream(&self, namespace: &str, key: &str) -> StorageResult<ObjectReader>;

    /// A URL the client can download the object from directly.
    ///
    /// `name` is offered to the browser as the download file name. Backends
    /// that cannot hand out URLs return `Ok(None)`.
    async fn url(&self, namespace: &str, key: &str, name: &str) -> StorageResult<Option<String>>;
}

/// Storage namespaces
pub mod namespaces {
    /// Git LFS objects, keyed by pointer relative path
    pub const LFS: &str = "lfs";
    /// Custom user avatars, keyed by avatar hash
    pub const AVATARS: &str = "avatars";
}
