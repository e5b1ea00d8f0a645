//! Blob store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Flat blob store used by the disk cache layer.
///
/// Keys are plain filenames in a single namespace; there is no directory
/// sharding. Writes are atomic: a reader never observes a half-written blob.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a blob's size without fetching content.
    async fn size(&self, key: &str) -> StorageResult<u64>;

    /// Get a blob's full content.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Get the bytes `[start, end)` of a blob.
    async fn read_range(&self, key: &str, start: u64, end: u64) -> StorageResult<Bytes>;

    /// Replace a blob atomically (write to temp, rename).
    async fn write_atomic(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete a blob.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List all keys in the store.
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// Static identifier for the backend type, used for logging.
    fn backend_name(&self) -> &'static str;
}
