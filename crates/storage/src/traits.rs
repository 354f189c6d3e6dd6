//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store abstraction over transient chunk objects and final artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically. Overwrites any existing object at `key`.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload.
    ///
    /// `content_type` is recorded on the final object where the backend
    /// supports it. The upload is not visible at `key` until
    /// [`StreamingUpload::finish`] succeeds.
    async fn put_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3",
    /// "filesystem"). Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Performs a lightweight operation to verify the backend is reachable
    /// and properly configured. Called during server startup before the
    /// listener starts accepting requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// Trait for streaming uploads.
///
/// Dropping an upload without calling `finish` or `abort` leaves backend
/// garbage behind (a temp file or an unfinished multipart upload), so callers
/// must settle every upload explicitly.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
