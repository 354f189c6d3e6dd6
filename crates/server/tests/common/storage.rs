//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use gantry_storage::{
    ByteStream, FilesystemBackend, ObjectMeta, ObjectStore, StorageResult, StreamingUpload,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// A test storage wrapper that cleans up on drop.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestStorage {
    pub backend: Arc<dyn ObjectStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    /// Create a new test storage with a temporary directory.
    pub async fn new() -> StorageResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path()).await?;

        Ok(Self {
            backend: Arc::new(backend),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the object store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.backend.clone()
    }
}

/// An [`ObjectStore`] wrapper that fails a configurable number of streaming
/// uploads before delegating again, for exercising reassembly failure paths.
pub struct FlakyStore {
    inner: Arc<dyn ObjectStore>,
    put_stream_failures: AtomicU32,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            put_stream_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `n` calls to `put_stream` fail with an I/O error.
    pub fn fail_next_put_streams(&self, n: u32) {
        self.put_stream_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        let armed = self
            .put_stream_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(std::io::Error::other("injected put_stream failure").into());
        }
        self.inner.put_stream(key, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
