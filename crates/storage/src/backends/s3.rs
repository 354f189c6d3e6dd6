//! S3-compatible storage backend using AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Minimum part size for S3 multipart uploads (5 MiB).
/// S3 requires all parts except the last to be at least 5 MB.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum buffer size before spilling to temp file (64 MiB).
/// This prevents unbounded memory growth if the caller sends many small chunks.
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Marker included in lazy-credentials initialization errors so we can map them
/// to actionable storage config errors instead of generic S3 transport failures.
const CREDENTIALS_INIT_ERROR_MARKER: &str = "gantry-s3-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "gantry-s3-lazy-credentials-resolve";

/// Lazily initializes the AWS default credentials chain on first signed request.
///
/// This avoids constructor-time side effects (notably TLS/native-root
/// initialization) in environments where no root certificates are available.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn build_chain(
        &self,
    ) -> Result<aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        let region = aws_config::Region::new(self.region.clone());

        tokio::task::spawn(async move {
            aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region)
                .build()
                .await
        })
        .await
        .map_err(|join_err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_INIT_ERROR_MARKER}: failed to initialize AWS default credential chain: {join_err}"
            ))
        })
    }

    async fn chain(
        &self,
    ) -> Result<&aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        self.chain
            .get_or_try_init(|| async { self.build_chain().await })
            .await
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self.chain().await?;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let err_text = err.to_string();
    if err_text.contains(CREDENTIALS_INIT_ERROR_MARKER)
        || err_text.contains(CREDENTIALS_RESOLVE_ERROR_MARKER)
    {
        return StorageError::Config(
            "S3 credential initialization failed. Configure AWS credentials explicitly or ensure ambient AWS credentials and trust roots are available."
                .to_string(),
        );
    }

    StorageError::S3(Box::new(err))
}

/// Handle bare host:port endpoints (e.g., "minio:9000") by prepending http://.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`)
    ///   instead of virtual-hosted style (`bucket.endpoint/key`). Required for
    ///   MinIO and some S3-compatible services; AWS S3 itself requires
    ///   virtual-hosted style (false).
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let has_access_key_id = access_key_id.is_some();
        let has_secret_access_key = secret_access_key.is_some();
        if has_access_key_id ^ has_secret_access_key {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        // Build the S3 client config directly and defer ambient credentials
        // chain initialization until the first signed request.
        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        // Explicit config credentials, or the ambient AWS credential chain
        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "gantry-config",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            s3_config_builder = s3_config_builder
                .credentials_provider(LazyDefaultCredentialsProvider::new(resolved_region));
        }

        if let Some(endpoint_url) = endpoint.as_deref().map(normalize_endpoint) {
            s3_config_builder = s3_config_builder.endpoint_url(&endpoint_url);

            // For explicit HTTP endpoints (e.g. local MinIO), use an HTTP-only
            // client so SDK initialization doesn't depend on native trust roots.
            if endpoint_url.to_ascii_lowercase().starts_with("http://") {
                s3_config_builder =
                    s3_config_builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        // Strip trailing slashes so prefixed keys never contain "prefix//key"
        let normalized_prefix = prefix.map(|p| p.trim_end_matches('/').to_string());

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix(&self, full_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => {
                let prefix_with_slash = format!("{}/", prefix);
                full_key
                    .strip_prefix(&prefix_with_slash)
                    .unwrap_or(full_key)
                    .to_string()
            }
            None => full_key.to_string(),
        }
    }

    /// Convert an AWS SDK error to StorageError, mapping NotFound appropriately.
    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
            let raw = service_err.raw();
            if raw.status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        map_s3_operation_error(err)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err
                    && service_err.raw().status().as_u16() == 404
                {
                    return Ok(false);
                }
                Err(map_s3_operation_error(err))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let last_modified = output.last_modified().and_then(|dt| {
            time::OffsetDateTime::from_unix_timestamp(dt.secs())
                .inspect_err(|e| {
                    tracing::warn!(
                        key = %key,
                        timestamp = dt.secs(),
                        error = %e,
                        "failed to convert S3 timestamp"
                    );
                })
                .ok()
        });

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0) as u64,
            last_modified,
            content_type: output.content_type().map(|s| s.to_string()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();

        Ok(bytes)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        // Convert the SDK body into AsyncRead, then wrap with ReaderStream so
        // the object is never materialized whole.
        let async_read = output.body.into_async_read();
        let reader_stream = ReaderStream::new(async_read);

        use futures::StreamExt;
        let stream = reader_stream.map(|result| result.map_err(StorageError::Io));

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let full_key = self.full_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn put_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        let full_key = self.full_key(key);

        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&full_key);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let create_output = request.send().await.map_err(map_s3_operation_error)?;

        let upload_id = create_output
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return upload_id".to_string()))?
            .to_string();

        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: full_key,
            content_type: content_type.map(|s| s.to_string()),
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            bytes_written: 0,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
            spill_file: None,
            spill_bytes: 0,
            spill_read_pos: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);

        // S3 delete_object doesn't error on missing keys by default, so head
        // first to keep NotFound semantics aligned with the filesystem backend
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full_prefix = self.full_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(map_s3_operation_error)?;

            for obj in output.contents() {
                if let Some(obj_key) = obj.key() {
                    results.push(self.strip_prefix(obj_key));
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let marker_key = match &self.prefix {
            Some(prefix) => format!("{}/.gantry-health-check", prefix),
            None => ".gantry-health-check".to_string(),
        };

        let health_check_future = async {
            // Write a small marker object
            let marker_data = Bytes::from_static(b"health-check");
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(marker_data.into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            // Delete the marker (ignore NotFound from race conditions)
            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    if let aws_sdk_s3::error::SdkError::ServiceError(ref se) = e
                        && se.raw().status().as_u16() != 404
                    {
                        return Err(map_s3_operation_error(e));
                    }
                }
            }

            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check_future)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
    }
}

/// Streaming upload for S3 backend using multipart upload.
///
/// Buffers incoming data to meet S3's 5 MB minimum part size requirement.
/// If the buffer exceeds 64 MiB, data spills to a temporary file to bound
/// memory usage.
struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    content_type: Option<String>,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    bytes_written: u64,
    /// In-memory buffer for accumulating data until we reach MIN_PART_SIZE.
    buffer: Vec<u8>,
    /// Temporary file for spillover when buffer exceeds MAX_BUFFER_SIZE.
    spill_file: Option<tokio::fs::File>,
    /// Bytes written to spill file (tracked separately from buffer).
    spill_bytes: usize,
    /// Position of next byte to read from spill file (avoids O(n²) rewrites).
    spill_read_pos: usize,
}

impl S3Upload {
    /// Upload a single part to S3 and track it.
    async fn upload_part(&mut self, data: Bytes) -> StorageResult<()> {
        let upload_output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(self.part_number)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        let completed_part = aws_sdk_s3::types::CompletedPart::builder()
            .e_tag(upload_output.e_tag().unwrap_or_default())
            .part_number(self.part_number)
            .build();

        self.parts.push(completed_part);
        self.part_number += 1;

        Ok(())
    }
}

#[async_trait]
impl StreamingUpload for S3Upload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

        self.bytes_written += data.len() as u64;

        // If we have a spill file, append to it. Part reads below move the
        // cursor, so position at the append point first.
        if let Some(ref mut file) = self.spill_file {
            file.seek(std::io::SeekFrom::Start(self.spill_bytes as u64))
                .await
                .map_err(StorageError::Io)?;
            file.write_all(&data).await.map_err(StorageError::Io)?;
            self.spill_bytes += data.len();
        } else {
            self.buffer.extend_from_slice(&data);

            if self.buffer.len() > MAX_BUFFER_SIZE {
                // Create temp file and spill current buffer
                let mut file =
                    tokio::fs::File::from_std(tempfile::tempfile().map_err(StorageError::Io)?);
                file.write_all(&self.buffer)
                    .await
                    .map_err(StorageError::Io)?;
                self.spill_bytes = self.buffer.len();
                self.buffer.clear();
                self.buffer.shrink_to_fit();
                self.spill_file = Some(file);
                tracing::debug!(
                    key = %self.key,
                    spill_bytes = self.spill_bytes,
                    "S3 upload spilled to temp file due to buffer overflow"
                );
            }
        }

        // Upload parts when we have enough unread data in the spill file.
        // Track read position instead of rewriting the file (O(n) vs O(n²)).
        while self.spill_bytes - self.spill_read_pos >= MIN_PART_SIZE {
            let file = self
                .spill_file
                .as_mut()
                .ok_or_else(|| StorageError::Config("spill accounting without file".to_string()))?;
            file.seek(std::io::SeekFrom::Start(self.spill_read_pos as u64))
                .await
                .map_err(StorageError::Io)?;

            let mut part_data = vec![0u8; MIN_PART_SIZE];
            file.read_exact(&mut part_data)
                .await
                .map_err(StorageError::Io)?;

            self.spill_read_pos += MIN_PART_SIZE;

            self.upload_part(Bytes::from(part_data)).await?;
        }

        // Upload parts from buffer if we have enough
        while self.buffer.len() >= MIN_PART_SIZE && self.spill_file.is_none() {
            let part_data: Vec<u8> = self.buffer.drain(..MIN_PART_SIZE).collect();
            self.upload_part(Bytes::from(part_data)).await?;
        }

        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        // Remaining spill data plus buffer forms the last part, which S3
        // allows to be any size
        let mut final_data = Vec::new();

        if let Some(mut file) = self.spill_file.take() {
            let remaining = self.spill_bytes - self.spill_read_pos;
            if remaining > 0 {
                file.seek(std::io::SeekFrom::Start(self.spill_read_pos as u64))
                    .await
                    .map_err(StorageError::Io)?;
                final_data.reserve(remaining);
                file.take(remaining as u64)
                    .read_to_end(&mut final_data)
                    .await
                    .map_err(StorageError::Io)?;
            }
        }

        final_data.extend_from_slice(&self.buffer);

        if !final_data.is_empty() {
            self.upload_part(Bytes::from(final_data)).await?;
        }

        // Zero-byte uploads: S3 multipart requires parts of at least 1 byte,
        // so abort the multipart upload and use PutObject instead.
        if self.parts.is_empty() {
            // Abort failure is just orphaned-part cleanup, don't fail the put
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .send()
                .await
            {
                tracing::warn!(
                    key = %self.key,
                    upload_id = %self.upload_id,
                    error = %e,
                    "failed to abort multipart upload for zero-byte object, orphaned parts may remain"
                );
            }

            let mut request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(Bytes::new().into());
            if let Some(ct) = &self.content_type {
                request = request.content_type(ct);
            }
            request.send().await.map_err(map_s3_operation_error)?;

            return Ok(self.bytes_written);
        }

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(self.parts.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(())
    }
}
