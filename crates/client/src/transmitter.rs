//! Chunk transmission.
//!
//! Drives one artifact from plan selection through finalize. Chunks are sent
//! in batches of at most `parallelism` concurrent requests, and a batch
//! settles completely before the next begins, which keeps the retry boundary
//! simple: when a chunk exhausts its retries, everything beyond its batch is
//! known to be unsent. Each send carries its own timeout and is retried
//! under the shared [`RetryPolicy`]; contract violations surface immediately.

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::source::ArtifactSource;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use gantry_core::progress::{ProgressSnapshot, ProgressTracker};
use gantry_core::retry::RetryPolicy;
use gantry_core::upload::{CreateSessionRequest, UploadResult};
use gantry_core::{ChunkSpec, UploadPlan, plan_for_size, split};
use std::collections::HashSet;
use std::time::Duration;

/// Tunables for one transfer.
#[derive(Clone, Copy, Debug)]
pub struct UploadOptions {
    /// Ceiling on each individual chunk request. There is no whole-upload
    /// deadline; slow transfers make progress as long as every chunk does.
    pub chunk_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Uploads artifacts to one server.
pub struct Transmitter {
    api: ApiClient,
    options: UploadOptions,
}

impl Transmitter {
    pub fn new(api: ApiClient) -> Self {
        Self::with_options(api, UploadOptions::default())
    }

    pub fn with_options(api: ApiClient, options: UploadOptions) -> Self {
        Self { api, options }
    }

    /// Upload `source` into `bucket`, reporting progress along the way.
    ///
    /// Oversized artifacts are rejected before any request is made. On a
    /// terminal chunk failure the session is aborted best-effort; on a
    /// finalize failure it is left intact so finalize can be retried without
    /// re-sending chunks.
    pub async fn upload<F>(
        &self,
        source: &mut ArtifactSource,
        bucket: &str,
        mut on_progress: F,
    ) -> ClientResult<UploadResult>
    where
        F: FnMut(ProgressSnapshot),
    {
        let plan = plan_for_size(source.size())?;
        let total_chunks = plan.chunk_count(source.size());
        let mut tracker = ProgressTracker::new(total_chunks);
        on_progress(tracker.snapshot());

        let request = CreateSessionRequest {
            content_type: source.content_type().to_string(),
            total_chunks,
            bucket: bucket.to_string(),
        };
        let created = self
            .options
            .retry
            .run(ClientError::is_retryable, |_| {
                self.api.create_upload(&request)
            })
            .await?;
        tracker.session_established();
        on_progress(tracker.snapshot());

        tracing::debug!(
            upload_id = %created.upload_id,
            method = ?plan.method,
            total_chunks,
            destination_path = %created.destination_path,
            "upload session established"
        );

        self.run_to_completion(source, &created.upload_id, plan, None, tracker, on_progress)
            .await
    }

    /// Resume an interrupted session, sending only the chunks the server
    /// has not yet acknowledged.
    ///
    /// The artifact must split into the same chunk count the session was
    /// created with; anything else means the file changed underneath us.
    pub async fn resume<F>(
        &self,
        upload_id: &str,
        source: &mut ArtifactSource,
        mut on_progress: F,
    ) -> ClientResult<UploadResult>
    where
        F: FnMut(ProgressSnapshot),
    {
        let plan = plan_for_size(source.size())?;
        let total_chunks = plan.chunk_count(source.size());

        let status = self.api.get_status(upload_id).await?;
        if !status.state.is_open() {
            return Err(ClientError::InvalidRequest(format!(
                "session {upload_id} is {}; finalize is already in flight",
                status.state
            )));
        }
        if status.total_chunks != total_chunks {
            return Err(ClientError::InvalidRequest(format!(
                "session expects {} chunks but the artifact splits into {total_chunks}",
                status.total_chunks
            )));
        }

        let missing: HashSet<u32> = status.missing_indices.iter().copied().collect();
        let mut tracker = ProgressTracker::new(total_chunks);
        tracker.session_established();
        for _ in 0..status.chunks_received {
            tracker.chunk_acknowledged();
        }
        on_progress(tracker.snapshot());

        tracing::debug!(
            upload_id,
            chunks_received = status.chunks_received,
            total_chunks,
            "resuming upload session"
        );

        self.run_to_completion(source, upload_id, plan, Some(missing), tracker, on_progress)
            .await
    }

    async fn run_to_completion<F>(
        &self,
        source: &mut ArtifactSource,
        upload_id: &str,
        plan: UploadPlan,
        only: Option<HashSet<u32>>,
        mut tracker: ProgressTracker,
        mut on_progress: F,
    ) -> ClientResult<UploadResult>
    where
        F: FnMut(ProgressSnapshot),
    {
        if let Err(err) = self
            .send_chunks(
                source,
                upload_id,
                &plan,
                only.as_ref(),
                &mut tracker,
                &mut on_progress,
            )
            .await
        {
            tracker.fail();
            on_progress(tracker.snapshot());
            self.abort_best_effort(upload_id).await;
            return Err(err);
        }

        tracker.finalizing();
        on_progress(tracker.snapshot());

        let finalize = self
            .options
            .retry
            .run(ClientError::is_retryable, |_| self.api.finalize(upload_id))
            .await;
        match finalize {
            Ok(result) => {
                tracker.completed();
                on_progress(tracker.snapshot());
                Ok(result)
            }
            Err(err) => {
                // The session survives a failed finalize, so no abort here:
                // the caller can finalize again without re-sending chunks.
                tracing::warn!(upload_id, error = %err, "finalize failed; session kept for retry");
                tracker.fail();
                on_progress(tracker.snapshot());
                Err(err)
            }
        }
    }

    async fn send_chunks<F>(
        &self,
        source: &mut ArtifactSource,
        upload_id: &str,
        plan: &UploadPlan,
        only: Option<&HashSet<u32>>,
        tracker: &mut ProgressTracker,
        on_progress: &mut F,
    ) -> ClientResult<()>
    where
        F: FnMut(ProgressSnapshot),
    {
        let mut specs = split(source.size(), plan.chunk_size_bytes)?;
        let batch_size = plan.parallelism.max(1) as usize;

        loop {
            let mut in_flight = FuturesUnordered::new();
            while in_flight.len() < batch_size {
                let Some(spec) = specs.next() else { break };
                if only.is_some_and(|missing| !missing.contains(&spec.index)) {
                    continue;
                }
                // Payload bytes are read lazily, right before transmission.
                let payload = source.read_chunk(&spec).await?;
                in_flight.push(self.send_chunk(upload_id, spec, payload));
            }
            if in_flight.is_empty() {
                return Ok(());
            }

            // Let the whole batch settle before surfacing a failure, so
            // every in-flight chunk either lands or gives up cleanly.
            let mut failed = None;
            while let Some(result) = in_flight.next().await {
                match result {
                    Ok(()) => {
                        tracker.chunk_acknowledged();
                        on_progress(tracker.snapshot());
                    }
                    Err(err) => {
                        if failed.is_none() {
                            failed = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = failed {
                return Err(err);
            }
        }
    }

    /// Send one chunk, retrying transient failures under the policy.
    async fn send_chunk(&self, upload_id: &str, spec: ChunkSpec, payload: Bytes) -> ClientResult<()> {
        let mut attempts = 0;
        let result = self
            .options
            .retry
            .run(ClientError::is_retryable, |attempt| {
                attempts = attempt;
                let payload = payload.clone();
                async move {
                    let send = self.api.put_chunk(upload_id, spec.index, payload);
                    match tokio::time::timeout(self.options.chunk_timeout, send).await {
                        Ok(result) => result.map(|_| ()),
                        Err(_) => Err(ClientError::Timeout(self.options.chunk_timeout)),
                    }
                }
            })
            .await;

        result.map_err(|err| ClientError::ChunkFailed {
            index: spec.index,
            attempts,
            source: Box::new(err),
        })
    }

    async fn abort_best_effort(&self, upload_id: &str) {
        match tokio::time::timeout(self.options.chunk_timeout, self.api.abort(upload_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(upload_id, error = %err, "best-effort abort failed");
            }
            Err(_) => {
                tracing::warn!(upload_id, "best-effort abort timed out");
            }
        }
    }
}
