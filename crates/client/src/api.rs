//! Typed HTTP client for the Gantry API.
//!
//! One thin method per endpoint. Request and response bodies are the shared
//! wire types from `gantry_core::upload`; non-success responses are decoded
//! into the [`ClientError`] taxonomy so callers can tell transient failures
//! from contract violations. Retry behavior lives in the transmitter, not
//! here: every method sends exactly one request.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use gantry_core::upload::{
    CapabilitiesResponse, ChunkReceipt, CreateSessionRequest, CreateSessionResponse,
    SessionStatusResponse, UploadResult,
};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Response from `GET /v1/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned by the server on non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    missing_indices: Option<Vec<u32>>,
}

/// One upload server, addressed by its base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> ClientResult<()> {
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let url = self.url("/v1/health")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn capabilities(&self) -> ClientResult<CapabilitiesResponse> {
        let url = self.url("/v1/capabilities")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_upload(
        &self,
        req: &CreateSessionRequest,
    ) -> ClientResult<CreateSessionResponse> {
        let url = self.url("/v1/uploads")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn get_status(&self, upload_id: &str) -> ClientResult<SessionStatusResponse> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send_json(self.http.get(url)).await
    }

    /// Send the payload for one chunk index.
    pub async fn put_chunk(
        &self,
        upload_id: &str,
        index: u32,
        payload: Bytes,
    ) -> ClientResult<ChunkReceipt> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/chunks/{index}"))?;
        self.send_json(
            self.http
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(payload),
        )
        .await
    }

    pub async fn finalize(&self, upload_id: &str) -> ClientResult<UploadResult> {
        let url = self.url(&format!("/v1/uploads/{upload_id}/finalize"))?;
        self.send_json(self.http.post(url)).await
    }

    /// Abort a session. Succeeds on unknown sessions too.
    pub async fn abort(&self, upload_id: &str) -> ClientResult<()> {
        let url = self.url(&format!("/v1/uploads/{upload_id}"))?;
        self.send_empty(self.http.delete(url)).await
    }
}

/// Map a non-success response onto the client error taxonomy.
///
/// The server's `{code, message}` body picks the variant; an unparseable
/// body falls back to the raw status and text.
async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => match err.code.as_str() {
            "not_found" => ClientError::SessionNotFound(err.message),
            "invalid_request" => ClientError::InvalidRequest(err.message),
            "payload_too_large" => ClientError::PayloadTooLarge(err.message),
            "incomplete_upload" => ClientError::IncompleteUpload {
                message: err.message,
                missing_indices: err.missing_indices.unwrap_or_default(),
            },
            _ => ClientError::Api {
                status,
                code: err.code,
                message: err.message,
            },
        },
        Err(_) => ClientError::Api {
            status,
            code: "unknown".to_string(),
            message: body,
        },
    }
}
