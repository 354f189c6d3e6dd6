use gantry_client::api::ApiClient;
use gantry_client::error::ClientError;
use gantry_core::upload::CreateSessionRequest;
use httpmock::Method::{DELETE, GET, POST, PUT};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn api_client_success_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let upload_id = "00000000-0000-0000-0000-000000000001";

    server.mock(|when, then| {
        when.method(GET).path("/v1/health");
        then.status(200)
            .json_body(json!({ "status": "ok", "version": "0.2.0" }));
    });

    server.mock(|when, then| {
        when.method(GET).path("/v1/capabilities");
        then.status(200).json_body(json!({
            "api_version": "v1",
            "max_artifact_bytes": 52428800u64,
            "max_chunk_payload_bytes": 12582912u64
        }));
    });

    let create_mock = server.mock(|when, then| {
        when.method(POST).path("/v1/uploads").json_body(json!({
            "content_type": "image/png",
            "total_chunks": 18,
            "bucket": "creatives"
        }));
        then.status(201).json_body(json!({
            "upload_id": upload_id,
            "destination_path": format!("creatives/{upload_id}.png")
        }));
    });

    server.mock(|when, then| {
        when.method(GET).path(format!("/v1/uploads/{upload_id}"));
        then.status(200).json_body(json!({
            "state": "open",
            "chunks_received": 16,
            "total_chunks": 18,
            "missing_indices": [3, 11]
        }));
    });

    server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v1/uploads/{upload_id}/finalize"));
        then.status(200).json_body(json!({
            "public_url": format!("http://127.0.0.1:8080/artifacts/creatives/{upload_id}.png"),
            "stored_path": format!("creatives/{upload_id}.png"),
            "size_bytes": 18874368u64
        }));
    });

    server.mock(|when, then| {
        when.method(DELETE).path(format!("/v1/uploads/{upload_id}"));
        then.status(204);
    });

    let client = ApiClient::new(&server.base_url()).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, "0.2.0");

    let caps = client.capabilities().await.unwrap();
    assert_eq!(caps.api_version, "v1");
    assert_eq!(caps.max_artifact_bytes, 50 * 1024 * 1024);
    assert_eq!(caps.max_chunk_payload_bytes, 12 * 1024 * 1024);

    let created = client
        .create_upload(&CreateSessionRequest {
            content_type: "image/png".to_string(),
            total_chunks: 18,
            bucket: "creatives".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(created.upload_id, upload_id);
    assert_eq!(created.destination_path, format!("creatives/{upload_id}.png"));
    create_mock.assert();

    let status = client.get_status(upload_id).await.unwrap();
    assert!(status.state.is_open());
    assert_eq!(status.chunks_received, 16);
    assert_eq!(status.missing_indices, vec![3, 11]);

    let result = client.finalize(upload_id).await.unwrap();
    assert_eq!(result.stored_path, format!("creatives/{upload_id}.png"));
    assert_eq!(result.size_bytes, 18 * 1024 * 1024);

    client.abort(upload_id).await.unwrap();
}

#[tokio::test]
async fn api_client_sends_chunk_payload_verbatim() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let chunk_mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/v1/uploads/u-1/chunks/4")
            .header("content-type", "application/octet-stream")
            .body("chunk payload bytes");
        then.status(200)
            .json_body(json!({ "chunks_received": 5, "total_chunks": 18 }));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let receipt = client
        .put_chunk("u-1", 4, bytes::Bytes::from_static(b"chunk payload bytes"))
        .await
        .unwrap();
    assert_eq!(receipt.chunks_received, 5);
    assert_eq!(receipt.total_chunks, 18);
    chunk_mock.assert();
}

#[tokio::test]
async fn api_client_maps_error_codes_to_variants() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/v1/uploads/gone");
        then.status(404)
            .json_body(json!({ "code": "not_found", "message": "upload session not found" }));
    });

    server.mock(|when, then| {
        when.method(PUT).path("/v1/uploads/u-2/chunks/99");
        then.status(400)
            .json_body(json!({ "code": "invalid_request", "message": "chunk index out of range" }));
    });

    server.mock(|when, then| {
        when.method(PUT).path("/v1/uploads/u-2/chunks/0");
        then.status(413)
            .json_body(json!({ "code": "payload_too_large", "message": "chunk exceeds limit" }));
    });

    server.mock(|when, then| {
        when.method(POST).path("/v1/uploads/u-2/finalize");
        then.status(409).json_body(json!({
            "code": "incomplete_upload",
            "message": "incomplete upload: missing 2 of 4 chunks: [1, 3]",
            "missing_indices": [1, 3]
        }));
    });

    server.mock(|when, then| {
        when.method(POST).path("/v1/uploads/u-3/finalize");
        then.status(409)
            .json_body(json!({ "code": "conflict", "message": "finalize already in flight" }));
    });

    server.mock(|when, then| {
        when.method(POST).path("/v1/uploads/u-4/finalize");
        then.status(502)
            .json_body(json!({ "code": "reassembly_failed", "message": "chunk read failed" }));
    });

    let client = ApiClient::new(&server.base_url()).unwrap();

    let err = client.get_status("gone").await.unwrap_err();
    assert!(matches!(err, ClientError::SessionNotFound(_)), "{err}");
    assert!(!err.is_retryable());

    let err = client
        .put_chunk("u-2", 99, bytes::Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)), "{err}");
    assert!(!err.is_retryable());

    let err = client
        .put_chunk("u-2", 0, bytes::Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::PayloadTooLarge(_)), "{err}");
    assert!(!err.is_retryable());

    let err = client.finalize("u-2").await.unwrap_err();
    match &err {
        ClientError::IncompleteUpload {
            missing_indices, ..
        } => assert_eq!(missing_indices, &vec![1, 3]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_retryable());

    let err = client.finalize("u-3").await.unwrap_err();
    match &err {
        ClientError::Api { status, code, .. } => {
            assert_eq!(*status, 409);
            assert_eq!(code, "conflict");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_retryable());

    let err = client.finalize("u-4").await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert!(err.to_string().contains("reassembly_failed"));
}

#[tokio::test]
async fn api_client_falls_back_on_unparseable_error_bodies() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/v1/health");
        then.status(502).body("upstream exploded");
    });

    let client = ApiClient::new(&server.base_url()).unwrap();
    let err = client.health().await.unwrap_err();
    match &err {
        ClientError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(*status, 502);
            assert_eq!(code, "unknown");
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
}

#[test]
fn api_client_rejects_invalid_server_url() {
    let err = ApiClient::new("not a url").unwrap_err();
    assert!(matches!(err, ClientError::InvalidUrl(_)));
}
