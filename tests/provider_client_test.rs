//! Provider Client Integration Tests
//!
//! Signed uploads against a wiremock provider.

mod common;

use common::{provider_config, provider_success, API_KEY, API_SECRET, UPLOAD_PATH};
use serde_json::json;
use std::collections::BTreeMap;
use tsubame::provider::signature;
use tsubame::provider::{MediaUploader, ProviderClient, ProviderError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Value of a text field in a multipart body
fn form_field(body: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{}\"", name);
    let start = body.find(&marker)? + marker.len();
    let rest = &body[start..];
    let value_start = rest.find("\r\n\r\n")? + 4;
    let value = &rest[value_start..];
    let value_end = value.find("\r\n")?;
    Some(value[..value_end].to_string())
}

fn fixture(dir: &tempfile::TempDir, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("cat.png");
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_signed_upload_fields() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_success("cat")))
        .expect(1)
        .mount(&provider)
        .await;

    let mut config = provider_config(&provider.uri());
    config.folder = Some("pets".into());
    let client = ProviderClient::new(config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = fixture(&dir, b"not really a png");
    let result = client.upload_file(&file, "cat.png").await.unwrap();
    assert_eq!(result["public_id"], "cat");

    let requests = provider.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();

    assert_eq!(form_field(&body, "api_key").as_deref(), Some(API_KEY));
    assert_eq!(form_field(&body, "folder").as_deref(), Some("pets"));
    assert_eq!(
        form_field(&body, "signature_algorithm").as_deref(),
        Some("sha256")
    );
    assert!(body.contains("filename=\"cat.png\""));
    assert!(body.contains("not really a png"));

    // The signature covers exactly the signed params
    let timestamp = form_field(&body, "timestamp").unwrap();
    let mut params = BTreeMap::new();
    params.insert("folder".to_string(), "pets".to_string());
    params.insert("timestamp".to_string(), timestamp);
    assert_eq!(
        form_field(&body, "signature").unwrap(),
        signature::sign(&params, API_SECRET)
    );
}

#[tokio::test]
async fn test_upload_preset_is_signed_when_configured() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(body_string_contains("name=\"upload_preset\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_success("p")))
        .expect(1)
        .mount(&provider)
        .await;

    let mut config = provider_config(&provider.uri());
    config.upload_preset = Some("signed-preset".into());
    let client = ProviderClient::new(config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = fixture(&dir, b"abc");
    client.upload_file(&file, "cat.png").await.unwrap();
}

#[tokio::test]
async fn test_rejected_upload() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": { "message": "Invalid image file" } })),
        )
        .mount(&provider)
        .await;

    let client = ProviderClient::new(provider_config(&provider.uri())).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(&dir, b"abc");

    let err = client.upload_file(&file, "cat.png").await.unwrap_err();
    match err {
        ProviderError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid image file");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_response() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&provider)
        .await;

    let client = ProviderClient::new(provider_config(&provider.uri())).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(&dir, b"abc");

    let err = client.upload_file(&file, "cat.png").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let provider = MockServer::start().await;
    let client = ProviderClient::new(provider_config(&provider.uri())).unwrap();

    let err = client
        .upload_file(std::path::Path::new("/definitely/not/here.png"), "here.png")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::IoError(_)));
    assert!(provider.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_provider_is_request_error() {
    // Grab a free port, then release it so connections are refused
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let client = ProviderClient::new(provider_config(&uri)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(&dir, b"abc");

    let err = client.upload_file(&file, "cat.png").await.unwrap_err();
    assert!(matches!(err, ProviderError::RequestError(_)));
}
