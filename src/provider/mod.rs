//! Media provider client
//!
//! Talks to the external media-storage provider's upload API. The relay uses
//! signed uploads authenticated with the API key/secret from
//! [`ProviderConfig`]; the client-side direct path uses unsigned uploads with
//! an upload preset (see [`crate::client::transport`]).
//!
//! # Example
//!
//! ```no_run
//! use tsubame::config::ProviderConfig;
//! use tsubame::provider::{MediaUploader, ProviderClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig {
//!     cloud_name: "demo".to_string(),
//!     api_key: "123456789".to_string(),
//!     api_secret: "secret".to_string(),
//!     base_url: "https://api.cloudinary.com".to_string(),
//!     upload_preset: None,
//!     folder: None,
//!     timeout_seconds: 60,
//! };
//!
//! let client = ProviderClient::new(config)?;
//! let result = client.upload_file(Path::new("/tmp/cat.jpg"), "cat.jpg").await?;
//! println!("Stored at {}", result["secure_url"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | Signed upload | `provider.upload` | cloud, file name, bytes, status_code |

pub mod signature;

use crate::config::ProviderConfig;
use crate::metrics;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio_util::io::ReaderStream;

/// Provider client errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Provider rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Server-side uploader used by the relay
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload a file from local disk, returning the provider's raw response
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<Value, ProviderError>;
}

/// Build the upload endpoint for an account
pub fn upload_url(base_url: &str, cloud_name: &str) -> String {
    format!(
        "{}/v1_1/{}/auto/upload",
        base_url.trim_end_matches('/'),
        cloud_name
    )
}

/// Pull a human-readable message out of a provider error body
///
/// Error responses look like `{"error":{"message":"..."}}`; anything else is
/// returned as-is.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Signed-upload client
pub struct ProviderClient {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl ProviderClient {
    /// Create a new provider client
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.cloud_name.trim().is_empty() {
            return Err(ProviderError::ConfigError("cloud_name is required".into()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the cloud (account) name
    pub fn cloud_name(&self) -> &str {
        &self.config.cloud_name
    }

    /// Get the upload endpoint URL
    pub fn upload_url(&self) -> String {
        upload_url(&self.config.base_url, &self.config.cloud_name)
    }

    /// Parameters covered by the signature for a given timestamp
    pub fn signed_params(&self, timestamp: u64) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("timestamp".to_string(), timestamp.to_string());
        if let Some(folder) = &self.config.folder {
            params.insert("folder".to_string(), folder.clone());
        }
        if let Some(preset) = &self.config.upload_preset {
            params.insert("upload_preset".to_string(), preset.clone());
        }
        params
    }

    fn unix_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MediaUploader for ProviderClient {
    #[tracing::instrument(
        name = "provider.upload",
        skip(self, path),
        fields(
            provider.cloud = %self.config.cloud_name,
            file.name = %file_name,
            upload.bytes = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<Value, ProviderError> {
        let start_time = Instant::now();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let span = tracing::Span::current();
        span.record("upload.bytes", size);

        let params = self.signed_params(Self::unix_timestamp());
        let signature = signature::sign(&params, &self.config.api_secret);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size).file_name(file_name.to_string());

        let form = params
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", signature::SIGNATURE_ALGORITHM)
            .part("file", part);

        let response = self
            .http_client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                metrics::record_provider_call("error", start_time.elapsed().as_secs_f64());
                ProviderError::RequestError(e.to_string())
            })?;

        let status = response.status();
        span.record("http.status_code", status.as_u16());
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        if !status.is_success() {
            metrics::record_provider_call("rejected", start_time.elapsed().as_secs_f64());
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        metrics::record_provider_call("success", start_time.elapsed().as_secs_f64());
        metrics::record_upload_bytes(size);

        let result: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let public_id = result.get("public_id").and_then(Value::as_str);
        tracing::info!(bytes = size, public_id = ?public_id, "Provider upload completed");

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            base_url: "https://api.cloudinary.com/".into(),
            upload_preset: None,
            folder: Some("relay".into()),
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_provider_client_creation() {
        let client = ProviderClient::new(test_config()).unwrap();
        assert_eq!(client.cloud_name(), "demo");
        assert_eq!(
            client.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
    }

    #[test]
    fn test_empty_cloud_name_rejected() {
        let mut config = test_config();
        config.cloud_name = String::new();
        assert!(matches!(
            ProviderClient::new(config),
            Err(ProviderError::ConfigError(_))
        ));
    }

    #[test]
    fn test_signed_params_include_folder() {
        let client = ProviderClient::new(test_config()).unwrap();
        let params = client.signed_params(42);
        assert_eq!(params.get("timestamp").map(String::as_str), Some("42"));
        assert_eq!(params.get("folder").map(String::as_str), Some("relay"));
        assert!(!params.contains_key("upload_preset"));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Invalid Signature"}}"#),
            "Invalid Signature"
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let client = ProviderClient::new(test_config()).unwrap();
        let result = client
            .upload_file(Path::new("/nonexistent/tsubame.bin"), "tsubame.bin")
            .await;
        assert!(matches!(result, Err(ProviderError::IoError(_))));
    }
}
