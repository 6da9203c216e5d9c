//! Upload transports
//!
//! A transport delivers one file and reports bytes as they leave. Two are
//! provided:
//!
//! - [`DirectTransport`]: unsigned upload straight to the provider with an
//!   upload preset (`POST {endpoint}/v1_1/{cloud}/auto/upload`, fields `file`
//!   and `upload_preset`)
//! - [`RelayTransport`]: `POST {relay}/upload` with field `files`; the relay
//!   signs and forwards

use super::{FileHandle, RemoteAsset, TransferError};
use crate::provider;
use crate::server::RelayResponse;
use crate::upload::FILES_FIELD;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Chunk size used when streaming a file into a request body
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Receives the cumulative number of bytes handed to the request body
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Delivers one file somewhere and returns where it landed
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Short label for logs and metrics
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        file: &FileHandle,
        progress: ProgressSink,
    ) -> Result<RemoteAsset, TransferError>;
}

/// Build a streaming multipart part that reports progress per chunk
async fn progress_part(file: &FileHandle, progress: ProgressSink) -> Result<Part, TransferError> {
    let handle = tokio::fs::File::open(&file.path).await?;
    let sent = Arc::new(AtomicU64::new(0));

    let stream = ReaderStream::with_capacity(handle, CHUNK_SIZE).inspect_ok(move |chunk| {
        let total = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        progress(total);
    });

    Ok(
        Part::stream_with_length(reqwest::Body::wrap_stream(stream), file.size)
            .file_name(file.name.clone()),
    )
}

fn http_client() -> Result<reqwest::Client, TransferError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| TransferError::HttpError(e.to_string()))
}

/// Unsigned upload straight to the provider
pub struct DirectTransport {
    upload_url: String,
    upload_preset: String,
    http_client: reqwest::Client,
}

impl DirectTransport {
    pub fn new(
        endpoint: &str,
        cloud_name: &str,
        upload_preset: impl Into<String>,
    ) -> Result<Self, TransferError> {
        Ok(Self {
            upload_url: provider::upload_url(endpoint, cloud_name),
            upload_preset: upload_preset.into(),
            http_client: http_client()?,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl UploadTransport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[tracing::instrument(
        name = "client.direct_upload",
        skip(self, file, progress),
        fields(file.name = %file.name, upload.bytes = file.size),
        err
    )]
    async fn send(
        &self,
        file: &FileHandle,
        progress: ProgressSink,
    ) -> Result<RemoteAsset, TransferError> {
        let form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part("file", progress_part(file, progress).await?);

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransferError::HttpError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransferError::HttpError(e.to_string()))?;

        if !status.is_success() {
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                message: provider::error_message(&text),
            });
        }

        let raw = serde_json::from_str(&text)
            .map_err(|e| TransferError::InvalidResponse(e.to_string()))?;
        let asset = RemoteAsset::from_provider(raw)?;
        debug!(url = %asset.url, "Direct upload completed");
        Ok(asset)
    }
}

/// Upload through the relay's `/upload` route
pub struct RelayTransport {
    upload_url: String,
    http_client: reqwest::Client,
}

impl RelayTransport {
    pub fn new(relay_url: &str) -> Result<Self, TransferError> {
        Ok(Self {
            upload_url: format!("{}/upload", relay_url.trim_end_matches('/')),
            http_client: http_client()?,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl UploadTransport for RelayTransport {
    fn name(&self) -> &'static str {
        "relay"
    }

    #[tracing::instrument(
        name = "client.relay_upload",
        skip(self, file, progress),
        fields(file.name = %file.name, upload.bytes = file.size),
        err
    )]
    async fn send(
        &self,
        file: &FileHandle,
        progress: ProgressSink,
    ) -> Result<RemoteAsset, TransferError> {
        let form = Form::new().part(FILES_FIELD, progress_part(file, progress).await?);

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransferError::HttpError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransferError::HttpError(e.to_string()))?;

        let envelope: RelayResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransferError::Rejected {
                    status: status.as_u16(),
                    message: text.trim().to_string(),
                })
            }
            Err(e) => return Err(TransferError::InvalidResponse(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            });
        }

        let asset = RemoteAsset::from_provider(envelope.result)?;
        debug!(url = %asset.url, "Relay upload completed");
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_upload_url() {
        let transport = DirectTransport::new("https://api.cloudinary.com/", "demo", "preset").unwrap();
        assert_eq!(
            transport.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
        assert_eq!(transport.name(), "direct");
    }

    #[test]
    fn test_relay_upload_url() {
        let transport = RelayTransport::new("http://localhost:3000/").unwrap();
        assert_eq!(transport.upload_url(), "http://localhost:3000/upload");
        assert_eq!(transport.name(), "relay");
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_request() {
        let transport = RelayTransport::new("http://127.0.0.1:1").unwrap();
        let file = FileHandle {
            path: "/nonexistent/tsubame.bin".into(),
            name: "tsubame.bin".into(),
            size: 3,
        };
        let result = transport.send(&file, Arc::new(|_| {})).await;
        assert!(matches!(result, Err(TransferError::IoError(_))));
    }
}
