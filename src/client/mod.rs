//! Upload client
//!
//! The widget side of the relay: a queue of files with per-file status,
//! progress and ETA, uploaded concurrently through a transport that either
//! talks to the provider directly or goes through the relay.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tsubame::client::transport::DirectTransport;
//! use tsubame::client::UploadQueue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = UploadQueue::new();
//! queue.add_files(["photos/a.jpg", "photos/b.jpg"])?;
//!
//! let transport = DirectTransport::new("https://api.cloudinary.com", "demo", "unsigned")?;
//! let report = queue.upload_all(Arc::new(transport)).await?;
//! println!("{} uploaded, {} failed", report.succeeded.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

pub mod preview;
pub mod progress;
pub mod queue;
pub mod transport;

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use queue::{BatchReport, UploadQueue};

/// Lifecycle of one queued file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

/// A local file selected for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHandle {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl FileHandle {
    /// Stat a path and capture its name and size
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(QueueError::NotAFile(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
        })
    }
}

/// Tracked state of one file
#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub id: String,
    pub file: FileHandle,
    pub preview_url: String,
    pub progress: u8,
    pub eta: String,
    pub status: UploadStatus,
    pub remote_url: Option<String>,
}

/// Where the provider put an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAsset {
    pub url: String,
    pub raw: Value,
}

impl RemoteAsset {
    /// Read the delivery URL from a provider upload response
    ///
    /// Prefers `secure_url`, falling back to `url`.
    pub fn from_provider(raw: Value) -> Result<Self, TransferError> {
        let url = raw
            .get("secure_url")
            .or_else(|| raw.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::InvalidResponse("response carries no secure_url or url".into())
            })?;
        Ok(Self { url, raw })
    }
}

/// Errors from sending a single file
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Queue operation errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Unknown upload item: {0}")]
    UnknownItem(String),

    #[error("An upload batch is in progress")]
    Busy,

    #[error("{failed} of {total} uploads failed")]
    BatchFailed { failed: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_asset_prefers_secure_url() {
        let asset = RemoteAsset::from_provider(json!({
            "url": "http://cdn.example.com/a.png",
            "secure_url": "https://cdn.example.com/a.png"
        }))
        .unwrap();
        assert_eq!(asset.url, "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_remote_asset_falls_back_to_url() {
        let asset = RemoteAsset::from_provider(json!({ "url": "http://cdn/a.png" })).unwrap();
        assert_eq!(asset.url, "http://cdn/a.png");
    }

    #[test]
    fn test_remote_asset_without_url() {
        let result = RemoteAsset::from_provider(json!({ "public_id": "a" }));
        assert!(matches!(result, Err(TransferError::InvalidResponse(_))));
    }

    #[test]
    fn test_file_handle_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"hello").unwrap();

        let handle = FileHandle::open(&path).unwrap();
        assert_eq!(handle.name, "note.txt");
        assert_eq!(handle.size, 5);

        assert!(matches!(
            FileHandle::open(dir.path()),
            Err(QueueError::NotAFile(_))
        ));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::Uploading).unwrap(),
            "\"uploading\""
        );
    }
}
