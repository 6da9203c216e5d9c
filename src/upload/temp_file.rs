//! Spooled temp files for relayed uploads
//!
//! Each file part of an incoming form is streamed to its own temp file before
//! being handed to the provider.
//!
//! # Flow
//!
//! 1. Create a uniquely named file in the spool directory
//! 2. Append body chunks as they arrive, hashing along the way
//! 3. `finish` flushes and seals the file; the provider client reads it by path
//!
//! The file is removed when the `TempFile` is dropped.
//!
//! # Example
//!
//! ```no_run
//! use tsubame::upload::temp_file::TempFile;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut temp = TempFile::create(&std::env::temp_dir(), Some("photo.jpg")).await?;
//! temp.write_chunk(b"Hello, World!").await?;
//! temp.finish().await?;
//!
//! println!("File: {:?}", temp.path());
//! println!("Size: {} bytes", temp.size());
//! println!("SHA256: {}", temp.content_hash());
//! # Ok(())
//! # }
//! ```

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::UploadError;

/// Temporary file backing one uploaded form part
pub struct TempFile {
    path: PathBuf,
    file: Option<File>,
    hasher: Sha256,
    size: u64,
    content_hash: String,
}

impl TempFile {
    /// Create an empty temp file in `dir`
    ///
    /// The extension of `original_name`, if any, is kept so the provider can
    /// sniff the media type from the path.
    pub async fn create(dir: &Path, original_name: Option<&str>) -> Result<Self, UploadError> {
        let file_name = match original_name.and_then(extension_of) {
            Some(ext) => format!("tsubame-{}.{}", uuid::Uuid::new_v4(), ext),
            None => format!("tsubame-{}.tmp", uuid::Uuid::new_v4()),
        };
        let path = dir.join(file_name);
        let file = File::create(&path).await?;

        Ok(Self {
            path,
            file: Some(file),
            hasher: Sha256::new(),
            size: 0,
            content_hash: String::new(),
        })
    }

    /// Append a chunk of the body
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let file = self.file.as_mut().ok_or(UploadError::AlreadyFinished)?;
        file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close the file, computing the final content hash
    pub async fn finish(&mut self) -> Result<(), UploadError> {
        let mut file = self.file.take().ok_or(UploadError::AlreadyFinished)?;
        file.flush().await?;
        file.sync_all().await?;
        self.content_hash = hex::encode(std::mem::take(&mut self.hasher).finalize());
        Ok(())
    }

    /// Get the path to the temp file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// SHA256 of the content (hex encoded); empty until `finish`
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

fn extension_of(name: &str) -> Option<&str> {
    let ext = Path::new(name).extension()?.to_str()?;
    let valid = !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up temp file"
                );
            }
        }
    }
}
