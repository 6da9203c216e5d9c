//! Multipart form intake
//!
//! Streams every `files` part of a `multipart/form-data` body into its own
//! [`TempFile`], enforcing the per-file size limit while bytes arrive. Other
//! fields are drained and ignored.

use super::temp_file::TempFile;
use super::{UploadError, FILES_FIELD};
use bytes::Bytes;
use futures::Stream;
use std::path::PathBuf;
use tracing::debug;

/// One file part written to disk
pub struct SpooledFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub temp: TempFile,
}

impl SpooledFile {
    /// Name to present to the provider
    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("upload.bin")
    }
}

/// Limits applied while reading a form
#[derive(Debug, Clone)]
pub struct FormLimits {
    pub max_file_size: Option<u64>,
    pub spool_dir: PathBuf,
}

/// Extract the multipart boundary from a Content-Type header value
pub fn boundary_from_content_type(content_type: &str) -> Result<String, UploadError> {
    multer::parse_boundary(content_type)
        .map_err(|e| UploadError::InvalidMultipart(format!("Invalid content type: {}", e)))
}

/// Read a multipart body, spooling each `files` part to disk
///
/// Returns the spooled files in the order they appeared. An empty vector
/// means the form carried no files; deciding what to do about that is the
/// caller's job.
pub async fn spool_form<S, E>(
    body: S,
    boundary: &str,
    limits: &FormLimits,
) -> Result<Vec<SpooledFile>, UploadError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut multipart = multer::Multipart::new(body, boundary);
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        UploadError::InvalidMultipart(format!("Failed to parse multipart field: {}", e))
    })? {
        if field.name() != Some(FILES_FIELD) {
            while field
                .chunk()
                .await
                .map_err(|e| {
                    UploadError::InvalidMultipart(format!("Failed draining multipart field: {}", e))
                })?
                .is_some()
            {}
            continue;
        }

        let file_name = field.file_name().map(sanitize_filename).filter(|n| !n.is_empty());
        let content_type = field.content_type().map(|m| m.to_string());
        let mut temp = TempFile::create(&limits.spool_dir, file_name.as_deref()).await?;

        while let Some(chunk) = field.chunk().await.map_err(|e| {
            UploadError::InvalidMultipart(format!("Failed reading file chunk: {}", e))
        })? {
            if let Some(limit) = limits.max_file_size {
                if temp.size() + chunk.len() as u64 > limit {
                    return Err(UploadError::PayloadTooLarge {
                        name: file_name.unwrap_or_else(|| "upload.bin".to_string()),
                        limit,
                    });
                }
            }
            temp.write_chunk(&chunk).await?;
        }
        temp.finish().await?;

        debug!(
            file_name = ?file_name,
            bytes = temp.size(),
            sha256 = %temp.content_hash(),
            "Spooled form file"
        );

        files.push(SpooledFile {
            file_name,
            content_type,
            temp,
        });
    }

    Ok(files)
}

/// Strip any client-supplied directory components from a file name
fn sanitize_filename(name: &str) -> String {
    name.trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('.')
        .to_string()
}
