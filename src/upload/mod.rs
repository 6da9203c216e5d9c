//! Upload module
//!
//! Server-side intake of relayed uploads: multipart form parsing and the
//! temp files that hold each part until it is forwarded.

use thiserror::Error;

pub mod multipart;
pub mod temp_file;

/// Form field carrying the uploaded files
pub const FILES_FIELD: &str = "files";

/// Upload intake errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid multipart body: {0}")]
    InvalidMultipart(String),

    #[error("File '{name}' exceeds the {limit} byte limit")]
    PayloadTooLarge { name: String, limit: u64 },

    #[error("Temp file already finished")]
    AlreadyFinished,
}
