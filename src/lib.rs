//! Tsubame Library
//!
//! Minimal media upload relay, plus the client that feeds it.
//!
//! # Features
//!
//! - **Relay**: one `POST /upload` route that forwards the first file of a
//!   multipart form to the media provider with a signed upload
//! - **Client queue**: per-file status, progress and ETA; all files uploaded
//!   concurrently, failures isolated per file
//! - **Two paths**: straight to the provider (unsigned, upload preset) or
//!   through the relay
//!
//! # Example
//!
//! ```no_run
//! use tsubame::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod provider;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use client::UploadQueue;
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
