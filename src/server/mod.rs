//! HTTP server module
//!
//! The relay: receives multipart uploads and forwards them to the provider.

pub mod relay;

use crate::config::Config;
use crate::provider::{ProviderClient, ProviderError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use relay::RelayServer;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Provider setup failed: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// JSON envelope returned by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl RelayResponse {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            message: "File uploaded successfully".to_string(),
            result,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            result: serde_json::Value::Null,
        }
    }
}

/// Relay server wired to the real provider client
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config
            .server
            .address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ServerError::BindError(format!("{}", e)))?;

        Ok(Self { config })
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until_signal(tokio::signal::ctrl_c()).await
    }

    /// Run until `signal` resolves
    ///
    /// A signal that fails to install is returned as a `RuntimeError` instead
    /// of being taken as a shutdown request.
    pub async fn run_until_signal<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let provider = ProviderClient::new(self.config.provider.clone())?;
        let relay = RelayServer::new(&self.config, Arc::new(provider)).await?;

        tokio::select! {
            result = relay.run() => result?,
            signal = signal => {
                signal.map_err(|e| ServerError::RuntimeError(e.to_string()))?;
            }
        }

        info!("Shutting down server");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, ProviderConfig, ServerConfig, UploadConfig};

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
            },
            provider: ProviderConfig {
                cloud_name: "demo".into(),
                api_key: "key".into(),
                api_secret: "secret".into(),
                base_url: "http://127.0.0.1:1".into(),
                upload_preset: None,
                folder: None,
                timeout_seconds: 5,
            },
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_server_new() {
        assert!(Server::new(test_config()).is_ok());
    }

    #[test]
    fn test_server_invalid_address() {
        let mut config = test_config();
        config.server.address = "invalid".into();
        assert!(Server::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let server = Server::new(test_config()).unwrap();
        let result = server.run_until_signal(async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_signal_install_failure_is_an_error() {
        let server = Server::new(test_config()).unwrap();
        let result = server
            .run_until_signal(async { Err(std::io::Error::other("signal handler unavailable")) })
            .await;

        match result {
            Err(ServerError::RuntimeError(msg)) => {
                assert!(msg.contains("signal handler unavailable"))
            }
            other => panic!("Expected RuntimeError, got {:?}", other),
        }
    }

    #[test]
    fn test_relay_response_serialization() {
        let ok = serde_json::to_value(RelayResponse::ok(serde_json::json!({"url": "x"}))).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["message"], "File uploaded successfully");
        assert_eq!(ok["result"]["url"], "x");

        let failure = serde_json::to_value(RelayResponse::failure("nope")).unwrap();
        assert_eq!(failure["success"], false);
        assert!(failure["result"].is_null());
    }
}
