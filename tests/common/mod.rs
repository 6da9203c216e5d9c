//! Shared test infrastructure
//!
//! - Relay server management (bound to an ephemeral port)
//! - Provider configuration pointing at a wiremock server
//! - Canned provider responses

#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tsubame::config::{Config, MetricsConfig, ProviderConfig, ServerConfig, UploadConfig};
use tsubame::provider::{MediaUploader, ProviderClient};
use tsubame::server::RelayServer;

pub const CLOUD_NAME: &str = "demo";
pub const API_KEY: &str = "test-api-key";
pub const API_SECRET: &str = "test-api-secret";
pub const UPLOAD_PATH: &str = "/v1_1/demo/auto/upload";

/// Provider config aimed at a mock server
pub fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        cloud_name: CLOUD_NAME.into(),
        api_key: API_KEY.into(),
        api_secret: API_SECRET.into(),
        base_url: base_url.into(),
        upload_preset: None,
        folder: None,
        timeout_seconds: 10,
    }
}

/// Relay config with an ephemeral port and an explicit spool directory
pub fn relay_config(provider_url: &str, spool_dir: &Path, max_file_size: Option<u64>) -> Config {
    Config {
        server: ServerConfig {
            address: "127.0.0.1:0".into(),
        },
        provider: provider_config(provider_url),
        upload: UploadConfig {
            max_file_size,
            temp_dir: Some(spool_dir.to_path_buf()),
        },
        metrics: MetricsConfig::default(),
    }
}

/// What the provider answers for a successful upload
pub fn provider_success(public_id: &str) -> Value {
    json!({
        "public_id": public_id,
        "resource_type": "image",
        "bytes": 1024,
        "url": format!("http://res.test/{}/image/upload/{}.png", CLOUD_NAME, public_id),
        "secure_url": format!("https://res.test/{}/image/upload/{}.png", CLOUD_NAME, public_id),
    })
}

/// A running relay
pub struct RelayTestEnv {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl RelayTestEnv {
    /// Start a relay backed by the real provider client
    pub async fn start(config: Config) -> Self {
        let provider = ProviderClient::new(config.provider.clone()).expect("provider client");
        Self::start_with(config, Arc::new(provider)).await
    }

    /// Start a relay backed by any uploader
    pub async fn start_with(config: Config, uploader: Arc<dyn MediaUploader>) -> Self {
        let server = RelayServer::new(&config, uploader)
            .await
            .expect("relay should bind");
        let addr = server.local_addr();

        let server_handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");

        Self {
            addr,
            client,
            _server_handle: server_handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Drop for RelayTestEnv {
    fn drop(&mut self) {
        self._server_handle.abort();
    }
}

/// Write `count` files of `size` ASCII bytes into `dir`
pub fn write_fixtures(dir: &Path, names: &[&str], size: usize) -> Vec<std::path::PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, vec![b'a'; size]).expect("write fixture");
            path
        })
        .collect()
}
