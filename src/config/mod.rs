//! Configuration module for Tsubame
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, plus a pure-environment mode used when the
//! relay is started without a config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod env;
mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("CLOUD_NAME", "demo");
/// assert_eq!(expand_env_vars("cloud: ${CLOUD_NAME}"), "cloud: demo");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid environment variable {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from process environment variables
    ///
    /// `PORT`, `CLOUD_NAME`, `API_KEY` and `API_SECRET` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        env::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server address cannot be empty".into(),
            ));
        }

        let provider = &self.provider;
        if provider.cloud_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Provider cloud_name cannot be empty".into(),
            ));
        }
        if provider.api_key.trim().is_empty() || provider.api_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Provider api_key and api_secret are required".into(),
            ));
        }
        if !is_valid_http_url(&provider.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid provider base_url '{}': must start with http:// or https://",
                provider.base_url
            )));
        }
        if provider.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Provider timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.upload.max_file_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be greater than zero (use null to disable)".into(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "Metrics port must be non-zero when metrics are enabled".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

/// Media provider configuration
///
/// Credentials are held here and handed to the provider client explicitly;
/// nothing is stored in process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub upload_preset: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
}

pub(crate) fn default_provider_base_url() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_provider_timeout() -> u64 {
    ProviderConfig::DEFAULT_TIMEOUT_SECONDS
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file in bytes. `None` disables the check.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: Option<u64>,
    /// Directory for spooled uploads. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl UploadConfig {
    /// Directory used for transient upload files
    pub fn spool_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            temp_dir: None,
        }
    }
}

fn default_max_file_size() -> Option<u64> {
    Some(10 * 1024 * 1024) // 10MB
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}
