//! Environment-only configuration
//!
//! The relay can run with nothing but environment variables: the listening
//! port and the provider credentials are required, everything else falls back
//! to the same defaults as the YAML loader.

use super::{
    default_provider_base_url, Config, ConfigError, MetricsConfig, ProviderConfig, ServerConfig,
    UploadConfig,
};
use std::path::PathBuf;

pub(super) fn from_env() -> Result<Config, ConfigError> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Build a config from an arbitrary variable lookup
pub(super) fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |name: &str| {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
    };

    let port: u16 = parse_var("PORT", &required("PORT")?)?;

    let provider = ProviderConfig {
        cloud_name: required("CLOUD_NAME")?,
        api_key: required("API_KEY")?,
        api_secret: required("API_SECRET")?,
        base_url: lookup("PROVIDER_BASE_URL").unwrap_or_else(default_provider_base_url),
        upload_preset: lookup("UPLOAD_PRESET"),
        folder: lookup("UPLOAD_FOLDER"),
        timeout_seconds: match lookup("PROVIDER_TIMEOUT_SECONDS") {
            Some(v) => parse_var("PROVIDER_TIMEOUT_SECONDS", &v)?,
            None => ProviderConfig::DEFAULT_TIMEOUT_SECONDS,
        },
    };

    let mut upload = UploadConfig::default();
    if let Some(v) = lookup("MAX_FILE_SIZE") {
        upload.max_file_size = match v.trim() {
            "" | "off" | "none" => None,
            limit => Some(parse_var("MAX_FILE_SIZE", limit)?),
        };
    }
    upload.temp_dir = lookup("TEMP_DIR").map(PathBuf::from);

    let mut metrics = MetricsConfig::default();
    if let Some(v) = lookup("METRICS_PORT") {
        metrics.enabled = true;
        metrics.port = parse_var("METRICS_PORT", &v)?;
    }

    let config = Config {
        server: ServerConfig {
            address: format!("0.0.0.0:{port}"),
        },
        provider,
        upload,
        metrics,
    };
    config.validate()?;
    Ok(config)
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
