//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` placeholders first
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  address: "127.0.0.1:3000"
provider:
  cloud_name: demo
  api_key: "123"
  api_secret: shh
"#;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = ConfigLoader::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:3000");
        assert_eq!(config.provider.base_url, "https://api.cloudinary.com");
        assert_eq!(config.provider.timeout_seconds, 60);
        assert_eq!(config.upload.max_file_size, Some(10 * 1024 * 1024));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_size_limit_can_be_disabled() {
        let yaml = format!("{MINIMAL}upload:\n  max_file_size: null\n");
        let config = ConfigLoader::from_yaml(&yaml).unwrap();
        assert_eq!(config.upload.max_file_size, None);
    }

    #[test]
    fn test_missing_provider_section_fails() {
        let result = ConfigLoader::from_yaml("server:\n  address: \"0.0.0.0:1\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load("/nonexistent/tsubame.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
