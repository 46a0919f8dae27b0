//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        let config = config.normalize();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClientConfig;

    #[test]
    fn test_parse_memory_backend() {
        let config = ConfigLoader::parse(
            r#"
engine:
  container: bucket-test
  client:
    backend: memory
"#,
        )
        .unwrap();

        assert_eq!(config.engine.container.as_deref(), Some("bucket-test"));
        assert!(matches!(config.engine.client, Some(ClientConfig::Memory)));
    }

    #[test]
    fn test_parse_rejects_empty_container() {
        let result = ConfigLoader::parse(
            r#"
engine:
  container: "${GSTORE_UNSET_FOR_TEST:-}"
  client:
    backend: memory
"#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        let result = ConfigLoader::parse(
            r#"
engine:
  client:
    backend: s3
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
