//! Configuration module for gstore-uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! # Example
//!
//! ```yaml
//! engine:
//!   container: "${GCS_BUCKET:-bucket-test}"
//!   client:
//!     backend: gcs
//!     project_id: "${GCS_PROJECT_ID:-}"
//!     access_token: "${GOOGLE_OAUTH_ACCESS_TOKEN:-}"
//!   key_prefix: "uploads/"
//!   make_public: true
//! logging:
//!   level: info
//!   format: json
//! metrics:
//!   enabled: true
//! ```

use crate::engine::{ConfigValue, EngineOptions};
use crate::store::{ClientConfig, GcsConfig};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR.captures_iter(s) {
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

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn is_unexpanded(value: &str) -> bool {
    ENV_VAR.is_match(value)
}

/// `None` for blank strings
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Blank optional values left by `${VAR:-}` count as unset.
    ///
    /// The container is kept as written so a blank one fails validation.
    pub(crate) fn normalize(mut self) -> Self {
        self.engine.encryption_key = non_blank(self.engine.encryption_key);
        if let Some(ClientConfig::Gcs(gcs)) = self.engine.client.as_mut() {
            gcs.project_id = non_blank(gcs.project_id.take());
            gcs.endpoint = non_blank(gcs.endpoint.take());
            gcs.access_token = non_blank(gcs.access_token.take());
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(container) = &self.engine.container {
            if container.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Container must not be empty".into(),
                ));
            }
            if is_unexpanded(container) {
                return Err(ConfigError::ValidationError(format!(
                    "Container '{}' references an unset environment variable",
                    container
                )));
            }
        }

        if self.engine.key_prefix.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid key_prefix '{}': must not start with '/'",
                self.engine.key_prefix
            )));
        }

        if let Some(ClientConfig::Gcs(gcs)) = &self.engine.client {
            validate_gcs(gcs)?;
        }

        if let Some(key) = &self.engine.encryption_key {
            if is_unexpanded(key) {
                return Err(ConfigError::ValidationError(
                    "encryption_key references an unset environment variable".into(),
                ));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be 'trace', 'debug', 'info', 'warn', or 'error'",
                    other
                )))
            }
        }

        Ok(())
    }
}

fn validate_gcs(gcs: &GcsConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &gcs.endpoint {
        if !is_valid_http_url(endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid GCS endpoint '{}': must start with http:// or https://",
                endpoint
            )));
        }
    }

    for (name, value) in [
        ("project_id", &gcs.project_id),
        ("access_token", &gcs.access_token),
    ] {
        if value.as_deref().is_some_and(is_unexpanded) {
            return Err(ConfigError::ValidationError(format!(
                "GCS {} references an unset environment variable",
                name
            )));
        }
    }

    if gcs.timeout_seconds == Some(0) {
        return Err(ConfigError::ValidationError(
            "GCS timeout_seconds must be greater than 0".into(),
        ));
    }

    Ok(())
}

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Destination container (bucket)
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub client: Option<ClientConfig>,
    /// Prepended to the original file name to build the object key
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub make_public: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "default_set_content_type")]
    pub set_content_type: bool,
    /// Base64 AES-256 customer-supplied encryption key
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container: None,
            client: None,
            key_prefix: String::new(),
            make_public: false,
            is_private: false,
            set_content_type: default_set_content_type(),
            encryption_key: None,
        }
    }
}

fn default_set_content_type() -> bool {
    true
}

impl EngineConfig {
    /// Engine options described by this section.
    ///
    /// Missing `client` or `container` is left for the engine to reject.
    pub fn to_options(&self) -> EngineOptions {
        let mut options = EngineOptions::new()
            .make_public(self.make_public)
            .private(self.is_private)
            .set_content_type(self.set_content_type);

        if let Some(client) = &self.client {
            options = options.with_client(client.clone());
        }
        if let Some(container) = &self.container {
            options = options.with_container(container.as_str());
        }
        if !self.key_prefix.is_empty() {
            let prefix = self.key_prefix.clone();
            options = options.with_object_key(ConfigValue::resolver(move |_, file| {
                Ok(format!("{}{}", prefix, file.original_name))
            }));
        }
        if let Some(key) = &self.encryption_key {
            options = options.with_encryption_key(key.as_str());
        }

        options
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{FileInfo, UploadRequest};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.engine.set_content_type);
        assert!(!config.engine.make_public);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_with_empty_default() {
        assert_eq!(expand_env_vars("a${GSTORE_UNSET_FOR_TEST:-}b"), "ab");
        assert_eq!(
            expand_env_vars("${GSTORE_UNSET_FOR_TEST}"),
            "${GSTORE_UNSET_FOR_TEST}"
        );
    }

    #[test]
    fn test_key_prefix_must_be_relative() {
        let mut config = Config::default();
        config.engine.key_prefix = "/uploads/".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_blank_container_rejected() {
        let mut config = Config::default();
        config.engine.container = Some("  ".into());

        let config = config.normalize();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Container must not be empty"));
    }

    #[test]
    fn test_invalid_gcs_endpoint() {
        let mut config = Config::default();
        config.engine.client = Some(ClientConfig::Gcs(GcsConfig {
            endpoint: Some("storage.googleapis.com".into()),
            ..Default::default()
        }));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_normalize_blank_values() {
        let mut config = Config::default();
        config.engine.encryption_key = Some("  ".into());
        config.engine.client = Some(ClientConfig::Gcs(GcsConfig {
            access_token: Some(String::new()),
            ..Default::default()
        }));

        let config = config.normalize();
        assert!(config.engine.encryption_key.is_none());
        match config.engine.client {
            Some(ClientConfig::Gcs(gcs)) => assert!(gcs.access_token.is_none()),
            other => panic!("unexpected client {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_to_options_applies_prefix() {
        let engine = EngineConfig {
            container: Some("bucket-test".into()),
            client: Some(ClientConfig::Memory),
            key_prefix: "test/".into(),
            make_public: true,
            ..Default::default()
        };

        let options = engine.to_options();
        assert!(options.make_public);
        assert!(options.client.is_some());

        let key = options
            .object_key
            .resolve(
                &UploadRequest::default(),
                &FileInfo::new("file", "logo.jpg", "image/jpeg"),
            )
            .await
            .unwrap();
        assert_eq!(key, "test/logo.jpg");
    }
}
