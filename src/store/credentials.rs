//! Store credentials
//!
//! Credentials are passed through, never minted or refreshed here.
//!
//! - [`AccessToken`] - OAuth2 bearer token sent with Cloud Storage API calls
//! - [`CustomerKey`] - customer-supplied AES-256 encryption key (CSEK)
//!
//! # Example
//!
//! ```
//! use gstore_uploadr::store::CustomerKey;
//!
//! // 32 zero bytes, base64 encoded
//! let key = CustomerKey::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap();
//! assert_eq!(key.algorithm(), "AES256");
//! ```

use crate::store::GcsConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Environment variable consulted when no token is configured
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Required raw length of a customer-supplied key
const CUSTOMER_KEY_LEN: usize = 32;

/// Credential loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// OAuth2 bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token, rejecting blank values
    pub fn new(token: impl Into<String>) -> Result<Self, CredentialsError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CredentialsError::InvalidCredentials(
                "access token is empty".into(),
            ));
        }
        Ok(Self(token))
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

// Never print the token itself.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Customer-supplied encryption key
#[derive(Clone, PartialEq, Eq)]
pub struct CustomerKey {
    key: String,
    key_sha256: String,
}

impl CustomerKey {
    /// Parse a base64 encoded 256-bit key
    pub fn from_base64(encoded: &str) -> Result<Self, CredentialsError> {
        let raw = STANDARD.decode(encoded.trim()).map_err(|e| {
            CredentialsError::InvalidCredentials(format!("encryption key is not base64: {}", e))
        })?;

        if raw.len() != CUSTOMER_KEY_LEN {
            return Err(CredentialsError::InvalidCredentials(format!(
                "encryption key must be {} bytes, got {}",
                CUSTOMER_KEY_LEN,
                raw.len()
            )));
        }

        Ok(Self {
            key: STANDARD.encode(&raw),
            key_sha256: STANDARD.encode(Sha256::digest(&raw)),
        })
    }

    pub fn algorithm(&self) -> &'static str {
        "AES256"
    }

    /// Base64 encoded key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Base64 encoded SHA-256 of the raw key
    pub fn key_sha256(&self) -> &str {
        &self.key_sha256
    }

    /// Request headers identifying this key
    pub fn headers(&self) -> [(&'static str, &str); 3] {
        [
            ("x-goog-encryption-algorithm", self.algorithm()),
            ("x-goog-encryption-key", self.key()),
            ("x-goog-encryption-key-sha256", self.key_sha256()),
        ]
    }
}

impl fmt::Debug for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerKey")
            .field("key_sha256", &self.key_sha256)
            .finish()
    }
}

/// Factory for loading credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load the access token from the environment
    pub fn from_env() -> Result<AccessToken, CredentialsError> {
        let token = std::env::var(ACCESS_TOKEN_ENV).map_err(|_| {
            CredentialsError::MissingCredentials(format!("{} not set", ACCESS_TOKEN_ENV))
        })?;
        AccessToken::new(token)
    }

    /// Resolve the token for a client.
    ///
    /// The configured token wins, then the environment. `Ok(None)` means the
    /// client runs unauthenticated, which is what emulators expect.
    pub fn from_config(config: &GcsConfig) -> Result<Option<AccessToken>, CredentialsError> {
        match config.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => AccessToken::new(token).map(Some),
            _ => match Self::from_env() {
                Ok(token) => Ok(Some(token)),
                Err(CredentialsError::MissingCredentials(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ZERO_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn test_customer_key_hash() {
        let key = CustomerKey::from_base64(ZERO_KEY).unwrap();
        assert_eq!(key.key(), ZERO_KEY);
        // sha256 of 32 zero bytes
        assert_eq!(
            key.key_sha256(),
            "Zmh6rfhivXdsj8GLjp+OIAiXFIVu4jOzkCpZHQ1fKSU="
        );
    }

    #[test]
    fn test_customer_key_wrong_length() {
        let result = CustomerKey::from_base64("c2hvcnQ=");
        assert!(matches!(
            result,
            Err(CredentialsError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_customer_key_not_base64() {
        assert!(CustomerKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let token = AccessToken::new("ya29.secret").unwrap();
        assert!(!format!("{:?}", token).contains("secret"));

        let key = CustomerKey::from_base64(ZERO_KEY).unwrap();
        assert!(!format!("{:?}", key).contains(ZERO_KEY));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(AccessToken::new("  ").is_err());
    }

    #[test]
    #[serial]
    fn test_from_config_prefers_configured_token() {
        std::env::set_var(ACCESS_TOKEN_ENV, "from-env");
        let config = GcsConfig {
            access_token: Some("from-config".into()),
            ..Default::default()
        };

        let token = CredentialsProvider::from_config(&config).unwrap().unwrap();
        assert_eq!(token.bearer(), "Bearer from-config");
        std::env::remove_var(ACCESS_TOKEN_ENV);
    }

    #[test]
    #[serial]
    fn test_from_config_falls_back_to_env() {
        std::env::set_var(ACCESS_TOKEN_ENV, "from-env");
        let token = CredentialsProvider::from_config(&GcsConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(token.bearer(), "Bearer from-env");
        std::env::remove_var(ACCESS_TOKEN_ENV);
    }

    #[test]
    #[serial]
    fn test_from_config_anonymous() {
        std::env::remove_var(ACCESS_TOKEN_ENV);
        let token = CredentialsProvider::from_config(&GcsConfig::default()).unwrap();
        assert!(token.is_none());
    }
}
