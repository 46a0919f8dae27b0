//! Engine options
//!
//! Every per-upload option is a [`ConfigValue`]: a fixed value, a synchronous
//! resolver, or an asynchronous resolver. All three are evaluated the same way
//! through [`ConfigValue::resolve`].
//!
//! # Example
//!
//! ```
//! use gstore_uploadr::engine::{ConfigValue, EngineOptions};
//! use gstore_uploadr::store::ClientConfig;
//!
//! let options = EngineOptions::new()
//!     .with_client(ClientConfig::Memory)
//!     .with_container("bucket-test")
//!     .with_object_key(ConfigValue::resolver(|_req, file| {
//!         Ok(format!("uploads/{}", file.original_name))
//!     }))
//!     .make_public(true);
//!
//! assert!(options.make_public);
//! ```

use crate::store::{Client, ClientConfig, Connector, DefaultConnector, Metadata};
use crate::upload::{FileInfo, UploadRequest};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type returned by resolvers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type SyncResolveFn<T> = dyn Fn(&UploadRequest, &FileInfo) -> Result<T, BoxError> + Send + Sync;

type AsyncResolveFn<T> =
    dyn Fn(&UploadRequest, &FileInfo) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync;

/// An option that is either fixed or computed per upload
pub enum ConfigValue<T> {
    Fixed(T),
    Resolver(Arc<SyncResolveFn<T>>),
    AsyncResolver(Arc<AsyncResolveFn<T>>),
}

impl<T> ConfigValue<T>
where
    T: Clone + Send + 'static,
{
    pub fn fixed(value: T) -> Self {
        Self::Fixed(value)
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&UploadRequest, &FileInfo) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(f))
    }

    /// Asynchronous resolver.
    ///
    /// The returned future may not borrow the request or file; copy what it
    /// needs before the `async move` block.
    pub fn async_resolver<F, Fut>(f: F) -> Self
    where
        F: Fn(&UploadRequest, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let boxed = move |request: &UploadRequest,
                          file: &FileInfo|
              -> BoxFuture<'static, Result<T, BoxError>> {
            Box::pin(f(request, file))
        };
        Self::AsyncResolver(Arc::new(boxed))
    }

    /// Whether the value depends on the upload
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Fixed(_))
    }

    /// Produce the concrete value for one upload
    pub async fn resolve(&self, request: &UploadRequest, file: &FileInfo) -> Result<T, BoxError> {
        match self {
            Self::Fixed(value) => Ok(value.clone()),
            Self::Resolver(f) => f(request, file),
            Self::AsyncResolver(f) => f(request, file).await,
        }
    }
}

impl<T: Clone> Clone for ConfigValue<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Resolver(f) => Self::Resolver(Arc::clone(f)),
            Self::AsyncResolver(f) => Self::AsyncResolver(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfigValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::AsyncResolver(_) => f.write_str("AsyncResolver(..)"),
        }
    }
}

impl From<&str> for ConfigValue<String> {
    fn from(value: &str) -> Self {
        Self::Fixed(value.to_string())
    }
}

impl From<String> for ConfigValue<String> {
    fn from(value: String) -> Self {
        Self::Fixed(value)
    }
}

/// Where the engine gets its store client from
#[derive(Debug, Clone)]
pub enum ClientSource {
    /// Ready-made client, shared by every upload
    Shared(Client),
    /// Connected once when the engine is built, then shared
    Config(ClientConfig),
    /// Resolved and connected for each upload; never reused
    Dynamic(ConfigValue<ClientConfig>),
}

impl From<Client> for ClientSource {
    fn from(client: Client) -> Self {
        Self::Shared(client)
    }
}

impl From<ClientConfig> for ClientSource {
    fn from(config: ClientConfig) -> Self {
        Self::Config(config)
    }
}

impl From<ConfigValue<ClientConfig>> for ClientSource {
    fn from(value: ConfigValue<ClientConfig>) -> Self {
        match value {
            ConfigValue::Fixed(config) => Self::Config(config),
            dynamic => Self::Dynamic(dynamic),
        }
    }
}

/// Options bundle an engine is built from
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Required
    pub client: Option<ClientSource>,
    /// Required
    pub container: Option<ConfigValue<String>>,
    /// Defaults to the file's original name
    pub object_key: ConfigValue<String>,
    /// Defaults to no metadata
    pub metadata: ConfigValue<Option<Metadata>>,
    pub make_public: bool,
    /// Accepted for compatibility; has no effect
    pub is_private: bool,
    /// Store the declared content type as `contentType` metadata
    pub set_content_type: bool,
    /// Base64 AES-256 customer-supplied key
    pub encryption_key: Option<String>,
    pub connector: Arc<dyn Connector>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            client: None,
            container: None,
            object_key: ConfigValue::resolver(|_, file| Ok(file.original_name.clone())),
            metadata: ConfigValue::Fixed(None),
            make_public: false,
            is_private: false,
            set_content_type: true,
            encryption_key: None,
            connector: Arc::new(DefaultConnector),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: impl Into<ClientSource>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_container(mut self, container: impl Into<ConfigValue<String>>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_object_key(mut self, object_key: impl Into<ConfigValue<String>>) -> Self {
        self.object_key = object_key.into();
        self
    }

    pub fn with_metadata(mut self, metadata: ConfigValue<Option<Metadata>>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn make_public(mut self, make_public: bool) -> Self {
        self.make_public = make_public;
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn set_content_type(mut self, set_content_type: bool) -> Self {
        self.set_content_type = set_content_type;
        self
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }
}
