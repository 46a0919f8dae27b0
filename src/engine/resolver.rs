//! Configuration resolver
//!
//! Turns [`EngineOptions`] into a [`ResolvedUploadContext`] for one upload.
//!
//! Resolution runs sequentially in a fixed order:
//!
//! 1. metadata
//! 2. client (only when dynamic)
//! 3. container
//! 4. object key
//! 5. `contentType` merge (when `set_content_type` is on)
//!
//! Metadata goes first so that a failing metadata resolver stops the upload
//! before any client is connected.

use super::options::{ClientSource, ConfigValue, EngineOptions};
use super::{EngineError, ResolveField};
use crate::store::{Client, ClientConfig, Connector, Metadata, ObjectHandle, CONTENT_TYPE_KEY};
use crate::upload::{FileInfo, UploadRequest};
use serde_json::Value;
use std::sync::Arc;

/// Everything needed to write one upload
#[derive(Debug, Clone)]
pub struct ResolvedUploadContext {
    pub client: Client,
    pub container: String,
    pub object_key: String,
    /// Possibly empty
    pub metadata: Metadata,
    /// `contentType` from the final metadata
    pub content_type: Option<String>,
}

impl ResolvedUploadContext {
    /// Handle to the destination object
    pub fn object(&self) -> ObjectHandle {
        self.client
            .container(self.container.as_str())
            .object(self.object_key.as_str())
    }
}

impl PartialEq for ResolvedUploadContext {
    fn eq(&self, other: &Self) -> bool {
        self.client.ptr_eq(&other.client)
            && self.container == other.container
            && self.object_key == other.object_key
            && self.metadata == other.metadata
            && self.content_type == other.content_type
    }
}

/// Client as held by the engine
#[derive(Debug, Clone)]
enum EngineClient {
    /// Built once, shared read-only by all uploads
    Ready(Client),
    /// Connected per upload
    Dynamic(ConfigValue<ClientConfig>),
}

/// Resolves per-upload configuration
#[derive(Debug, Clone)]
pub struct ConfigurationResolver {
    client: EngineClient,
    container: ConfigValue<String>,
    object_key: ConfigValue<String>,
    metadata: ConfigValue<Option<Metadata>>,
    set_content_type: bool,
    connector: Arc<dyn Connector>,
}

impl ConfigurationResolver {
    /// Validate options and connect a fixed client.
    ///
    /// Fails when the client or container is missing, when a fixed container
    /// is empty, or when a fixed client configuration cannot be connected.
    pub fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        let client = match &options.client {
            None => {
                return Err(EngineError::ConfigurationError(
                    "missing required option `client`".into(),
                ))
            }
            Some(ClientSource::Shared(client)) => EngineClient::Ready(client.clone()),
            Some(ClientSource::Config(config)) => {
                let client = options.connector.connect(config).map_err(|e| {
                    EngineError::ConfigurationError(format!("failed to create client: {}", e))
                })?;
                EngineClient::Ready(client)
            }
            Some(ClientSource::Dynamic(value)) => EngineClient::Dynamic(value.clone()),
        };

        let container = match &options.container {
            None => {
                return Err(EngineError::ConfigurationError(
                    "missing required option `container`".into(),
                ))
            }
            Some(ConfigValue::Fixed(name)) if name.trim().is_empty() => {
                return Err(EngineError::ConfigurationError(
                    "option `container` is empty".into(),
                ))
            }
            Some(value) => value.clone(),
        };

        Ok(Self {
            client,
            container,
            object_key: options.object_key.clone(),
            metadata: options.metadata.clone(),
            set_content_type: options.set_content_type,
            connector: Arc::clone(&options.connector),
        })
    }

    /// Shared client, when the engine has one
    pub fn shared_client(&self) -> Option<&Client> {
        match &self.client {
            EngineClient::Ready(client) => Some(client),
            EngineClient::Dynamic(_) => None,
        }
    }

    /// Resolve every option for one upload
    pub async fn resolve(
        &self,
        request: &UploadRequest,
        file: &FileInfo,
    ) -> Result<ResolvedUploadContext, EngineError> {
        let mut metadata = self
            .metadata
            .resolve(request, file)
            .await
            .map_err(|e| EngineError::resolution(ResolveField::Metadata, e))?
            .unwrap_or_default();

        let client = match &self.client {
            EngineClient::Ready(client) => client.clone(),
            EngineClient::Dynamic(value) => {
                let config = value
                    .resolve(request, file)
                    .await
                    .map_err(|e| EngineError::resolution(ResolveField::Client, e))?;
                self.connector
                    .connect(&config)
                    .map_err(|e| EngineError::resolution(ResolveField::Client, e))?
            }
        };

        let container = non_empty(
            ResolveField::Container,
            self.container.resolve(request, file).await,
        )?;
        let object_key = non_empty(
            ResolveField::ObjectKey,
            self.object_key.resolve(request, file).await,
        )?;

        // The declared type wins over a resolver-provided contentType.
        if self.set_content_type {
            metadata.insert(
                CONTENT_TYPE_KEY.to_string(),
                Value::String(file.content_type.clone()),
            );
        }
        let content_type = metadata
            .get(CONTENT_TYPE_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(ResolvedUploadContext {
            client,
            container,
            object_key,
            metadata,
            content_type,
        })
    }
}

fn non_empty(
    field: ResolveField,
    value: Result<String, super::options::BoxError>,
) -> Result<String, EngineError> {
    let value = value.map_err(|e| EngineError::resolution(field, e))?;
    if value.trim().is_empty() {
        return Err(EngineError::resolution(field, "resolved to an empty value"));
    }
    Ok(value)
}
