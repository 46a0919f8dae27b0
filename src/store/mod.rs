//! Object store module
//!
//! The destination side of an upload. The engine only talks to the store
//! through the [`ObjectStore`] trait and the lightweight handles built on top
//! of it:
//!
//! ```text
//! Client ──container(id)──► Container ──object(key)──► ObjectHandle
//!                                                        ├── create_write_stream(options)
//!                                                        ├── make_public()
//!                                                        └── delete()
//! ```
//!
//! # Backends
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `gcs` | [`GcsStore`] | Cloud Storage JSON API, resumable uploads |
//! | `memory` | [`MemoryStore`] | In-process, shared by clone |
//!
//! # Example
//!
//! ```
//! use gstore_uploadr::store::{Client, MemoryStore, ObjectWriter, WriteOptions};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(MemoryStore::new());
//! let object = client.container("bucket-test").object("hello.txt");
//!
//! let mut writer = object.create_write_stream(WriteOptions::default()).await?;
//! writer.write(Bytes::from("Hello, World!")).await?;
//! writer.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod gcs;
pub mod memory;

pub use credentials::{AccessToken, CredentialsError, CredentialsProvider, CustomerKey};
pub use gcs::{GcsConfig, GcsStore};
pub use memory::{MemoryStore, StoredObject};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Object metadata as sent to the store (`contentType`, `cacheControl`,
/// custom `metadata`, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the object's content type
pub const CONTENT_TYPE_KEY: &str = "contentType";

/// Object store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Unexpected status {status}: {body}")]
    StatusError { status: u16, body: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Write stream closed: {0}")]
    StreamClosed(String),
}

/// Options applied when opening a write stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Metadata stored with the object
    pub metadata: Metadata,
    /// Customer-supplied encryption key, if any
    pub encryption_key: Option<CustomerKey>,
}

impl WriteOptions {
    /// Content type carried by the metadata, if any
    pub fn content_type(&self) -> Option<&str> {
        self.metadata
            .get(CONTENT_TYPE_KEY)
            .and_then(serde_json::Value::as_str)
    }
}

/// Write side of an object upload.
///
/// Bytes handed to [`write`](ObjectWriter::write) are only durable once
/// [`finish`](ObjectWriter::finish) returns `Ok`. `write` may wait while the
/// destination is slow, which is how backpressure reaches the source.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Send the next chunk
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError>;

    /// Close the stream and commit the object
    async fn finish(&mut self) -> Result<(), StoreError>;

    /// Drop the stream without committing anything
    async fn abort(&mut self);
}

/// Object store backend
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Short backend name used in logs and metrics
    fn backend(&self) -> &'static str;

    /// Open a write stream to `container/key`
    async fn create_write_stream(
        &self,
        container: &str,
        key: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError>;

    /// Grant public read access to `container/key`
    async fn make_public(&self, container: &str, key: &str) -> Result<(), StoreError>;

    /// Delete `container/key`
    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError>;
}

/// Shared handle to an object store backend.
///
/// Cloning is cheap; all clones talk to the same backend instance.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn ObjectStore>,
}

impl Client {
    /// Wrap a backend
    pub fn new(store: impl ObjectStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Wrap an already shared backend
    pub fn from_arc(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Backend name
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Handle to a container
    pub fn container(&self, id: impl Into<String>) -> Container {
        Container {
            client: self.clone(),
            name: id.into(),
        }
    }

    /// Whether both handles point at the same backend instance
    pub fn ptr_eq(&self, other: &Client) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.store), Arc::as_ptr(&other.store))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("store", &self.store).finish()
    }
}

/// Handle to a container (bucket)
#[derive(Debug, Clone)]
pub struct Container {
    client: Client,
    name: String,
}

impl Container {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to an object in this container
    pub fn object(&self, key: impl Into<String>) -> ObjectHandle {
        ObjectHandle {
            client: self.client.clone(),
            container: self.name.clone(),
            key: key.into(),
        }
    }
}

/// Handle to a single destination object
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    client: Client,
    container: String,
    key: String,
}

impl ObjectHandle {
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Client this handle was created from
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn create_write_stream(
        &self,
        options: WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.client
            .store
            .create_write_stream(&self.container, &self.key, options)
            .await
    }

    pub async fn make_public(&self) -> Result<(), StoreError> {
        self.client
            .store
            .make_public(&self.container, &self.key)
            .await
    }

    pub async fn delete(&self) -> Result<(), StoreError> {
        self.client.store.delete(&self.container, &self.key).await
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.client.ptr_eq(&other.client)
            && self.container == other.container
            && self.key == other.key
    }
}

/// Parameters for constructing a client
///
/// ```yaml
/// client:
///   backend: gcs
///   project_id: "my-project"
///   endpoint: "http://localhost:4443"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ClientConfig {
    Gcs(GcsConfig),
    Memory,
}

/// Builds clients from [`ClientConfig`] values
pub trait Connector: Send + Sync + fmt::Debug {
    fn connect(&self, config: &ClientConfig) -> Result<Client, StoreError>;
}

/// Connector for the built-in backends
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(&self, config: &ClientConfig) -> Result<Client, StoreError> {
        match config {
            ClientConfig::Gcs(gcs) => Ok(Client::new(GcsStore::new(gcs.clone())?)),
            ClientConfig::Memory => Ok(Client::new(MemoryStore::new())),
        }
    }
}
