//! Storage engine
//!
//! Persists uploaded files to an object store.
//!
//! An upload runs through three stages, strictly in order:
//!
//! 1. **Resolve** ([`resolver`]) - per-upload client, container, key, metadata
//! 2. **Stream** ([`stream`]) - pipe the file into a destination write stream
//! 3. **Post-write** ([`effects`]) - optional make-public + public URL
//!
//! The caller gets exactly one `Result` per upload. Independently of that,
//! every upload emits one [`EngineEvent`] (`file` or `error`) to subscribers.
//!
//! # Example
//!
//! ```
//! use gstore_uploadr::engine::{EngineOptions, GcsStorage};
//! use gstore_uploadr::store::{Client, MemoryStore};
//! use gstore_uploadr::upload::{FileInfo, UploadFile, UploadRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let engine = GcsStorage::new(
//!     EngineOptions::new()
//!         .with_client(Client::new(store.clone()))
//!         .with_container("bucket-test"),
//! )?;
//!
//! let file = UploadFile::from_bytes(FileInfo::new("file", "logo.jpg", "image/jpeg"), "jpeg");
//! let result = engine.handle_upload(&UploadRequest::default(), file).await?;
//!
//! assert_eq!(result.object.key(), "logo.jpg");
//! assert!(store.contains("bucket-test", "logo.jpg"));
//! # Ok(())
//! # }
//! ```

pub mod effects;
pub mod events;
pub mod options;
pub mod resolver;
pub mod stream;

pub use effects::{public_url, PUBLIC_URL_BASE};
pub use events::{EngineEvent, EventBus};
pub use options::{BoxError, ClientSource, ConfigValue, EngineOptions};
pub use resolver::{ConfigurationResolver, ResolvedUploadContext};

use crate::metrics;
use crate::store::{CustomerKey, ObjectHandle, StoreError, WriteOptions};
use crate::upload::{StorageEngine, UploadFile, UploadRequest, UploadResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;

/// Option a resolution error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveField {
    Metadata,
    Client,
    Container,
    ObjectKey,
}

impl fmt::Display for ResolveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Metadata => "metadata",
            Self::Client => "client",
            Self::Container => "container",
            Self::ObjectKey => "object key",
        })
    }
}

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid options; only returned while building the engine
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Failed to resolve {field}: {message}")]
    ResolutionError { field: ResolveField, message: String },

    #[error("Write stream error: {0}")]
    StreamError(StoreError),

    #[error("Source stream error: {0}")]
    SourceError(String),

    /// The object was written but could not be made public
    #[error("Visibility change error: {0}")]
    VisibilityChangeError(StoreError),

    #[error("Removal error: {0}")]
    RemovalError(StoreError),
}

impl EngineError {
    pub(crate) fn resolution(field: ResolveField, err: impl fmt::Display) -> Self {
        Self::ResolutionError {
            field,
            message: err.to_string(),
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationError(_) => "configuration",
            Self::ResolutionError { .. } => "resolution",
            Self::StreamError(_) => "stream",
            Self::SourceError(_) => "source",
            Self::VisibilityChangeError(_) => "visibility_change",
            Self::RemovalError(_) => "removal",
        }
    }
}

/// Storage engine writing uploads to a Cloud Storage compatible store.
///
/// Safe to share between concurrent uploads: per-upload state lives in each
/// call, and the only shared pieces are the options and the shared client.
#[derive(Debug)]
pub struct GcsStorage {
    resolver: ConfigurationResolver,
    make_public: bool,
    is_private: bool,
    encryption_key: Option<CustomerKey>,
    events: EventBus,
}

impl GcsStorage {
    /// Build an engine.
    ///
    /// Fails with [`EngineError::ConfigurationError`] when the client or
    /// container is missing or unusable, or the encryption key is invalid.
    pub fn new(options: EngineOptions) -> Result<Self, EngineError> {
        let resolver = ConfigurationResolver::new(&options)?;

        let encryption_key = options
            .encryption_key
            .as_deref()
            .map(CustomerKey::from_base64)
            .transpose()
            .map_err(|e| EngineError::ConfigurationError(e.to_string()))?;

        tracing::debug!(
            shared_client = resolver.shared_client().is_some(),
            make_public = options.make_public,
            set_content_type = options.set_content_type,
            "Storage engine created"
        );

        Ok(Self {
            resolver,
            make_public: options.make_public,
            is_private: options.is_private,
            encryption_key,
            events: EventBus::new(),
        })
    }

    /// Subscribe to `file` / `error` events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn resolver(&self) -> &ConfigurationResolver {
        &self.resolver
    }

    pub fn makes_public(&self) -> bool {
        self.make_public
    }

    /// Legacy flag, kept only so configurations carrying it still load
    pub fn is_private(&self) -> bool {
        self.is_private
    }

    /// Store one file
    #[tracing::instrument(
        name = "engine.handle_upload",
        skip(self, request, file),
        fields(
            file.field = %file.info.field_name,
            file.original_name = %file.info.original_name,
            gcs.container = tracing::field::Empty,
            gcs.key = tracing::field::Empty,
            upload.bytes = tracing::field::Empty
        )
    )]
    pub async fn handle_upload(
        &self,
        request: &UploadRequest,
        file: UploadFile,
    ) -> Result<UploadResult, EngineError> {
        let start_time = Instant::now();
        let mut backend = "unresolved";

        let outcome = self.upload(request, file, &mut backend).await;
        let duration = start_time.elapsed();

        match &outcome {
            Ok(result) => {
                metrics::record_upload_success(backend, result.size, duration.as_secs_f64());
                tracing::Span::current().record("upload.bytes", result.size);

                tracing::info!(
                    public_url = ?result.public_url,
                    duration_ms = duration.as_millis(),
                    "Upload completed"
                );

                self.events.emit(EngineEvent::File {
                    file: result.file.clone(),
                    object: result.object.clone(),
                });
            }
            Err(e) => {
                metrics::record_upload_failure(backend, duration.as_secs_f64());
                metrics::record_error(e.kind());

                tracing::error!(
                    error = %e,
                    error.kind = e.kind(),
                    duration_ms = duration.as_millis(),
                    "Upload failed"
                );

                self.events.emit(EngineEvent::Error { error: e.clone() });
            }
        }

        outcome
    }

    /// Store one file and hand the single outcome to `done`
    pub async fn handle_upload_with<F>(&self, request: &UploadRequest, file: UploadFile, done: F)
    where
        F: FnOnce(Result<UploadResult, EngineError>) + Send,
    {
        done(self.handle_upload(request, file).await)
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        file: UploadFile,
        backend: &mut &'static str,
    ) -> Result<UploadResult, EngineError> {
        let (info, source) = file.into_parts();

        let context = self.resolver.resolve(request, &info).await?;
        *backend = context.client.backend();

        let span = tracing::Span::current();
        span.record("gcs.container", context.container.as_str());
        span.record("gcs.key", context.object_key.as_str());

        let object = context.object();
        let options = WriteOptions {
            metadata: context.metadata,
            encryption_key: self.encryption_key.clone(),
        };
        let size = stream::write_object(&object, options, source).await?;

        let public_url = effects::apply(&object, self.make_public).await;
        if self.make_public {
            metrics::record_visibility_change(public_url.is_ok());
        }

        Ok(UploadResult {
            file: info,
            object,
            size,
            public_url: public_url?,
        })
    }

    /// Delete a stored object through the handle that wrote it
    #[tracing::instrument(
        name = "engine.remove_file",
        skip(self, _request, object),
        fields(gcs.container = %object.container(), gcs.key = %object.key())
    )]
    pub async fn remove_object(
        &self,
        _request: &UploadRequest,
        object: &ObjectHandle,
    ) -> Result<(), EngineError> {
        let outcome = object.delete().await.map_err(EngineError::RemovalError);
        metrics::record_removal(outcome.is_ok());

        match &outcome {
            Ok(()) => tracing::info!("Object removed"),
            Err(e) => {
                metrics::record_error(e.kind());
                tracing::error!(error = %e, "Removal failed");
                self.events.emit(EngineEvent::Error { error: e.clone() });
            }
        }

        outcome
    }

    /// Remove a file stored by an earlier upload
    pub async fn remove_file(
        &self,
        request: &UploadRequest,
        stored: &UploadResult,
    ) -> Result<(), EngineError> {
        self.remove_object(request, &stored.object).await
    }

    /// Remove a stored file and hand the single outcome to `done`
    pub async fn handle_removal_with<F>(
        &self,
        request: &UploadRequest,
        stored: &UploadResult,
        done: F,
    ) where
        F: FnOnce(Result<(), EngineError>) + Send,
    {
        done(self.remove_file(request, stored).await)
    }
}

#[async_trait]
impl StorageEngine for GcsStorage {
    async fn handle_file(
        &self,
        request: &UploadRequest,
        file: UploadFile,
    ) -> Result<UploadResult, EngineError> {
        self.handle_upload(request, file).await
    }

    async fn remove_file(
        &self,
        request: &UploadRequest,
        stored: &UploadResult,
    ) -> Result<(), EngineError> {
        GcsStorage::remove_file(self, request, stored).await
    }
}
