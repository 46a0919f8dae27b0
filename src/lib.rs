//! gstore-uploadr Library
//!
//! Streaming storage engine for file uploads, writing each uploaded file
//! straight into a Cloud Storage bucket.
//!
//! # Features
//!
//! - **Streaming**: file content is piped to the store chunk by chunk, with backpressure
//! - **Per-upload options**: client, container, key and metadata may each be fixed or resolved per upload
//! - **Public objects**: optionally made world-readable with a public URL reported
//! - **Observable**: `file` / `error` events, `tracing` spans, Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use gstore_uploadr::{config::Config, engine::GcsStorage};
//! use gstore_uploadr::upload::{UploadFile, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = GcsStorage::new(config.engine.to_options())?;
//!
//!     let file = UploadFile::open("logo.jpg", "file", "image/jpeg").await?;
//!     let stored = engine.handle_upload(&UploadRequest::default(), file).await?;
//!     println!("{:?}", stored.public_url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod metrics;
pub mod store;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineError, EngineOptions, GcsStorage};
pub use upload::{FileInfo, StorageEngine, UploadFile, UploadRequest, UploadResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
