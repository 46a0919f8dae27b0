//! Common test infrastructure
//!
//! Provides shared utilities for engine tests:
//! - A store wrapper that injects failures
//! - A connector that counts connections
//! - Source readers that fail or stall mid-stream
//! - Request / file helpers

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use gstore_uploadr::store::{
    Client, ClientConfig, Connector, MemoryStore, ObjectStore, ObjectWriter, StoreError,
    WriteOptions,
};
use gstore_uploadr::upload::{FileInfo, UploadFile, UploadRequest};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Test bucket name
pub const TEST_BUCKET: &str = "bucket-test";

/// Test project id
pub const TEST_PROJECT: &str = "multer-gstore-test";

/// Where a [`FaultyStore`] fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    CreateWriteStream,
    Write,
    Finish,
    MakePublic,
    Delete,
}

/// Memory store that fails at one chosen step
#[derive(Debug, Clone)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    fault: Fault,
    opened: Arc<AtomicUsize>,
    aborts: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
            opened: Arc::new(AtomicUsize::new(0)),
            aborts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Write streams requested so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Write streams aborted so far
    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn injected(&self) -> StoreError {
        StoreError::StatusError {
            status: 503,
            body: format!("injected {:?} failure", self.fault),
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    fn backend(&self) -> &'static str {
        "faulty"
    }

    async fn create_write_stream(
        &self,
        container: &str,
        key: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::CreateWriteStream {
            return Err(self.injected());
        }
        let inner = self
            .inner
            .create_write_stream(container, key, options)
            .await?;
        Ok(Box::new(FaultyWriter {
            inner,
            store: self.clone(),
        }))
    }

    async fn make_public(&self, container: &str, key: &str) -> Result<(), StoreError> {
        if self.fault == Fault::MakePublic {
            return Err(self.injected());
        }
        self.inner.make_public(container, key).await
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        if self.fault == Fault::Delete {
            return Err(self.injected());
        }
        self.inner.delete(container, key).await
    }
}

struct FaultyWriter {
    inner: Box<dyn ObjectWriter>,
    store: FaultyStore,
}

#[async_trait]
impl ObjectWriter for FaultyWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        if self.store.fault == Fault::Write {
            return Err(self.store.injected());
        }
        self.inner.write(chunk).await
    }

    async fn finish(&mut self) -> Result<(), StoreError> {
        if self.store.fault == Fault::Finish {
            return Err(self.store.injected());
        }
        self.inner.finish().await
    }

    async fn abort(&mut self) {
        self.store.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await
    }
}

/// Connector handing out clients over one shared memory store
#[derive(Debug, Clone, Default)]
pub struct CountingConnector {
    pub store: MemoryStore,
    connects: Arc<AtomicUsize>,
}

impl CountingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for CountingConnector {
    fn connect(&self, config: &ClientConfig) -> Result<Client, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match config {
            ClientConfig::Memory => Ok(Client::new(self.store.clone())),
            other => Err(StoreError::ConfigError(format!(
                "unsupported test backend: {:?}",
                other
            ))),
        }
    }
}

/// Reader that yields `prefix`, then fails
pub struct ErrorReader {
    prefix: Option<Bytes>,
}

impl ErrorReader {
    pub fn new(prefix: impl Into<Bytes>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl AsyncRead for ErrorReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.prefix.take() {
            Some(prefix) if !prefix.is_empty() => {
                let n = prefix.len().min(buf.remaining());
                buf.put_slice(&prefix[..n]);
                Poll::Ready(Ok(()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client disconnected",
            ))),
        }
    }
}

/// Reader that yields `prefix`, then never completes
pub struct StallingReader {
    prefix: Option<Bytes>,
}

impl StallingReader {
    pub fn new(prefix: impl Into<Bytes>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl AsyncRead for StallingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.prefix.take() {
            Some(prefix) => {
                let n = prefix.len().min(buf.remaining());
                buf.put_slice(&prefix[..n]);
                Poll::Ready(Ok(()))
            }
            None => Poll::Pending,
        }
    }
}

/// `image/jpeg` file in the `file` field
pub fn jpeg(name: &str, data: &'static [u8]) -> UploadFile {
    UploadFile::from_bytes(
        FileInfo::new("file", name, "image/jpeg"),
        Bytes::from_static(data),
    )
}

/// Request for `uri`
pub fn request(uri: &str) -> UploadRequest {
    UploadRequest::from_request(
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(())
            .unwrap(),
    )
}
