//! Upload module
//!
//! Types exchanged between the upload pipeline and a storage engine.
//!
//! The pipeline parses the request, then calls the engine once per file with
//! an [`UploadRequest`] and an [`UploadFile`]. The engine answers with exactly
//! one `Result<UploadResult, EngineError>`.

use crate::engine::EngineError;
use crate::store::ObjectHandle;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Readable file content, positioned at the first byte
pub type FileStream = Pin<Box<dyn AsyncRead + Send>>;

/// Inbound request context.
///
/// Opaque to the engine; only handed to option resolvers.
#[derive(Debug)]
pub struct UploadRequest {
    parts: http::request::Parts,
}

impl UploadRequest {
    pub fn new(parts: http::request::Parts) -> Self {
        Self { parts }
    }

    /// Take the head of an HTTP request, dropping its body
    pub fn from_request<B>(request: http::Request<B>) -> Self {
        let (parts, _) = request.into_parts();
        Self { parts }
    }

    pub fn method(&self) -> &http::Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &http::Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }

    /// Typed values attached by earlier middleware (auth context, tenant, ...)
    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    pub fn parts(&self) -> &http::request::Parts {
        &self.parts
    }
}

impl Default for UploadRequest {
    /// `POST /` with no headers
    fn default() -> Self {
        let mut request = http::Request::new(());
        *request.method_mut() = http::Method::POST;
        Self::from_request(request)
    }
}

/// Descriptive part of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Form field the file arrived in
    pub field_name: String,
    /// Name of the file on the client's machine
    pub original_name: String,
    /// Declared MIME type
    pub content_type: String,
    /// Declared transfer encoding, if any
    pub encoding: Option<String>,
}

impl FileInfo {
    pub fn new(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type: content_type.into(),
            encoding: None,
        }
    }
}

/// A file waiting to be stored.
///
/// The stream is consumed by the engine; nothing keeps it after the upload
/// completes.
pub struct UploadFile {
    pub info: FileInfo,
    stream: FileStream,
}

impl UploadFile {
    pub fn new(info: FileInfo, stream: impl AsyncRead + Send + 'static) -> Self {
        Self {
            info,
            stream: Box::pin(stream),
        }
    }

    /// File backed by an in-memory buffer
    pub fn from_bytes(info: FileInfo, data: impl Into<Bytes>) -> Self {
        Self::new(info, Cursor::new(data.into()))
    }

    /// File backed by a file on disk; the original name is the file name
    pub async fn open(
        path: impl AsRef<Path>,
        field_name: &str,
        content_type: &str,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = tokio::fs::File::open(path).await?;

        Ok(Self::new(
            FileInfo::new(field_name, original_name, content_type),
            file,
        ))
    }

    pub fn into_parts(self) -> (FileInfo, FileStream) {
        (self.info, self.stream)
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Successful upload
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub file: FileInfo,
    /// Handle to the created object
    pub object: ObjectHandle,
    /// Bytes streamed to the store
    pub size: u64,
    /// Set only when the object was made public
    pub public_url: Option<String>,
}

/// Storage engine as seen by the upload pipeline
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Persist one file
    async fn handle_file(
        &self,
        request: &UploadRequest,
        file: UploadFile,
    ) -> Result<UploadResult, EngineError>;

    /// Remove a file stored by an earlier [`handle_file`](StorageEngine::handle_file)
    async fn remove_file(
        &self,
        request: &UploadRequest,
        stored: &UploadResult,
    ) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_default_request() {
        let request = UploadRequest::default();
        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(request.uri(), "/");
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_request_from_http() {
        let request = http::Request::builder()
            .method("PUT")
            .uri("/uploads?tenant=acme")
            .header("x-tenant", "acme")
            .body(Bytes::new())
            .unwrap();

        let request = UploadRequest::from_request(request);
        assert_eq!(request.uri().query(), Some("tenant=acme"));
        assert_eq!(request.headers()["x-tenant"], "acme");
    }

    #[tokio::test]
    async fn test_from_bytes_stream() {
        let file = UploadFile::from_bytes(
            FileInfo::new("file", "logo.jpg", "image/jpeg"),
            Bytes::from_static(b"jpeg"),
        );
        let (info, mut stream) = file.into_parts();

        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        assert_eq!(info.original_name, "logo.jpg");
        assert_eq!(data, b"jpeg");
    }

    #[tokio::test]
    async fn test_open_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo-github.jpg");
        std::fs::write(&path, b"github").unwrap();

        let file = UploadFile::open(&path, "logos", "image/jpeg").await.unwrap();
        assert_eq!(file.info.original_name, "logo-github.jpg");
        assert_eq!(file.info.field_name, "logos");
    }
}
