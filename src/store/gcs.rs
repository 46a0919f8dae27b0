//! Cloud Storage backend
//!
//! Talks to the Cloud Storage JSON API (or an emulator speaking it).
//!
//! | Operation | Request |
//! |-----------|---------|
//! | write stream | `POST /upload/storage/v1/b/{bucket}/o?uploadType=resumable&name={key}`, then one streamed `PUT {session}` |
//! | make public | `POST /storage/v1/b/{bucket}/o/{key}/acl` |
//! | delete | `DELETE /storage/v1/b/{bucket}/o/{key}` |
//!
//! The `PUT` body is fed from a bounded channel, so a slow upload stalls
//! [`ObjectWriter::write`] and, through it, reads from the source. The body
//! only ends cleanly after [`ObjectWriter::finish`]; a writer aborted or
//! dropped before that ends it with an error, so the session is never
//! finalized with a partial object.

use super::credentials::{AccessToken, CredentialsProvider};
use super::{ObjectStore, ObjectWriter, StoreError, WriteOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{future, stream, SinkExt, Stream, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Chunks buffered between the engine and the in-flight `PUT`
const WRITE_CHANNEL_CAPACITY: usize = 4;

/// RFC 3986 unreserved characters stay as-is, everything else (including `/`)
/// is escaped inside a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Cloud Storage client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    /// API endpoint, defaults to [`DEFAULT_ENDPOINT`]
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token; falls back to `GOOGLE_OAUTH_ACCESS_TOKEN`
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout for the control requests (not the streamed body)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Cloud Storage backend
#[derive(Debug)]
pub struct GcsStore {
    config: GcsConfig,
    endpoint: String,
    token: Option<AccessToken>,
    http_client: reqwest::Client,
}

impl GcsStore {
    /// Create a new client
    pub fn new(config: GcsConfig) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(StoreError::ConfigError(format!(
                "Invalid endpoint '{}': must start with http:// or https://",
                endpoint
            )));
        }

        let token = CredentialsProvider::from_config(&config)
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            endpoint,
            token,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn project_id(&self) -> Option<&str> {
        self.config.project_id.as_deref()
    }

    fn object_url(&self, container: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            utf8_percent_encode(container, PATH_SEGMENT),
            utf8_percent_encode(key, PATH_SEGMENT)
        )
    }

    fn upload_url(&self, container: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            utf8_percent_encode(container, PATH_SEGMENT)
        )
    }

    /// Attach auth and the control-request timeout
    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match &self.token {
            Some(token) => builder.header(AUTHORIZATION, token.bearer()),
            None => builder,
        };
        match self.config.timeout_seconds {
            Some(secs) => builder.timeout(Duration::from_secs(secs)),
            None => builder,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn backend(&self) -> &'static str {
        "gcs"
    }

    #[tracing::instrument(
        name = "gcs.create_write_stream",
        skip(self, options),
        fields(
            gcs.container = %container,
            gcs.key = %key,
            http.method = "POST",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn create_write_stream(
        &self,
        container: &str,
        key: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let mut init = self
            .prepare(self.http_client.post(self.upload_url(container)))
            .query(&[("uploadType", "resumable"), ("name", key)])
            .json(&options.metadata);
        if let Some(encryption_key) = &options.encryption_key {
            for (name, value) in encryption_key.headers() {
                init = init.header(name, value);
            }
        }

        let response = init.send().await.map_err(request_error)?;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        let response = check_status(response, container, key).await?;

        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                StoreError::RequestError("resumable upload response has no Location".into())
            })?;

        let (sender, receiver) = mpsc::channel::<io::Result<Bytes>>(WRITE_CHANNEL_CAPACITY);
        let finished = Arc::new(AtomicBool::new(false));
        let body = receiver.chain(end_of_body(finished.clone()));
        let mut put = self
            .http_client
            .put(session)
            .body(reqwest::Body::wrap_stream(body));
        if let Some(content_type) = options.content_type() {
            put = put.header(CONTENT_TYPE, content_type);
        }
        if let Some(encryption_key) = &options.encryption_key {
            for (name, value) in encryption_key.headers() {
                put = put.header(name, value);
            }
        }

        tracing::debug!("Resumable upload session opened");

        Ok(Box::new(GcsWriter {
            sender: Some(sender),
            finished,
            pending: Some(tokio::spawn(put.send())),
            container: container.to_string(),
            key: key.to_string(),
        }))
    }

    #[tracing::instrument(
        name = "gcs.make_public",
        skip(self),
        fields(gcs.container = %container, gcs.key = %key, http.method = "POST"),
        err
    )]
    async fn make_public(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let url = format!("{}/acl", self.object_url(container, key));
        let response = self
            .prepare(self.http_client.post(url))
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .map_err(request_error)?;

        check_status(response, container, key).await?;
        tracing::info!("Object made public");
        Ok(())
    }

    #[tracing::instrument(
        name = "gcs.delete",
        skip(self),
        fields(gcs.container = %container, gcs.key = %key, http.method = "DELETE"),
        err
    )]
    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let response = self
            .prepare(self.http_client.delete(self.object_url(container, key)))
            .send()
            .await
            .map_err(request_error)?;

        check_status(response, container, key).await?;
        tracing::info!("Object deleted");
        Ok(())
    }
}

/// Write side of a resumable upload session
struct GcsWriter {
    sender: Option<mpsc::Sender<io::Result<Bytes>>>,
    /// Set by `finish`; until then the body cannot end cleanly
    finished: Arc<AtomicBool>,
    pending: Option<JoinHandle<reqwest::Result<Response>>>,
    container: String,
    key: String,
}

impl GcsWriter {
    /// Wait for the `PUT` to settle and map its outcome
    async fn complete(&mut self) -> Result<(), StoreError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| StoreError::StreamClosed("upload already completed".into()))?;

        let response = pending
            .await
            .map_err(|e| StoreError::RequestError(format!("upload task failed: {}", e)))?
            .map_err(request_error)?;

        check_status(response, &self.container, &self.key).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for GcsWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        let sender = self
            .sender
            .as_mut()
            .ok_or_else(|| StoreError::StreamClosed("write after finish".into()))?;

        if sender.send(Ok(chunk)).await.is_ok() {
            return Ok(());
        }

        // The request stopped consuming the body, so it has already ended.
        self.sender = None;
        match self.complete().await {
            Err(e) => Err(e),
            Ok(()) => Err(StoreError::StreamClosed(
                "upload session closed before all bytes were sent".into(),
            )),
        }
    }

    async fn finish(&mut self) -> Result<(), StoreError> {
        // Dropping the sender ends the request body.
        self.finished.store(true, Ordering::Release);
        self.sender = None;
        self.complete().await
    }

    async fn abort(&mut self) {
        // Poison the body so the session is never finalized, without waiting
        // on a request that may have stopped reading.
        if let Some(mut sender) = self.sender.take() {
            let _ = sender.try_send(Err(io::Error::new(io::ErrorKind::Other, "upload aborted")));
        }
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        tracing::warn!(
            gcs.container = %self.container,
            gcs.key = %self.key,
            "Upload aborted"
        );
    }
}

impl Drop for GcsWriter {
    fn drop(&mut self) {
        // Dropped mid-transfer, e.g. when the caller's future is cancelled.
        if let Some(pending) = self.pending.take() {
            pending.abort();
            tracing::warn!(
                gcs.container = %self.container,
                gcs.key = %self.key,
                "Upload dropped before finish"
            );
        }
    }
}

/// Tail of the `PUT` body: nothing once finished, an error otherwise
fn end_of_body(finished: Arc<AtomicBool>) -> impl Stream<Item = io::Result<Bytes>> {
    stream::once(async move {
        if finished.load(Ordering::Acquire) {
            None
        } else {
            Some(Err(io::Error::new(
                io::ErrorKind::Other,
                "upload ended before finish",
            )))
        }
    })
    .filter_map(future::ready)
}

fn request_error(e: reqwest::Error) -> StoreError {
    StoreError::RequestError(e.to_string())
}

async fn check_status(
    response: Response,
    container: &str,
    key: &str,
) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound(format!("{}/{}", container, key)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::StatusError {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: Option<&str>) -> GcsStore {
        GcsStore::new(GcsConfig {
            endpoint: endpoint.map(str::to_owned),
            access_token: Some("test-token".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(store(None).endpoint(), "https://storage.googleapis.com");
    }

    #[test]
    fn test_custom_endpoint_trailing_slash() {
        assert_eq!(
            store(Some("http://localhost:4443/")).endpoint(),
            "http://localhost:4443"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = GcsStore::new(GcsConfig {
            endpoint: Some("localhost:4443".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(StoreError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_body_ends_cleanly_only_after_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let tail: Vec<_> = end_of_body(finished.clone()).collect().await;
        assert_eq!(tail.len(), 1);
        assert!(tail[0].is_err());

        finished.store(true, Ordering::Release);
        let tail: Vec<_> = end_of_body(finished).collect().await;
        assert!(tail.is_empty());
    }

    #[test]
    fn test_object_url_escapes_slashes() {
        let store = store(Some("http://localhost:4443"));
        assert_eq!(
            store.object_url("bucket-test", "test/1700000000 a.jpg"),
            "http://localhost:4443/storage/v1/b/bucket-test/o/test%2F1700000000%20a.jpg"
        );
        assert_eq!(
            store.upload_url("bucket-test"),
            "http://localhost:4443/upload/storage/v1/b/bucket-test/o"
        );
    }
}
