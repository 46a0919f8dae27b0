//! Stream coordinator
//!
//! Pipes the source stream into a destination write stream chunk by chunk.
//! Each chunk is handed to the writer before the next one is read, so a slow
//! destination slows the source down instead of growing a buffer.

use super::EngineError;
use crate::store::{ObjectHandle, WriteOptions};
use crate::upload::FileStream;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

/// Read size used when pulling from the source
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Write `source` to `object`, returning the number of bytes committed.
///
/// Any failure aborts the write stream so no partial object is committed.
pub(crate) async fn write_object(
    object: &ObjectHandle,
    options: WriteOptions,
    source: FileStream,
) -> Result<u64, EngineError> {
    let mut writer = object
        .create_write_stream(options)
        .await
        .map_err(EngineError::StreamError)?;

    let mut chunks = ReaderStream::with_capacity(source, CHUNK_SIZE);
    let mut written: u64 = 0;

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                writer.abort().await;
                return Err(EngineError::SourceError(e.to_string()));
            }
        };

        let len = chunk.len() as u64;
        if let Err(e) = writer.write(chunk).await {
            writer.abort().await;
            return Err(EngineError::StreamError(e));
        }
        written += len;
    }

    writer.finish().await.map_err(EngineError::StreamError)?;

    tracing::debug!(
        gcs.container = %object.container(),
        gcs.key = %object.key(),
        bytes = written,
        "Write stream finished"
    );

    Ok(written)
}
