//! In-memory backend
//!
//! Objects live in a map shared by every clone of the store. Writes are
//! buffered per stream and only become visible on `finish`.

use super::{Metadata, ObjectStore, ObjectWriter, StoreError, WriteOptions};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type ObjectKey = (String, String);

/// A committed object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Bytes,
    pub metadata: Metadata,
    pub public: bool,
    /// SHA-256 (base64) of the customer key the object was written with
    pub encryption_key_sha256: Option<String>,
}

/// In-memory object store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<ObjectKey, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a committed object
    pub fn get(&self, container: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, container: &str, key: &str) -> bool {
        self.get(container, key).is_some()
    }

    /// Keys committed in `container`, sorted
    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_write_stream(
        &self,
        container: &str,
        key: &str,
        options: WriteOptions,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            target: Some((container.to_string(), key.to_string())),
            buffer: BytesMut::new(),
            options,
        }))
    }

    async fn make_public(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        match objects.get_mut(&(container.to_string(), key.to_string())) {
            Some(object) => {
                object.public = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("{}/{}", container, key))),
        }
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .remove(&(container.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", container, key)))
    }
}

struct MemoryWriter {
    store: MemoryStore,
    /// `None` once finished or aborted
    target: Option<ObjectKey>,
    buffer: BytesMut,
    options: WriteOptions,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        if self.target.is_none() {
            return Err(StoreError::StreamClosed("write after finish".into()));
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), StoreError> {
        let target = self
            .target
            .take()
            .ok_or_else(|| StoreError::StreamClosed("upload already completed".into()))?;

        let object = StoredObject {
            data: std::mem::take(&mut self.buffer).freeze(),
            metadata: std::mem::take(&mut self.options.metadata),
            public: false,
            encryption_key_sha256: self
                .options
                .encryption_key
                .as_ref()
                .map(|key| key.key_sha256().to_string()),
        };
        self.store.objects.write().insert(target, object);
        Ok(())
    }

    async fn abort(&mut self) {
        self.target = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_visible_only_after_finish() {
        let store = MemoryStore::new();
        let mut writer = store
            .create_write_stream("bucket", "key", WriteOptions::default())
            .await
            .unwrap();

        writer.write(Bytes::from("hello ")).await.unwrap();
        writer.write(Bytes::from("world")).await.unwrap();
        assert!(!store.contains("bucket", "key"));

        writer.finish().await.unwrap();
        let object = store.get("bucket", "key").unwrap();
        assert_eq!(object.data, Bytes::from("hello world"));
        assert!(!object.public);
    }

    #[tokio::test]
    async fn test_abort_discards_data() {
        let store = MemoryStore::new();
        let mut writer = store
            .create_write_stream("bucket", "key", WriteOptions::default())
            .await
            .unwrap();

        writer.write(Bytes::from("partial")).await.unwrap();
        writer.abort().await;

        assert!(store.is_empty());
        assert!(writer.write(Bytes::from("more")).await.is_err());
        assert!(writer.finish().await.is_err());
    }

    #[tokio::test]
    async fn test_make_public_and_delete() {
        let store = MemoryStore::new();
        let mut writer = store
            .create_write_stream("bucket", "key", WriteOptions::default())
            .await
            .unwrap();
        writer.finish().await.unwrap();

        store.make_public("bucket", "key").await.unwrap();
        assert!(store.get("bucket", "key").unwrap().public);

        store.delete("bucket", "key").await.unwrap();
        assert!(matches!(
            store.delete("bucket", "key").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.make_public("bucket", "key").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_objects() {
        let store = MemoryStore::new();
        let clone = store.clone();

        let mut writer = clone
            .create_write_stream("a", "x", WriteOptions::default())
            .await
            .unwrap();
        writer.finish().await.unwrap();

        assert_eq!(store.keys("a"), vec!["x".to_string()]);
        assert!(store.keys("b").is_empty());
        assert_eq!(store.len(), 1);
    }
}
