use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::error::{Result, StoreError};
use super::store::ObjectStore;
use crate::config::StorageConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// In-process [`ObjectStore`] used for dry runs and tests
///
/// Keys registered with [`MemoryStore::failing_on`] reject every put.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    failing: HashSet<String>,
    puts: AtomicUsize,
    storage: Option<StorageConfig>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the storage settings to derive public URLs
    pub fn with_storage(storage: StorageConfig) -> Self {
        Self {
            storage: Some(storage),
            ..Self::default()
        }
    }

    pub fn failing_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Number of put calls received, including rejected ones
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Snapshot of every stored object
    pub fn objects(&self) -> HashMap<String, StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::Relaxed);

        if self.failing.contains(key) {
            return Err(StoreError::Service {
                code: "InternalError".to_string(),
                message: format!("rejected put for {}", key),
            });
        }

        debug!("memory put {} ({} bytes, {})", key, body.len(), content_type);

        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        self.object(key)
            .map(|object| ByteStream::from(object.body))
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn public_url(&self, key: &str) -> String {
        match &self.storage {
            Some(storage) => storage.public_url(key),
            None => format!("memory://{}", key),
        }
    }
}
