//! In-memory blob backend.

use async_trait::async_trait;
use cinder_core::Result;
use cinder_core::ports::BlobStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Blob store keeping payloads in process memory.
///
/// The write lock around the map makes insert-if-absent atomic, which is
/// all the artifact store needs for its write-once rule.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_if_absent(&self, key: &str, payload: Vec<u8>) -> Result<bool> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Ok(false);
        }
        blobs.insert(key.to_string(), payload);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
