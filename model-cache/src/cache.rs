//! Key-addressed cache for model payloads.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{CacheError, Result};
use crate::fs_store::FsBlobStore;
use crate::store::{BlobStore, MemoryBlobStore, StoreHandle};

/// Persistent cache mapping a model's canonical fetch identifier to its
/// bytes.
///
/// The store is opened independently by every call; no handle is shared
/// between operations. Payloads are replaced whole, never patched.
#[derive(Clone)]
pub struct ModelBlobCache {
    store: Arc<dyn BlobStore>,
    store_name: String,
}

impl ModelBlobCache {
    /// Create a cache over an arbitrary backend.
    pub fn new(store: Arc<dyn BlobStore>, store_name: impl Into<String>) -> Self {
        Self {
            store,
            store_name: store_name.into(),
        }
    }

    /// Create a cache persisted under `root`.
    pub fn on_disk(root: impl AsRef<Path>, store_name: impl Into<String>) -> Self {
        Self::new(Arc::new(FsBlobStore::new(root)), store_name)
    }

    /// Create a cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBlobStore::new()),
            crate::DEFAULT_STORE_NAME,
        )
    }

    /// Name of the underlying store.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    async fn open(&self) -> Result<Box<dyn StoreHandle>> {
        self.store
            .open(&self.store_name)
            .await
            .map_err(|e| CacheError::CacheUnavailable {
                store: self.store_name.clone(),
                reason: e.to_string(),
            })
    }

    /// Look up the payload for `key`. A miss is `Ok(None)`.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let handle = self.open().await?;
        let found = handle
            .match_key(key)
            .await
            .map_err(|e| CacheError::CacheUnavailable {
                store: self.store_name.clone(),
                reason: e.to_string(),
            })?;

        match &found {
            Some(bytes) => debug!("Cache hit for {key} ({} bytes)", bytes.len()),
            None => debug!("Cache miss for {key}"),
        }
        Ok(found)
    }

    /// Store `payload` under `key`, replacing any previous payload.
    pub async fn put(&self, key: &str, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        let size = payload.len();
        let handle = self.open().await?;

        handle
            .put(key, payload)
            .await
            .map_err(|e| CacheError::CacheWriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        info!("Cached model payload for {key} ({size} bytes)");
        Ok(())
    }

    /// Remove the entry for `key`. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let handle = self.open().await?;
        let existed = handle
            .delete(key)
            .await
            .map_err(|e| CacheError::CacheWriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if existed {
            info!("Evicted cached model payload for {key}");
        }
        Ok(())
    }

    /// Whether an entry for `key` is present.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
