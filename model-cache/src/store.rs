//! Persistent key-value store primitive.
//!
//! The cache only needs four capabilities from its backing store: open a
//! named store, match an entry by key, put an entry, and delete an entry.
//! Backends report failures as [`std::io::Error`]; the cache maps them onto
//! its own taxonomy.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

/// A backend that can open named stores.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open (creating if needed) the store called `name`.
    async fn open(&self, name: &str) -> io::Result<Box<dyn StoreHandle>>;
}

/// An opened store.
///
/// Entries are whole payloads: `put` replaces atomically and readers never
/// observe a partial payload.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Return the payload stored under `key`, if any.
    async fn match_key(&self, key: &str) -> io::Result<Option<Bytes>>;

    /// Store `payload` under `key`, replacing any previous payload.
    async fn put(&self, key: &str, payload: Bytes) -> io::Result<()>;

    /// Remove the entry under `key`. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> io::Result<bool>;
}

type Bucket = Arc<RwLock<HashMap<String, Bytes>>>;

/// In-memory [`BlobStore`], used for tests and ephemeral sessions.
///
/// Supports an optional byte quota per store and can be switched offline to
/// simulate a store that refuses to open.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    quota_bytes: Option<usize>,
    offline: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    /// Create an empty store with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total payload bytes each named store may hold.
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Make subsequent `open` calls fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open(&self, name: &str) -> io::Result<Box<dyn StoreHandle>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("store {name} is offline"),
            ));
        }

        let bucket = self
            .buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();

        Ok(Box::new(MemoryHandle {
            bucket,
            quota_bytes: self.quota_bytes,
        }))
    }
}

struct MemoryHandle {
    bucket: Bucket,
    quota_bytes: Option<usize>,
}

#[async_trait]
impl StoreHandle for MemoryHandle {
    async fn match_key(&self, key: &str) -> io::Result<Option<Bytes>> {
        Ok(self.bucket.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, payload: Bytes) -> io::Result<()> {
        let mut bucket = self.bucket.write().await;

        if let Some(quota) = self.quota_bytes {
            let others: usize = bucket
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + payload.len() > quota {
                return Err(io::Error::new(
                    io::ErrorKind::StorageFull,
                    format!("quota of {quota} bytes exceeded"),
                ));
            }
        }

        bucket.insert(key.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, key: &str) -> io::Result<bool> {
        Ok(self.bucket.write().await.remove(key).is_some())
    }
}
