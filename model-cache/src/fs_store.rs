//! Filesystem-backed blob store.
//!
//! Each named store is a directory under the root; each entry is a single
//! file named by the SHA-256 of its key. Writes go to a temp file first and
//! are renamed into place, so a reader sees either the old payload or the
//! new one, never a mix.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::store::{BlobStore, StoreHandle};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// [`BlobStore`] that persists entries under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    max_payload_bytes: Option<u64>,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. Nothing is created until a store is
    /// opened.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_payload_bytes: None,
        }
    }

    /// Reject payloads larger than `bytes` with [`io::ErrorKind::StorageFull`].
    pub fn with_max_payload_bytes(mut self, bytes: u64) -> Self {
        self.max_payload_bytes = Some(bytes);
        self
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map a store name onto a safe directory name.
fn dir_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn open(&self, name: &str) -> io::Result<Box<dyn StoreHandle>> {
        let dir = self.root.join(dir_name(name));
        fs::create_dir_all(&dir).await?;

        Ok(Box::new(FsStoreHandle {
            dir,
            max_payload_bytes: self.max_payload_bytes,
        }))
    }
}

struct FsStoreHandle {
    dir: PathBuf,
    max_payload_bytes: Option<u64>,
}

impl FsStoreHandle {
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{digest:x}.bin"))
    }
}

#[async_trait]
impl StoreHandle for FsStoreHandle {
    async fn match_key(&self, key: &str) -> io::Result<Option<Bytes>> {
        match fs::read(self.entry_path(key)).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &str, payload: Bytes) -> io::Result<()> {
        if let Some(max) = self.max_payload_bytes {
            if payload.len() as u64 > max {
                return Err(io::Error::new(
                    io::ErrorKind::StorageFull,
                    format!("payload of {} bytes exceeds limit of {max}", payload.len()),
                ));
            }
        }

        let path = self.entry_path(key);
        let serial = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("tmp-{}-{serial}", std::process::id()));

        if let Err(e) = fs::write(&temp_path, &payload).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!("Stored {} bytes at {}", payload.len(), path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> io::Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_dir_name_sanitizes() {
        assert_eq!(dir_name("model-cache"), "model-cache");
        assert_eq!(dir_name("../evil/name"), ".._evil_name");
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://models.example/minilm.onnx";

        {
            let store = FsBlobStore::new(temp_dir.path());
            let handle = store.open("models").await.unwrap();
            handle.put(url, Bytes::from_static(b"weights")).await.unwrap();
        }

        let store = FsBlobStore::new(temp_dir.path());
        let handle = store.open("models").await.unwrap();
        assert_eq!(
            handle.match_key(url).await.unwrap(),
            Some(Bytes::from_static(b"weights"))
        );
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path());
        let handle = store.open("models").await.unwrap();

        handle.put("a", Bytes::from_static(b"1")).await.unwrap();
        handle.put("a", Bytes::from_static(b"2")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp_dir.path().join("models"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".bin"));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path()).with_max_payload_bytes(2);
        let handle = store.open("models").await.unwrap();

        let err = handle
            .put("big", Bytes::from_static(b"abc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
        assert!(handle.match_key("big").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path());
        let handle = store.open("models").await.unwrap();

        handle.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert!(handle.delete("k").await.unwrap());
        assert!(!handle.delete("k").await.unwrap());
    }
}
