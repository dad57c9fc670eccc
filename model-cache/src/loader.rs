//! Cache-first model acquisition.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::ModelBlobCache;
use crate::error::LoadError;
use crate::fetcher::ModelFetcher;

/// A model payload ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    /// Canonical fetch identifier.
    pub key: String,

    /// The model bytes.
    pub bytes: Bytes,

    /// Whether the bytes came from the persistent cache.
    pub from_cache: bool,
}

type LoadFuture = Shared<BoxFuture<'static, Result<LoadedModel, LoadError>>>;

/// Loads models through [`ModelBlobCache`], fetching on a miss.
///
/// Concurrent loads of the same key attach to one in-flight load, so a
/// model is fetched and stored at most once no matter how many callers ask
/// for it at the same time.
#[derive(Clone)]
pub struct ModelLoader {
    cache: ModelBlobCache,
    fetcher: Arc<dyn ModelFetcher>,
    in_flight: Arc<Mutex<HashMap<String, LoadFuture>>>,
    fetches: Arc<AtomicU64>,
}

impl ModelLoader {
    /// Create a loader over `cache` and `fetcher`.
    pub fn new(cache: ModelBlobCache, fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            cache,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ModelBlobCache {
        &self.cache
    }

    /// Number of network fetches performed so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Return the model stored under `key`, fetching and caching it on a
    /// miss.
    pub async fn load(&self, key: &str) -> Result<LoadedModel, LoadError> {
        let pending = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(pending) => {
                    debug!("Joining in-flight load for {key}");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_load(key.to_string());
                    in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Run the load on its own task so it completes (and clears its
    /// in-flight entry) even if every waiter goes away.
    fn spawn_load(&self, key: String) -> LoadFuture {
        let loader = self.clone();
        let task = tokio::spawn(async move {
            let result = loader.load_uncoalesced(&key).await;
            loader.in_flight.lock().await.remove(&key);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(LoadError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn load_uncoalesced(&self, key: &str) -> Result<LoadedModel, LoadError> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => {
                return Ok(LoadedModel {
                    key: key.to_string(),
                    bytes,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Model cache unavailable, fetching {key} directly: {e}"),
        }

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = self.fetcher.fetch(key).await?;

        // A failed write only costs a re-fetch next time.
        if let Err(e) = self.cache.put(key, bytes.clone()).await {
            warn!("Could not cache model {key}: {e}");
        }

        info!("Loaded model {key} from source ({} bytes)", bytes.len());
        Ok(LoadedModel {
            key: key.to_string(),
            bytes,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowFetcher {
        calls: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl ModelFetcher for SlowFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(LoadError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(Bytes::from(format!("weights:{url}")))
        }
    }

    fn fetcher(fail: bool) -> Arc<SlowFetcher> {
        Arc::new(SlowFetcher {
            calls: AtomicU64::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let source = fetcher(false);
        let loader = ModelLoader::new(ModelBlobCache::in_memory(), source.clone());

        let results =
            futures::future::join_all((0..8).map(|_| loader.load("https://m/a.bin"))).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        for result in results {
            let model = result.unwrap();
            assert_eq!(model.bytes, Bytes::from_static(b"weights:https://m/a.bin"));
        }
    }

    #[tokio::test]
    async fn test_second_load_hits_cache() {
        let source = fetcher(false);
        let loader = ModelLoader::new(ModelBlobCache::in_memory(), source.clone());

        let first = loader.load("k").await.unwrap();
        let second = loader.load("k").await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(loader.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let source = fetcher(false);
        let store = MemoryBlobStore::new().with_quota(1);
        let loader = ModelLoader::new(ModelBlobCache::new(Arc::new(store), "m"), source.clone());

        let first = loader.load("k").await.unwrap();
        let second = loader.load("k").await.unwrap();

        assert!(!first.from_cache);
        assert!(!second.from_cache);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_back_to_fetch() {
        let source = fetcher(false);
        let store = MemoryBlobStore::new();
        store.set_offline(true);
        let loader = ModelLoader::new(ModelBlobCache::new(Arc::new(store), "m"), source);

        let model = loader.load("k").await.unwrap();
        assert!(!model.from_cache);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_shared_and_retryable() {
        let source = fetcher(true);
        let loader = ModelLoader::new(ModelBlobCache::in_memory(), source.clone());

        let (a, b) = tokio::join!(loader.load("k"), loader.load("k"));
        assert_eq!(a.clone().unwrap_err(), b.unwrap_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // The failed attempt is not cached as in-flight.
        let _ = loader.load("k").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
