//! Full stack: router, coordinator, local host, context server and loader.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use simhost_engine_protocol::ErrorKind;
use simhost_engine_router::{
    BatchItem, ContextState, EngineConfig, EngineError, EngineFactory, EngineRuntime,
    ModelBlobCache, ModelLoader, RouterError, SimilarityEngine, SimilarityQuery,
    SimilarityResult, global,
};
use simhost_model_cache::{LoadError, ModelFetcher};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

const MODEL_URL: &str = "https://models.example/encoder.onnx";

struct CountingFetcher {
    fetches: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl ModelFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Bytes, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Bytes::from_static(b"encoder-weights"))
    }
}

#[derive(Default)]
struct Probe {
    inits: AtomicUsize,
    hanging: Notify,
}

/// Engine driven by the query text:
/// `fail` errors, `hang` never answers, `sleep:N` answers after N ms with
/// score N, anything else scores each candidate by length.
struct ScriptedEngine {
    probe: Arc<Probe>,
}

#[async_trait]
impl SimilarityEngine for ScriptedEngine {
    async fn initialize(&self, model: Bytes) -> Result<(), EngineError> {
        if model.is_empty() {
            return Err(EngineError::new("empty model"));
        }
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compute(&self, query: &SimilarityQuery) -> Result<SimilarityResult, EngineError> {
        if query.text == "fail" {
            return Err(EngineError::new("cannot score this query"));
        }
        if query.text == "hang" {
            self.probe.hanging.notify_one();
            std::future::pending::<()>().await;
        }
        if let Some(ms) = query.text.strip_prefix("sleep:") {
            let ms: u64 = ms.parse().map_err(|_| EngineError::new("bad delay"))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(SimilarityResult {
                scores: vec![ms as f32],
            });
        }
        Ok(SimilarityResult {
            scores: query.candidates.iter().map(|c| c.len() as f32).collect(),
        })
    }
}

struct Harness {
    runtime: EngineRuntime,
    fetcher: Arc<CountingFetcher>,
    probe: Arc<Probe>,
}

fn harness() -> Harness {
    harness_with(Duration::from_millis(10), Duration::from_secs(5))
}

fn harness_with(delay: Duration, response_timeout: Duration) -> Harness {
    let fetcher = Arc::new(CountingFetcher {
        fetches: AtomicUsize::new(0),
        delay,
    });
    let probe = Arc::new(Probe::default());
    let loader = ModelLoader::new(ModelBlobCache::in_memory(), fetcher.clone());
    let factory: EngineFactory = {
        let probe = probe.clone();
        Arc::new(move || {
            Arc::new(ScriptedEngine {
                probe: probe.clone(),
            }) as Arc<dyn SimilarityEngine>
        })
    };
    let config = EngineConfig::default()
        .with_response_timeout(response_timeout)
        .with_model_url(MODEL_URL);

    Harness {
        runtime: EngineRuntime::with_loader(config, loader, factory),
        fetcher,
        probe,
    }
}

fn query(text: &str) -> SimilarityQuery {
    SimilarityQuery::new(text, ["a", "abc"])
}

#[tokio::test]
async fn test_concurrent_initialize_creates_one_context() {
    let h = harness();
    let router = h.runtime.router();

    let calls = (0..8).map(|_| {
        let router = router.clone();
        tokio::spawn(async move { router.initialize(MODEL_URL).await })
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().model_key, MODEL_URL);
    }
    assert_eq!(router.coordinator().creation_count(), 1);
    assert_eq!(h.fetcher.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.probe.inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let h = harness();
    let router = h.runtime.router();
    assert_ok!(h.runtime.initialize_default().await);

    let items = router
        .compute_batch(vec![
            query("sleep:60"),
            query("sleep:40"),
            query("sleep:20"),
            query("sleep:0"),
        ])
        .await
        .unwrap();

    let scores: Vec<f32> = items
        .into_iter()
        .map(|item| item.into_result().unwrap().scores[0])
        .collect();
    assert_eq!(scores, vec![60.0, 40.0, 20.0, 0.0]);
}

#[tokio::test]
async fn test_batch_failure_is_per_item() {
    let h = harness();
    let router = h.runtime.router();
    assert_ok!(h.runtime.initialize_default().await);

    let items = router
        .compute_batch(vec![query("ok"), query("fail"), query("ok")])
        .await
        .unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(
        items[0],
        BatchItem::Ok {
            result: SimilarityResult {
                scores: vec![1.0, 3.0]
            }
        }
    );
    match &items[1] {
        BatchItem::Failed { error } => assert_eq!(error.kind, ErrorKind::EngineFailure),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(items[2].is_ok());
}

#[tokio::test]
async fn test_context_lost_mid_batch() {
    let h = harness();
    let router = h.runtime.router();
    assert_ok!(h.runtime.initialize_default().await);

    let batch = tokio::spawn({
        let router = router.clone();
        async move { router.compute_batch(vec![query("ok"), query("hang")]).await }
    });
    h.probe.hanging.notified().await;
    assert!(h.runtime.host().abort().await);

    let err = assert_err!(batch.await.unwrap());
    assert!(matches!(err, RouterError::ContextLost(_)));
    assert!(err.is_retryable());
    assert_eq!(router.pending_count().await, 0);

    // The next call recreates the context; the model now comes from cache.
    let init = assert_ok!(router.initialize(MODEL_URL).await);
    assert!(init.from_cache);
    assert_eq!(router.coordinator().creation_count(), 2);
    assert_eq!(h.fetcher.fetches.load(Ordering::SeqCst), 1);

    let result = router.compute_single(query("ok")).await.unwrap();
    assert_eq!(result.scores, vec![1.0, 3.0]);
}

#[tokio::test]
async fn test_compute_requires_initialize() {
    let h = harness();

    let err = assert_err!(h.runtime.router().compute_single(query("ok")).await);

    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_status_without_side_effects() {
    let h = harness();
    let router = h.runtime.router();

    let before = router.status().await.unwrap();
    assert_eq!(before.context, ContextState::Uninitialized);
    assert_eq!(before.engine, None);
    assert_eq!(router.coordinator().creation_count(), 0);

    assert_ok!(h.runtime.initialize_default().await);
    assert_ok!(router.compute_single(query("ok")).await);

    let after = router.status().await.unwrap();
    assert_eq!(after.context, ContextState::Ready);
    let engine = after.engine.unwrap();
    assert!(engine.initialized);
    assert_eq!(engine.model_key.as_deref(), Some(MODEL_URL));
    assert_eq!(engine.requests_served, 1);
}

#[tokio::test]
async fn test_unavailable_host_sends_nothing() {
    let h = harness();
    h.runtime.host().set_available(false);

    let err = h.runtime.router().initialize(MODEL_URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ContextUnavailable);
    assert_eq!(h.fetcher.fetches.load(Ordering::SeqCst), 0);

    h.runtime.host().set_available(true);
    assert!(h.runtime.router().initialize(MODEL_URL).await.is_ok());
}

#[tokio::test]
async fn test_close_then_reuse_recreates_context() {
    let h = harness();
    let router = h.runtime.router();
    assert_ok!(h.runtime.initialize_default().await);

    router.coordinator().close().await;
    assert_eq!(router.coordinator().state(), ContextState::Closed);

    // A fresh context starts with a fresh engine.
    let err = router.compute_single(query("ok")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert_eq!(router.coordinator().creation_count(), 2);
}

#[tokio::test]
async fn test_default_model_must_be_configured() {
    let temp_dir = TempDir::new().unwrap();
    let factory: EngineFactory = Arc::new(|| {
        Arc::new(ScriptedEngine {
            probe: Arc::new(Probe::default()),
        }) as Arc<dyn SimilarityEngine>
    });
    let runtime = EngineRuntime::start(
        EngineConfig::default().with_cache_root(temp_dir.path()),
        factory,
    );

    let err = runtime.initialize_default().await.unwrap_err();

    assert_eq!(err, RouterError::NoDefaultModel);
    assert_eq!(runtime.router().coordinator().creation_count(), 0);
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_global_router_reset() {
    let h = harness();
    let router = h.runtime.router();
    router.initialize(MODEL_URL).await.unwrap();

    assert!(global::install(router.clone()).is_none());
    let shared = global::get().unwrap();
    assert!(Arc::ptr_eq(&shared, &router));

    global::reset().await;

    assert!(global::get().is_none());
    assert_eq!(router.coordinator().state(), ContextState::Closed);
}

#[tokio::test]
async fn test_status_answers_during_model_load() {
    // The download outlasts the plain response timeout.
    let h = harness_with(Duration::from_millis(800), Duration::from_millis(300));
    let router = h.runtime.router();

    let init = tokio::spawn({
        let router = router.clone();
        async move { router.initialize(MODEL_URL).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = assert_ok!(router.status().await);
    assert_eq!(report.context, ContextState::Ready);
    assert!(!report.engine.unwrap().initialized);

    let err = assert_err!(router.compute_single(query("ok")).await);
    assert_eq!(err.kind(), ErrorKind::NotInitialized);

    let init = assert_ok!(init.await.unwrap());
    assert!(!init.from_cache);
}
