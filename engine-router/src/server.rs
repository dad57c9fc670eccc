//! Request handling inside the compute context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use simhost_compute_context::ContextState;
use simhost_engine_protocol::{
    BatchItem, EngineRequest, EngineResponse, EngineStatus, ErrorKind, InitializeResult,
    RequestEnvelope, ResponseEnvelope, SimilarityQuery, SimilarityResult, StatusReport, Target,
    WireError,
};
use simhost_model_cache::{LoadError, ModelLoader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::SimilarityEngine;
use crate::transport::Inbound;

/// Serves engine requests for one compute context.
///
/// Holds the engine instance, remembers which model it was initialized
/// with, and answers every envelope with exactly one reply. Loads are
/// serialized; status and compute requests never wait behind one.
pub struct ContextServer {
    engine: Arc<dyn SimilarityEngine>,
    loader: ModelLoader,
    init_lock: Mutex<()>,
    loaded: RwLock<Option<InitializeResult>>,
    requests_served: AtomicU64,
}

impl ContextServer {
    /// Create a server for a fresh engine. Models come from `loader`.
    pub fn new(engine: Arc<dyn SimilarityEngine>, loader: ModelLoader) -> Self {
        Self {
            engine,
            loader,
            init_lock: Mutex::new(()),
            loaded: RwLock::new(None),
            requests_served: AtomicU64::new(0),
        }
    }

    /// Answer one envelope.
    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        if envelope.target != Target::Offscreen {
            let err = WireError::new(
                ErrorKind::InvalidRequest,
                format!("message addressed to {:?}", envelope.target),
            );
            return envelope.reply(EngineResponse::Error(err));
        }

        let body = match self.dispatch(&envelope.body).await {
            Ok(body) => body,
            Err(err) => {
                debug!("{:?} request {} failed: {err}", envelope.body.kind(), envelope.id);
                EngineResponse::Error(err)
            }
        };
        envelope.reply(body)
    }

    async fn dispatch(&self, request: &EngineRequest) -> Result<EngineResponse, WireError> {
        match request {
            EngineRequest::Initialize { model_url } => {
                self.initialize(model_url).await.map(EngineResponse::Initialized)
            }
            EngineRequest::ComputeSingle { query } => {
                self.require_initialized()?;
                self.compute(query).await.map(EngineResponse::Single)
            }
            EngineRequest::ComputeBatch { queries } => {
                self.require_initialized()?;
                let results = join_all(queries.iter().map(|query| self.compute(query))).await;
                Ok(EngineResponse::Batch(
                    results.into_iter().map(BatchItem::from).collect(),
                ))
            }
            EngineRequest::Status => Ok(EngineResponse::Status(self.status())),
        }
    }

    /// Load `model_url` and hand it to the engine.
    ///
    /// Initializing again with the model already loaded is a no-op.
    /// Concurrent initializations run one after another.
    async fn initialize(&self, model_url: &str) -> Result<InitializeResult, WireError> {
        let _guard = self.init_lock.lock().await;
        if let Some(current) = self.loaded() {
            if current.model_key == model_url {
                debug!("Model {model_url} already loaded");
                return Ok(current);
            }
        }

        let model = self.loader.load(model_url).await.map_err(load_error)?;
        self.engine
            .initialize(model.bytes)
            .await
            .map_err(|e| WireError::new(ErrorKind::EngineFailure, e.to_string()))?;

        let result = InitializeResult {
            model_key: model.key,
            from_cache: model.from_cache,
        };
        info!(
            "Engine initialized with {} (from cache: {})",
            result.model_key, result.from_cache
        );
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        Ok(result)
    }

    /// The model currently in the engine. Never blocks on a running load.
    fn loaded(&self) -> Option<InitializeResult> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_initialized(&self) -> Result<(), WireError> {
        if self.loaded().is_some() {
            Ok(())
        } else {
            Err(WireError::new(ErrorKind::NotInitialized, "engine has no model loaded"))
        }
    }

    async fn compute(&self, query: &SimilarityQuery) -> Result<SimilarityResult, WireError> {
        let result = self
            .engine
            .compute(query)
            .await
            .map_err(|e| WireError::new(ErrorKind::EngineFailure, e.to_string()))?;
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    fn status(&self) -> StatusReport {
        let loaded = self.loaded();
        StatusReport {
            context: ContextState::Ready,
            engine: Some(EngineStatus {
                initialized: loaded.is_some(),
                model_key: loaded.map(|l| l.model_key),
                requests_served: self.requests_served.load(Ordering::Relaxed),
            }),
        }
    }

    /// Answer envelopes from `inbox` until it closes, each on its own task.
    ///
    /// Replies go to `outbox`. Tasks still running when the inbox closes are
    /// allowed to finish.
    pub async fn serve(
        self: Arc<Self>,
        mut inbox: mpsc::Receiver<RequestEnvelope>,
        outbox: mpsc::Sender<Inbound>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                envelope = inbox.recv() => {
                    let Some(envelope) = envelope else { break };
                    let server = Arc::clone(&self);
                    let outbox = outbox.clone();
                    tasks.spawn(async move {
                        let reply = server.handle(envelope).await;
                        if outbox.send(Inbound::Reply(reply)).await.is_err() {
                            warn!("Reply dropped: router is gone");
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Request task failed: {e}");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Request task failed: {e}");
            }
        }
        debug!("Context server stopped");
    }
}

fn load_error(err: LoadError) -> WireError {
    WireError::new(ErrorKind::ModelLoadFailed, err.to_string())
}
