//! Caller-facing request routing.

use std::collections::HashMap;
use std::sync::Arc;

use simhost_compute_context::{ComputeContextCoordinator, ContextHandle};
use simhost_engine_protocol::{
    BatchItem, EngineRequest, EngineResponse, Envelope, InitializeResult, RequestId,
    RequestKind, ResponseEnvelope, SimilarityQuery, SimilarityResult, StatusReport, Target,
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::transport::{Inbound, Transport};

struct Pending {
    kind: RequestKind,
    context_id: String,
    tx: oneshot::Sender<Result<EngineResponse>>,
}

/// Routes typed requests into the compute context and relays the replies.
///
/// Every request is gated on [`ComputeContextCoordinator::ensure_ready`],
/// tracked by its correlation id, and bounded by the configured response
/// timeout. A reply that arrives after its caller gave up is dropped.
pub struct MessageRouter {
    coordinator: ComputeContextCoordinator,
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<RequestId, Pending>>,
    config: RouterConfig,
}

impl MessageRouter {
    /// Create a router.
    pub fn new(
        coordinator: ComputeContextCoordinator,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        Self {
            coordinator,
            transport,
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The coordinator this router gates on.
    pub fn coordinator(&self) -> &ComputeContextCoordinator {
        &self.coordinator
    }

    /// Number of requests waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Load a model into the engine, creating the context if needed.
    pub async fn initialize(&self, model_url: impl Into<String>) -> Result<InitializeResult> {
        let request = EngineRequest::Initialize {
            model_url: model_url.into(),
        };
        match self.request(Target::Background, request).await? {
            EngineResponse::Initialized(result) => Ok(result),
            other => Err(unexpected(RequestKind::Initialize, &other)),
        }
    }

    /// Score a single query.
    pub async fn compute_single(&self, query: SimilarityQuery) -> Result<SimilarityResult> {
        match self
            .request(Target::Background, EngineRequest::ComputeSingle { query })
            .await?
        {
            EngineResponse::Single(result) => Ok(result),
            other => Err(unexpected(RequestKind::ComputeSingle, &other)),
        }
    }

    /// Score an ordered batch of queries.
    ///
    /// The returned items line up with `queries`. Individual failures are
    /// reported per item; losing the context fails the whole call.
    pub async fn compute_batch(&self, queries: Vec<SimilarityQuery>) -> Result<Vec<BatchItem>> {
        let expected = queries.len();
        match self
            .request(Target::Background, EngineRequest::ComputeBatch { queries })
            .await?
        {
            EngineResponse::Batch(items) if items.len() == expected => Ok(items),
            EngineResponse::Batch(items) => Err(RouterError::Protocol {
                kind: RequestKind::ComputeBatch,
                detail: format!("expected {expected} results, got {}", items.len()),
            }),
            other => Err(unexpected(RequestKind::ComputeBatch, &other)),
        }
    }

    /// Report lifecycle and engine state without creating a context.
    pub async fn status(&self) -> Result<StatusReport> {
        match self.request(Target::Background, EngineRequest::Status).await? {
            EngineResponse::Status(report) => Ok(report),
            other => Err(unexpected(RequestKind::Status, &other)),
        }
    }

    /// Route `request` on behalf of `source` and wait for its reply.
    ///
    /// Engine-side errors come back as `Err`; a successful return is never
    /// [`EngineResponse::Error`].
    pub async fn request(&self, source: Target, request: EngineRequest) -> Result<EngineResponse> {
        if let EngineRequest::Status = request {
            return self.status_without_side_effects(source).await;
        }

        let handle = self.coordinator.ensure_ready().await?;

        if let EngineRequest::ComputeBatch { queries } = &request {
            if queries.is_empty() {
                return Ok(EngineResponse::Batch(Vec::new()));
            }
        }

        self.dispatch(&handle, source, request).await
    }

    async fn status_without_side_effects(&self, source: Target) -> Result<EngineResponse> {
        let state = self.coordinator.state();
        match self.coordinator.current().await {
            Some(handle) => self.dispatch(&handle, source, EngineRequest::Status).await,
            None => Ok(EngineResponse::Status(StatusReport {
                context: state,
                engine: None,
            })),
        }
    }

    async fn dispatch(
        &self,
        handle: &ContextHandle,
        source: Target,
        request: EngineRequest,
    ) -> Result<EngineResponse> {
        let kind = request.kind();
        let envelope = Envelope::new(source, Target::Offscreen, request);
        let id = envelope.id;
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(
            id,
            Pending {
                kind,
                context_id: handle.id().to_string(),
                tx,
            },
        );
        debug!("Routing {kind:?} request {id} to context {}", handle.id());

        if let Err(e) = self.transport.send(envelope).await {
            self.pending.lock().await.remove(&id);
            self.coordinator.invalidate(handle).await;
            return Err(RouterError::ContextLost(e.to_string()));
        }

        let timeout = self.config.timeout_for(kind);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RouterError::ContextLost(format!(
                "reply channel for request {id} dropped"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!("{kind:?} request {id} timed out after {timeout:?}");
                Err(RouterError::ResponseTimeout { id, kind, timeout })
            }
        }
    }

    /// Hand a reply to the caller waiting on its id.
    ///
    /// Returns `false` when nobody is waiting any more (the caller timed out
    /// or the id is unknown); such replies are discarded.
    pub async fn deliver(&self, envelope: ResponseEnvelope) -> bool {
        let Some(pending) = self.pending.lock().await.remove(&envelope.id) else {
            debug!("Discarding late or unknown reply {}", envelope.id);
            return false;
        };

        let result = match envelope.body {
            EngineResponse::Error(err) => Err(RouterError::from(err)),
            body => Ok(body),
        };
        if pending.tx.send(result).is_err() {
            debug!("Caller for {:?} reply {} went away", pending.kind, envelope.id);
        }
        true
    }

    /// Fail every request in flight to the context `context_id`.
    pub async fn context_lost(&self, context_id: &str, reason: &str) {
        let lost: Vec<Pending> = {
            let mut pending = self.pending.lock().await;
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, p)| p.context_id == context_id)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        if !lost.is_empty() {
            warn!(
                "Compute context {context_id} lost with {} requests in flight: {reason}",
                lost.len()
            );
        }
        // Invalidate before waking callers so a retry sees the loss.
        if let Some(current) = self.coordinator.current().await {
            if current.id() == context_id {
                self.coordinator.invalidate(&current).await;
            }
        }

        for p in lost {
            let _ = p.tx.send(Err(RouterError::ContextLost(reason.to_string())));
        }
    }

    /// Fail everything in flight, whatever context it went to.
    async fn fail_all(&self, reason: &str) {
        let drained: Vec<Pending> = self.pending.lock().await.drain().map(|(_, p)| p).collect();
        for p in drained {
            let _ = p.tx.send(Err(RouterError::ContextLost(reason.to_string())));
        }
    }

    /// Consume inbound traffic until the channel closes.
    pub fn spawn_inbound_pump(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<Inbound>,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(item) = inbound.recv().await {
                match item {
                    Inbound::Reply(envelope) => {
                        router.deliver(envelope).await;
                    }
                    Inbound::ContextLost { context_id, reason } => {
                        router.context_lost(&context_id, &reason).await;
                    }
                }
            }
            router.fail_all("inbound channel closed").await;
            debug!("Inbound pump stopped");
        })
    }

    /// Close the compute context and fail anything still waiting.
    pub async fn shutdown(&self) {
        self.coordinator.close().await;
        self.fail_all("router shut down").await;
        info!("Message router shut down");
    }
}

fn unexpected(kind: RequestKind, response: &EngineResponse) -> RouterError {
    RouterError::Protocol {
        kind,
        detail: format!("{response:?}"),
    }
}
