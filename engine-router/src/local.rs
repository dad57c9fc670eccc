//! In-process compute context host.
//!
//! Each context is a [`ContextServer`] running on its own task. The host
//! creates and tears these tasks down for the coordinator and carries
//! envelopes into them for the router.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use simhost_compute_context::{ContextHandle, ContextHost, HostError};
use simhost_engine_protocol::RequestEnvelope;
use simhost_model_cache::ModelLoader;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::engine::EngineFactory;
use crate::server::ContextServer;
use crate::transport::{Inbound, Transport, TransportError};

const CHANNEL_CAPACITY: usize = 256;

struct RunningContext {
    handle: ContextHandle,
    inbox: mpsc::Sender<RequestEnvelope>,
    server: AbortHandle,
}

/// Hosts compute contexts as tasks in the current tokio runtime.
pub struct LocalContextHost {
    engine_factory: EngineFactory,
    loader: ModelLoader,
    running: Mutex<Option<RunningContext>>,
    replies: mpsc::Sender<Inbound>,
    available: AtomicBool,
}

impl LocalContextHost {
    /// Create a host. The returned receiver carries replies and lost-context
    /// notices and is meant for [`crate::MessageRouter::spawn_inbound_pump`].
    pub fn new(
        loader: ModelLoader,
        engine_factory: EngineFactory,
    ) -> (Arc<Self>, mpsc::Receiver<Inbound>) {
        let (replies, inbound) = mpsc::channel(CHANNEL_CAPACITY);
        let host = Arc::new(Self {
            engine_factory,
            loader,
            running: Mutex::new(None),
            replies,
            available: AtomicBool::new(true),
        });
        (host, inbound)
    }

    /// Toggle whether contexts can be created at all.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Kill the running context without going through the coordinator, as
    /// a crash would. Returns `false` when nothing was running.
    pub async fn abort(&self) -> bool {
        match self.running.lock().await.as_ref() {
            Some(running) => {
                warn!("Aborting compute context {}", running.handle.id());
                running.server.abort();
                true
            }
            None => false,
        }
    }

    fn spawn_server(&self, handle: &ContextHandle) -> RunningContext {
        let (inbox, requests) = mpsc::channel(CHANNEL_CAPACITY);
        let server = Arc::new(ContextServer::new(
            (self.engine_factory)(),
            self.loader.clone(),
        ));
        let task = tokio::spawn(server.serve(requests, self.replies.clone()));
        let abort = task.abort_handle();

        let replies = self.replies.clone();
        let context_id = handle.id().to_string();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(()) => "context server exited".to_string(),
                Err(e) if e.is_cancelled() => "context terminated".to_string(),
                Err(e) => format!("context server panicked: {e}"),
            };
            debug!("Compute context {context_id} stopped: {reason}");
            let _ = replies.send(Inbound::ContextLost { context_id, reason }).await;
        });

        RunningContext {
            handle: handle.clone(),
            inbox,
            server: abort,
        }
    }
}

#[async_trait]
impl ContextHost for LocalContextHost {
    async fn existing(&self) -> Result<Option<ContextHandle>, HostError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| r.server.is_finished()) {
            debug!("Clearing finished compute context");
            *running = None;
        }
        Ok(running.as_ref().map(|r| r.handle.clone()))
    }

    async fn create(&self) -> Result<ContextHandle, HostError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(HostError::CapabilityUnavailable(
                "compute contexts are disabled on this host".to_string(),
            ));
        }

        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.server.is_finished() {
                return Err(HostError::Failed(format!(
                    "compute context {} already exists",
                    current.handle.id()
                )));
            }
        }

        let handle = ContextHandle::new();
        *running = Some(self.spawn_server(&handle));
        info!("Created compute context {}", handle.id());
        Ok(handle)
    }

    async fn close(&self, handle: &ContextHandle) -> Result<(), HostError> {
        let mut running = self.running.lock().await;
        match running.take() {
            Some(current) if current.handle.id() == handle.id() => {
                current.server.abort();
                info!("Closed compute context {}", handle.id());
                Ok(())
            }
            other => {
                *running = other;
                Err(HostError::Failed(format!(
                    "compute context {} is not running",
                    handle.id()
                )))
            }
        }
    }
}

#[async_trait]
impl Transport for LocalContextHost {
    async fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError> {
        let inbox = match self.running.lock().await.as_ref() {
            Some(running) => running.inbox.clone(),
            None => {
                return Err(TransportError::Unreachable(
                    "no compute context is running".to_string(),
                ));
            }
        };
        inbox
            .send(envelope)
            .await
            .map_err(|_| TransportError::Unreachable("compute context stopped".to_string()))
    }
}
