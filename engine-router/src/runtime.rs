//! Wiring for a complete in-process engine stack.

use std::sync::Arc;
use std::time::Duration;

use simhost_compute_context::ComputeContextCoordinator;
use simhost_engine_protocol::InitializeResult;
use simhost_model_cache::{HttpModelFetcher, ModelLoader};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::EngineFactory;
use crate::error::{Result, RouterError};
use crate::local::LocalContextHost;
use crate::router::MessageRouter;

/// Owns the host, coordinator, router and the task pumping replies.
///
/// Must be created inside a tokio runtime.
pub struct EngineRuntime {
    config: EngineConfig,
    host: Arc<LocalContextHost>,
    router: Arc<MessageRouter>,
    pump: JoinHandle<()>,
}

impl EngineRuntime {
    /// Build the stack from `config`: an on-disk model cache, an HTTP
    /// fetcher and an in-process context host.
    pub fn start(config: EngineConfig, engine_factory: EngineFactory) -> Self {
        let fetcher = HttpModelFetcher::new()
            .with_timeout(Duration::from_secs(config.model.fetch_timeout_secs));
        let loader = ModelLoader::new(config.cache.build(), Arc::new(fetcher));
        Self::with_loader(config, loader, engine_factory)
    }

    /// Build the stack around an existing loader.
    pub fn with_loader(
        config: EngineConfig,
        loader: ModelLoader,
        engine_factory: EngineFactory,
    ) -> Self {
        let (host, inbound) = LocalContextHost::new(loader, engine_factory);
        let coordinator = ComputeContextCoordinator::new(host.clone());
        let router = Arc::new(MessageRouter::new(
            coordinator,
            host.clone(),
            config.router.clone(),
        ));
        let pump = router.spawn_inbound_pump(inbound);

        info!(
            "Engine runtime started (cache: {}, timeout: {:?})",
            config.cache.root.display(),
            config.router.response_timeout()
        );
        Self {
            config,
            host,
            router,
            pump,
        }
    }

    /// The router callers talk to.
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    /// The context host, for toggling availability or simulating crashes.
    pub fn host(&self) -> &Arc<LocalContextHost> {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initialize the engine with the configured model.
    pub async fn initialize_default(&self) -> Result<InitializeResult> {
        let url = self
            .config
            .model
            .url
            .clone()
            .ok_or(RouterError::NoDefaultModel)?;
        self.router.initialize(url).await
    }

    /// Close the context and stop pumping replies.
    pub async fn shutdown(self) {
        self.router.shutdown().await;
        self.pump.abort();
    }
}
