//! # Engine Router
//!
//! Connects callers to the similarity engine running inside the shared
//! compute context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                             Engine Router                              │
//! ├────────────────────────────────────────────────────────────────────────┤
//! │  caller ──► MessageRouter ──ensure_ready──► ComputeContextCoordinator  │
//! │                  │                                   │                 │
//! │                  ▼ Transport                         ▼                 │
//! │             ContextServer ◄──────────────── LocalContextHost           │
//! │                  │                                                     │
//! │                  ▼                                                     │
//! │  SimilarityEngine + ModelLoader (ModelBlobCache)                       │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use simhost_engine_router::{EngineConfig, EngineRuntime};
//!
//! let runtime = EngineRuntime::start(EngineConfig::default(), engine_factory);
//! let router = runtime.router();
//!
//! router.initialize("https://models.example/encoder.onnx").await?;
//! let result = router.compute_single(query).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod local;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod server;
pub mod transport;

pub use config::{CacheConfig, EngineConfig, ModelConfig, RouterConfig};
pub use engine::{EngineFactory, SimilarityEngine};
pub use error::{ConfigError, EngineError, Result, RouterError};
pub use local::LocalContextHost;
pub use router::MessageRouter;
pub use runtime::EngineRuntime;
pub use server::ContextServer;
pub use transport::{Inbound, Transport, TransportError};

// Re-export from dependencies for convenience
pub use simhost_compute_context::{ComputeContextCoordinator, ContextHandle, ContextState};
pub use simhost_engine_protocol::{
    BatchItem, EngineRequest, EngineResponse, InitializeResult, SimilarityQuery,
    SimilarityResult, StatusReport, Target,
};
pub use simhost_model_cache::{ModelBlobCache, ModelLoader};
