//! The similarity engine collaborator.
//!
//! How similarity is computed is outside this crate. The engine only has to
//! accept model bytes once and then answer queries.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use simhost_engine_protocol::{SimilarityQuery, SimilarityResult};

use crate::error::EngineError;

/// Engine running inside the compute context.
#[async_trait]
pub trait SimilarityEngine: Send + Sync {
    /// Prepare the engine from raw model bytes.
    async fn initialize(&self, model: Bytes) -> Result<(), EngineError>;

    /// Score one query.
    async fn compute(&self, query: &SimilarityQuery) -> Result<SimilarityResult, EngineError>;
}

/// Builds a fresh engine for every new compute context.
pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn SimilarityEngine> + Send + Sync>;
