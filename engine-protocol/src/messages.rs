//! Engine operations and their replies.

use serde::{Deserialize, Serialize};
use simhost_compute_context::ContextState;

use crate::error::WireError;

/// One similarity question: how close is `text` to each candidate?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    /// The text being matched.
    pub text: String,

    /// Texts to score against `text`.
    pub candidates: Vec<String>,
}

impl SimilarityQuery {
    /// Create a query.
    pub fn new<I, S>(text: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Answer to a [`SimilarityQuery`]: one score per candidate, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub scores: Vec<f32>,
}

impl SimilarityResult {
    /// Index and score of the best-scoring candidate.
    pub fn best(&self) -> Option<(usize, f32)> {
        self.scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Requests understood by the compute context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineRequest {
    /// Load the model at `model_url` (cache first) and prepare the engine.
    Initialize { model_url: String },

    /// Score a single query.
    ComputeSingle { query: SimilarityQuery },

    /// Score an ordered list of queries. Results come back in the same order.
    ComputeBatch { queries: Vec<SimilarityQuery> },

    /// Report lifecycle and engine state.
    Status,
}

/// Discriminant of [`EngineRequest`], for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Initialize,
    ComputeSingle,
    ComputeBatch,
    Status,
}

impl EngineRequest {
    /// Which operation this is.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Initialize { .. } => RequestKind::Initialize,
            Self::ComputeSingle { .. } => RequestKind::ComputeSingle,
            Self::ComputeBatch { .. } => RequestKind::ComputeBatch,
            Self::Status => RequestKind::Status,
        }
    }
}

/// Outcome of [`EngineRequest::Initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Canonical key of the loaded model.
    pub model_key: String,

    /// Whether the model bytes came from the persistent cache.
    pub from_cache: bool,
}

/// Per-item outcome of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItem {
    Ok { result: SimilarityResult },
    Failed { error: WireError },
}

impl BatchItem {
    /// Whether this item succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<SimilarityResult, WireError> {
        match self {
            Self::Ok { result } => Ok(result),
            Self::Failed { error } => Err(error),
        }
    }
}

impl From<Result<SimilarityResult, WireError>> for BatchItem {
    fn from(result: Result<SimilarityResult, WireError>) -> Self {
        match result {
            Ok(result) => Self::Ok { result },
            Err(error) => Self::Failed { error },
        }
    }
}

/// State of the engine inside the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether a model has been loaded into the engine.
    pub initialized: bool,

    /// Key of the loaded model, if any.
    pub model_key: Option<String>,

    /// Compute requests answered since the context started.
    pub requests_served: u64,
}

/// Answer to [`EngineRequest::Status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Lifecycle state of the compute context.
    pub context: ContextState,

    /// Engine state, present only when the context is ready.
    pub engine: Option<EngineStatus>,
}

/// Replies produced by the compute context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineResponse {
    Initialized(InitializeResult),
    Single(SimilarityResult),
    Batch(Vec<BatchItem>),
    Status(StatusReport),
    Error(WireError),
}
