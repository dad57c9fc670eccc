//! Error types for routing and runtime wiring.

use std::path::PathBuf;
use std::time::Duration;

use simhost_compute_context::CoordinatorError;
use simhost_engine_protocol::{ErrorKind, RequestId, RequestKind, WireError};
use thiserror::Error;

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors a caller of [`crate::MessageRouter`] can observe.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    /// The compute context could not be made ready. Nothing was sent.
    #[error("compute context unavailable: {0}")]
    ContextUnavailable(#[from] CoordinatorError),

    /// The context went away while the request was in flight.
    #[error("compute context lost: {0}")]
    ContextLost(String),

    /// No reply arrived in time. Any later reply is discarded.
    #[error("no response to {kind:?} request {id} within {timeout:?}")]
    ResponseTimeout {
        id: RequestId,
        kind: RequestKind,
        timeout: Duration,
    },

    /// The engine answered with an error.
    #[error("engine error: {0}")]
    Engine(WireError),

    /// The reply did not match the request.
    #[error("unexpected response to {kind:?}: {detail}")]
    Protocol { kind: RequestKind, detail: String },

    /// A default model was requested but none is configured.
    #[error("no default model URL configured")]
    NoDefaultModel,
}

impl RouterError {
    /// Wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContextUnavailable(CoordinatorError::ContextUnavailable(_)) => {
                ErrorKind::ContextUnavailable
            }
            Self::ContextUnavailable(CoordinatorError::ContextCreationFailed(_)) => {
                ErrorKind::ContextCreationFailed
            }
            Self::ContextLost(_) => ErrorKind::ContextLost,
            Self::ResponseTimeout { .. } => ErrorKind::ResponseTimeout,
            Self::Engine(err) => err.kind,
            Self::Protocol { .. } | Self::NoDefaultModel => ErrorKind::InvalidRequest,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContextUnavailable(_) | Self::ContextLost(_) | Self::ResponseTimeout { .. }
        )
    }
}

impl From<WireError> for RouterError {
    fn from(err: WireError) -> Self {
        match err.kind {
            ErrorKind::ContextLost => Self::ContextLost(err.message),
            _ => Self::Engine(err),
        }
    }
}

/// Failure reported by a [`crate::SimilarityEngine`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    /// Create an engine error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for [`crate::EngineConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
