//! Error types carried on, or raised by, the protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding or encoding envelopes.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message could not be parsed or serialized.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure categories that can cross the context boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContextUnavailable,
    ContextCreationFailed,
    ContextLost,
    CacheUnavailable,
    CacheWriteFailed,
    ResponseTimeout,
    /// The model payload could not be obtained.
    ModelLoadFailed,
    /// A compute request arrived before the engine was initialized.
    NotInitialized,
    /// The engine itself reported a failure.
    EngineFailure,
    /// The request was not understood.
    InvalidRequest,
}

/// Serializable error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WireError {
    /// Create a new wire error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
