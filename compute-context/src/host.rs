//! Host context-creation primitive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Opaque reference to a live compute context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle {
    id: String,
    created_at: DateTime<Utc>,
}

impl ContextHandle {
    /// Create a handle with a fresh time-ordered identifier.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::now_v7().to_string())
    }

    /// Create a handle for a context the host already identifies.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }

    /// Host-assigned identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When this handle was minted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for ContextHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The platform capability that actually creates compute contexts.
///
/// The coordinator relies on exactly these three operations. Any of them may
/// report [`HostError::CapabilityUnavailable`].
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// Return the context that already exists, if any.
    async fn existing(&self) -> Result<Option<ContextHandle>, HostError>;

    /// Create a new context. Called at most once per creation attempt.
    async fn create(&self) -> Result<ContextHandle, HostError>;

    /// Tear down the given context.
    async fn close(&self, handle: &ContextHandle) -> Result<(), HostError>;
}
