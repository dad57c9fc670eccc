//! Error types for context coordination.

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors returned by [`crate::ComputeContextCoordinator::ensure_ready`].
///
/// Every waiter on a shared creation attempt receives a clone of the same
/// error. Both variants leave the coordinator `Uninitialized`, so a later
/// call may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The host cannot create or host a compute context at all.
    #[error("compute context unavailable: {0}")]
    ContextUnavailable(String),

    /// Creation was attempted and failed.
    #[error("compute context creation failed: {0}")]
    ContextCreationFailed(String),
}

/// Errors reported by a [`crate::ContextHost`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The capability needed to host a context is missing.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The host operation was attempted and failed.
    #[error("host operation failed: {0}")]
    Failed(String),
}

impl From<HostError> for CoordinatorError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::CapabilityUnavailable(reason) => Self::ContextUnavailable(reason),
            HostError::Failed(reason) => Self::ContextCreationFailed(reason),
        }
    }
}
