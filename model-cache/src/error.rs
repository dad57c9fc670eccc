//! Error types for the model cache.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by [`crate::ModelBlobCache`].
///
/// Both variants are recoverable: callers fall back to fetching the model
/// from its source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The persistent store could not be opened or read.
    #[error("cache store `{store}` unavailable: {reason}")]
    CacheUnavailable { store: String, reason: String },

    /// Storing or deleting an entry failed (quota exceeded, disk error, ...).
    #[error("cache write failed for `{key}`: {reason}")]
    CacheWriteFailed { key: String, reason: String },
}

/// Errors raised while acquiring a model payload.
///
/// `Clone` so that every caller attached to a shared in-flight load receives
/// the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The request to the model source failed.
    #[error("failed to fetch model from {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The model source answered with a non-success status.
    #[error("model source {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The model source returned no bytes.
    #[error("model source {url} returned an empty payload")]
    EmptyPayload { url: String },

    /// The background load task was cancelled or panicked.
    #[error("model load aborted: {0}")]
    Aborted(String),
}
