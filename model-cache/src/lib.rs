//! # Model Cache
//!
//! Durable, key-addressed storage for large similarity-model binaries, plus a
//! loader that fetches a model at most once per identifier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Model Cache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ModelLoader ──► ModelBlobCache ──► BlobStore (fs / memory)     │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  ModelFetcher (HTTP)                                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cache miss is a normal outcome, not an error. Write failures (quota,
//! disk errors) are reported as [`CacheError::CacheWriteFailed`] and the
//! loader treats them as non-fatal: the model is simply fetched again the
//! next time it is needed.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod fs_store;
pub mod loader;
pub mod store;

pub use cache::ModelBlobCache;
pub use error::{CacheError, LoadError, Result};
pub use fetcher::{HttpModelFetcher, ModelFetcher};
pub use fs_store::FsBlobStore;
pub use loader::{LoadedModel, ModelLoader};
pub use store::{BlobStore, MemoryBlobStore, StoreHandle};

/// Default name of the store holding model payloads.
pub const DEFAULT_STORE_NAME: &str = "model-cache";
