//! # Compute Context
//!
//! Lifecycle coordination for the single, expensive, isolated execution
//! context that hosts the similarity engine.
//!
//! ## State machine
//!
//! ```text
//!  Uninitialized ──ensure_ready──► Creating ──ok──► Ready ──close──► Closing ──► Closed
//!        ▲                            │                                          │
//!        └────────────── err ─────────┘◄────────────── ensure_ready ─────────────┘
//! ```
//!
//! Concurrent `ensure_ready` calls collapse onto one shared in-flight
//! attempt, so N callers cause exactly one creation on the host. An already
//! running context (for example one that outlived a previous coordinator) is
//! adopted instead of created.

pub mod coordinator;
pub mod error;
pub mod host;
pub mod state;

pub use coordinator::ComputeContextCoordinator;
pub use error::{CoordinatorError, HostError, Result};
pub use host::{ContextHandle, ContextHost};
pub use state::ContextState;
