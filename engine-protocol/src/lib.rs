//! # Engine Protocol
//!
//! The closed set of messages exchanged between callers, the router, and the
//! compute context hosting the similarity engine.
//!
//! Every request travels in an [`Envelope`] addressed to a [`Target`] and
//! carrying a [`RequestId`]. The reply reuses that id, which is how the
//! router matches it back to the waiting caller.

pub mod envelope;
pub mod error;
pub mod messages;

pub use envelope::{Envelope, RequestEnvelope, RequestId, ResponseEnvelope, Target};
pub use error::{ErrorKind, ProtocolError, WireError};
pub use messages::{
    BatchItem, EngineRequest, EngineResponse, EngineStatus, InitializeResult, RequestKind,
    SimilarityQuery, SimilarityResult, StatusReport,
};
