//! Message transport between the router and the compute context.
//!
//! Outbound requests go through [`Transport::send`]. Replies, and notice
//! that a context went away, come back as [`Inbound`] items on a channel the
//! router pumps.

use async_trait::async_trait;
use simhost_engine_protocol::{RequestEnvelope, ResponseEnvelope};
use thiserror::Error;

/// Best-effort delivery of request envelopes into the compute context.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `envelope` to the context. Exactly one reply is expected later
    /// on the inbound channel, unless the context is lost first.
    async fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError>;
}

/// Errors delivering a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No live context is listening.
    #[error("compute context unreachable: {0}")]
    Unreachable(String),
}

/// Traffic flowing from the compute context back to the router.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A reply to an earlier request.
    Reply(ResponseEnvelope),

    /// The context with this id stopped; its in-flight requests will never
    /// be answered.
    ContextLost { context_id: String, reason: String },
}
