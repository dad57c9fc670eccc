//! Message envelopes and addressing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::messages::{EngineRequest, EngineResponse};

/// Where a message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The isolated compute context hosting the engine.
    Offscreen,
    /// A script injected into a page.
    ContentScript,
    /// Long-lived background logic.
    Background,
}

/// Correlation id shared by a request and its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Unit of exchange over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Correlation id.
    pub id: RequestId,

    /// Sender.
    pub source: Target,

    /// Recipient.
    pub target: Target,

    /// When the message was created.
    pub sent_at: DateTime<Utc>,

    /// Operation-specific payload.
    pub body: T,
}

/// A request on its way into the compute context.
pub type RequestEnvelope = Envelope<EngineRequest>;

/// A reply on its way back to the router.
pub type ResponseEnvelope = Envelope<EngineResponse>;

impl<T> Envelope<T> {
    /// Wrap `body` in a new envelope with a fresh id.
    pub fn new(source: Target, target: Target, body: T) -> Self {
        Self {
            id: RequestId::new(),
            source,
            target,
            sent_at: Utc::now(),
            body,
        }
    }

    /// Build the reply to this envelope: same id, addresses swapped.
    pub fn reply<U>(&self, body: U) -> Envelope<U> {
        Envelope {
            id: self.id,
            source: self.target,
            target: self.source,
            sent_at: Utc::now(),
            body,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode as JSON for transports that carry text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}
