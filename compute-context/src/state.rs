//! Observable lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the compute context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// No context exists and none is being created.
    #[default]
    Uninitialized,
    /// A creation (or adoption) attempt is in flight.
    Creating,
    /// The context exists and accepts requests.
    Ready,
    /// Teardown is in progress.
    Closing,
    /// The context was explicitly closed. The next demand starts over.
    Closed,
}

impl ContextState {
    /// Whether requests may be forwarded into the context.
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether a new `ensure_ready` would trigger creation.
    pub fn needs_creation(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Closed)
    }

    /// Short label for logs and status reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_labels_match_display() {
        for state in [
            ContextState::Uninitialized,
            ContextState::Creating,
            ContextState::Ready,
            ContextState::Closing,
            ContextState::Closed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn test_closed_needs_creation() {
        assert!(ContextState::Closed.needs_creation());
        assert!(ContextState::Uninitialized.needs_creation());
        assert!(!ContextState::Creating.needs_creation());
        assert!(!ContextState::Ready.needs_creation());
    }
}
