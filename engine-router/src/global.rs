//! Process-wide router.
//!
//! Callers that cannot thread a router through share the one installed
//! here. Tests call [`reset`] between cases.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::router::MessageRouter;

static GLOBAL: RwLock<Option<Arc<MessageRouter>>> = RwLock::new(None);

/// Install `router` as the shared instance, returning the one it replaces.
pub fn install(router: Arc<MessageRouter>) -> Option<Arc<MessageRouter>> {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(router)
}

/// The shared router, if one is installed.
pub fn get() -> Option<Arc<MessageRouter>> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Remove the shared router and shut it down.
pub async fn reset() {
    let previous = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(router) = previous {
        router.shutdown().await;
        debug!("Global router reset");
    }
}
