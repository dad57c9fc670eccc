//! Singleton lifecycle coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, HostError, Result};
use crate::host::{ContextHandle, ContextHost};
use crate::state::ContextState;

type Attempt = Shared<BoxFuture<'static, Result<ContextHandle>>>;
type Teardown = Shared<BoxFuture<'static, ()>>;

/// Internal phase. `Creating` and `Closing` carry the single shared
/// operation every concurrent caller attaches to.
enum Phase {
    Idle,
    Creating(Attempt),
    Ready(ContextHandle),
    Closing(Teardown),
}

struct Inner {
    phase: Mutex<Phase>,
    state_tx: watch::Sender<ContextState>,
    creations: AtomicU64,
}

impl Inner {
    fn publish(&self, state: ContextState) {
        self.state_tx.send_replace(state);
    }
}

enum Wait {
    Attempt(Attempt),
    Teardown(Teardown),
}

/// Owns the compute context and guarantees it is created at most once at a
/// time.
///
/// Cloning is cheap and every clone shares the same lifecycle.
#[derive(Clone)]
pub struct ComputeContextCoordinator {
    host: Arc<dyn ContextHost>,
    inner: Arc<Inner>,
}

impl ComputeContextCoordinator {
    /// Create a coordinator over `host`. No context is created until the
    /// first [`ensure_ready`](Self::ensure_ready).
    pub fn new(host: Arc<dyn ContextHost>) -> Self {
        let (state_tx, _) = watch::channel(ContextState::Uninitialized);
        Self {
            host,
            inner: Arc::new(Inner {
                phase: Mutex::new(Phase::Idle),
                state_tx,
                creations: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state. Has no side effects.
    pub fn state(&self) -> ContextState {
        *self.inner.state_tx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ContextState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of times the host has been asked to create a context.
    pub fn creation_count(&self) -> u64 {
        self.inner.creations.load(Ordering::SeqCst)
    }

    /// Handle of the ready context, if there is one.
    pub async fn current(&self) -> Option<ContextHandle> {
        match &*self.inner.phase.lock().await {
            Phase::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Resolve once a context is ready, creating or adopting one if needed.
    ///
    /// Callers arriving while an attempt is in flight wait on that same
    /// attempt. A call made during teardown waits for teardown to finish and
    /// then starts a fresh attempt.
    pub async fn ensure_ready(&self) -> Result<ContextHandle> {
        loop {
            let wait = {
                let mut phase = self.inner.phase.lock().await;
                match &*phase {
                    Phase::Ready(handle) => return Ok(handle.clone()),
                    Phase::Creating(attempt) => {
                        debug!("Joining in-flight compute context creation");
                        Wait::Attempt(attempt.clone())
                    }
                    Phase::Closing(teardown) => Wait::Teardown(teardown.clone()),
                    Phase::Idle => {
                        let attempt = self.spawn_attempt();
                        *phase = Phase::Creating(attempt.clone());
                        self.inner.publish(ContextState::Creating);
                        Wait::Attempt(attempt)
                    }
                }
            };

            match wait {
                Wait::Attempt(attempt) => return attempt.await,
                Wait::Teardown(teardown) => teardown.await,
            }
        }
    }

    /// Tear the context down if it is ready.
    ///
    /// A close requested mid-creation waits for the attempt to settle and
    /// then closes immediately. Teardown failures are logged, never returned.
    pub async fn close(&self) {
        loop {
            let wait = {
                let mut phase = self.inner.phase.lock().await;
                match &*phase {
                    Phase::Idle => {
                        debug!("Close requested with no compute context");
                        return;
                    }
                    Phase::Creating(attempt) => {
                        debug!("Close queued behind in-flight creation");
                        Wait::Attempt(attempt.clone())
                    }
                    Phase::Closing(teardown) => Wait::Teardown(teardown.clone()),
                    Phase::Ready(handle) => {
                        let teardown = self.spawn_teardown(handle.clone());
                        *phase = Phase::Closing(teardown.clone());
                        self.inner.publish(ContextState::Closing);
                        Wait::Teardown(teardown)
                    }
                }
            };

            match wait {
                Wait::Attempt(attempt) => {
                    let _ = attempt.await;
                }
                Wait::Teardown(teardown) => {
                    teardown.await;
                    return;
                }
            }
        }
    }

    /// Forget a context that became unreachable without an explicit close.
    ///
    /// Only acts if `handle` is still the ready context, so a stale report
    /// cannot discard a newer context.
    pub async fn invalidate(&self, handle: &ContextHandle) {
        let mut phase = self.inner.phase.lock().await;
        if let Phase::Ready(current) = &*phase {
            if current == handle {
                warn!("Compute context {} lost", handle.id());
                *phase = Phase::Idle;
                self.inner.publish(ContextState::Uninitialized);
            }
        }
    }

    fn spawn_attempt(&self) -> Attempt {
        let host = self.host.clone();
        let inner = self.inner.clone();

        let task = tokio::spawn({
            let inner = inner.clone();
            async move {
                let result = create_or_adopt(host.as_ref(), &inner).await;
                settle(&inner, &result).await;
                result
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let err = CoordinatorError::ContextCreationFailed(format!(
                        "creation task aborted: {e}"
                    ));
                    settle(&inner, &Err(err.clone())).await;
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    fn spawn_teardown(&self, handle: ContextHandle) -> Teardown {
        let host = self.host.clone();
        let inner = self.inner.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = host.close(&handle).await {
                warn!("Failed to close compute context {}: {e}", handle.id());
            }
            *inner.phase.lock().await = Phase::Idle;
            inner.publish(ContextState::Closed);
            info!("Compute context {} closed", handle.id());
        });

        async move {
            if let Err(e) = task.await {
                warn!("Compute context teardown task aborted: {e}");
            }
        }
        .boxed()
        .shared()
    }
}

async fn create_or_adopt(host: &dyn ContextHost, inner: &Inner) -> Result<ContextHandle> {
    match host.existing().await {
        Ok(Some(handle)) => {
            info!("Adopting existing compute context {}", handle.id());
            return Ok(handle);
        }
        Ok(None) => {}
        // Creating without knowing whether one exists could yield a second
        // context, so an unanswered query fails the attempt.
        Err(HostError::Failed(reason)) => {
            return Err(CoordinatorError::ContextCreationFailed(format!(
                "could not query existing contexts: {reason}"
            )));
        }
        Err(e) => return Err(e.into()),
    }

    inner.creations.fetch_add(1, Ordering::SeqCst);
    let handle = host.create().await?;
    info!("Created compute context {}", handle.id());
    Ok(handle)
}

/// Record the outcome of an attempt. Only moves out of `Creating`.
async fn settle(inner: &Inner, result: &Result<ContextHandle>) {
    let mut phase = inner.phase.lock().await;
    if !matches!(&*phase, Phase::Creating(_)) {
        return;
    }

    match result {
        Ok(handle) => {
            *phase = Phase::Ready(handle.clone());
            inner.publish(ContextState::Ready);
        }
        Err(e) => {
            warn!("Compute context creation failed: {e}");
            *phase = Phase::Idle;
            inner.publish(ContextState::Uninitialized);
        }
    }
}
