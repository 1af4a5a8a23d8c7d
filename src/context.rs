//! Execution-context identity.
//!
//! Every connection runs on its own task, and that task is the connection's
//! execution context. Code running inside the task can find out which context
//! it is on through [`ContextId::current`], which is how registry confinement
//! is asserted and how callers are compared against a connection.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for context IDs.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT: ContextId;
}

/// Identity of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Generate a new unique context ID.
    pub fn new() -> Self {
        Self(CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The context the calling code runs on, if it runs inside one.
    pub fn current() -> Option<ContextId> {
        CURRENT.try_with(|id| *id).ok()
    }

    /// Whether the calling code runs on this context.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(*self)
    }

    /// Run `fut` with this context installed as the current one.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
