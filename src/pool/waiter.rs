//! A caller waiting for the route's connection.

use crate::context::ContextId;
use crate::stream::{ReadyHandler, Request};

/// Pending request queued until a connection is ready.
///
/// Consumed exactly once: dispatched onto a connection or failed.
pub(crate) struct Waiter {
    pub request: Request,
    pub ready: ReadyHandler,
    /// Context the caller ran on, if any.
    pub caller: Option<ContextId>,
}

impl Waiter {
    pub fn new(request: Request, ready: ReadyHandler, caller: Option<ContextId>) -> Self {
        Self {
            request,
            ready,
            caller,
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("request", &self.request)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}
