//! Multiplexed connection subsystem.
//!
//! # Data Flow
//! ```text
//! Channel (codec + FrameEvent receiver)
//!     → task.rs: one task per connection, the connection's context
//!         ← Command queue (opens, writes, pause/resume, timers, close)
//!         ← FrameEvent queue (headers, data, reset, push, window, settings)
//!     → registry.rs: stream id → LogicalStream
//!     → StreamHandler callbacks, codec writes + flush
//!
//! Connection States:
//!     Active → Draining (GOAWAY) → Closed
//! ```
//!
//! # Design Decisions
//! - The task is the only mutator of the registry and the codec
//! - Commands are polled before frame events so caller hand-offs apply in order
//! - Teardown notifies every live stream; nothing is dropped silently

mod handle;
pub(crate) mod registry;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::resilience::TimerGeneration;
use crate::stream::{ReadyHandler, Request, StreamId};

pub use handle::ConnectionHandle;
pub use task::Connection;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Work handed to a connection's context from elsewhere.
pub(crate) enum Command {
    Open {
        request: Request,
        ready: ReadyHandler,
    },
    SendHeaders {
        stream_id: StreamId,
        body: Option<Bytes>,
        end_of_stream: bool,
    },
    SendData {
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    },
    Reset {
        stream_id: StreamId,
        code: u32,
    },
    Pause {
        stream_id: StreamId,
    },
    Resume {
        stream_id: StreamId,
    },
    SetTimeout {
        stream_id: StreamId,
        timeout: Duration,
    },
    IdleTimerFired {
        stream_id: StreamId,
        generation: TimerGeneration,
    },
    Close,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Open { request, .. } => {
                f.debug_struct("Open").field("request", request).finish()
            }
            Command::SendHeaders {
                stream_id,
                end_of_stream,
                ..
            } => f
                .debug_struct("SendHeaders")
                .field("stream_id", stream_id)
                .field("end_of_stream", end_of_stream)
                .finish(),
            Command::SendData {
                stream_id,
                data,
                end_of_stream,
            } => f
                .debug_struct("SendData")
                .field("stream_id", stream_id)
                .field("len", &data.len())
                .field("end_of_stream", end_of_stream)
                .finish(),
            Command::Reset { stream_id, code } => f
                .debug_struct("Reset")
                .field("stream_id", stream_id)
                .field("code", code)
                .finish(),
            Command::Pause { stream_id } => {
                f.debug_struct("Pause").field("stream_id", stream_id).finish()
            }
            Command::Resume { stream_id } => {
                f.debug_struct("Resume").field("stream_id", stream_id).finish()
            }
            Command::SetTimeout { stream_id, timeout } => f
                .debug_struct("SetTimeout")
                .field("stream_id", stream_id)
                .field("timeout", timeout)
                .finish(),
            Command::IdleTimerFired {
                stream_id,
                generation,
            } => f
                .debug_struct("IdleTimerFired")
                .field("stream_id", stream_id)
                .field("generation", generation)
                .finish(),
            Command::Close => f.write_str("Close"),
        }
    }
}
