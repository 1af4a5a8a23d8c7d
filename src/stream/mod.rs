//! Logical streams.
//!
//! # Data Flow
//! ```text
//! Caller builds Request (head + StreamHandler)
//!     → pool dispatch → connection task creates LogicalStream
//!     → ready handler receives StreamHandle
//!
//! Inbound: FrameEvent → registry lookup → LogicalStream → StreamHandler
//! Outbound: StreamHandle → Command → connection task → Codec
//! ```
//!
//! # Design Decisions
//! - The LogicalStream lives only inside the connection's registry; callers
//!   hold a StreamHandle that carries the stream id, never the stream itself
//! - Exactly one terminal notification per request handler
//! - Inbound chunks received while paused are buffered, not dropped

mod handle;
mod handler;
pub(crate) mod logical;
mod request;
mod response;
mod state;

pub use handle::StreamHandle;
pub use handler::{ReadyHandler, StreamHandler};
pub use request::{Request, RequestHead, RequestId};
pub use response::{PushPromise, Response};
pub use state::StreamState;

/// Protocol-level stream identifier.
pub type StreamId = u32;
