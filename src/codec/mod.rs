//! Interface to the protocol codec engine.
//!
//! # Data Flow
//! ```text
//! Physical channel bytes
//!     → codec engine (framing, header compression, windows)   [external]
//!     → FrameEvent (mpsc)  → connection task dispatch
//!
//! Caller write
//!     → connection task
//!     → Codec::write_headers / write_data / write_reset
//!     → Codec::flush
//! ```
//!
//! # Design Decisions
//! - Inbound framing is a closed enum, matched exhaustively in one place
//! - The codec is only ever touched from the connection task
//! - Window arithmetic stays inside the codec; the core only reports
//!   consumed bytes and queries writability

mod settings;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::stream::{RequestHead, StreamId};

pub use settings::Settings;

/// Errors reported by the codec engine on outbound calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The stream is unknown to the codec or already closed.
    #[error("stream {0} is closed")]
    StreamClosed(StreamId),

    /// Writing would exceed the flow-control window.
    #[error("flow control error")]
    FlowControl,

    /// The channel is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// The peer violated the protocol in a way that is fatal to the connection.
    #[error("connection-fatal protocol violation: {0}")]
    Fatal(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Framing events emitted by the codec engine, in wire order.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A complete header block arrived on a stream.
    Headers {
        stream_id: StreamId,
        /// `:status` pseudo-header, if the block carried one.
        status: Option<StatusCode>,
        headers: HeaderMap,
        end_of_stream: bool,
    },
    /// A DATA frame payload arrived on a stream.
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    },
    /// The peer reset a stream.
    Reset { stream_id: StreamId, code: u32 },
    /// The peer promised a pushed response associated with `parent`.
    PushPromise {
        parent: StreamId,
        promised: StreamId,
        method: Option<Method>,
        path: Option<String>,
        authority: Option<String>,
        headers: HeaderMap,
    },
    /// The remote window for a stream changed; writability may have changed.
    WindowUpdate { stream_id: StreamId },
    /// The peer sent its SETTINGS.
    Settings(Settings),
    /// The peer is shutting the connection down.
    GoAway { last_stream_id: StreamId, code: u32 },
    /// The codec detected a connection-fatal condition.
    ConnectionError(CodecError),
}

/// Outbound operations and flow-control accounting of the codec engine.
///
/// Implementations are driven from a single connection task and need not be
/// thread-safe beyond `Send`.
pub trait Codec: Send + 'static {
    /// Queue a HEADERS frame built from `head`.
    fn write_headers(
        &mut self,
        stream_id: StreamId,
        head: &RequestHead,
        end_of_stream: bool,
    ) -> Result<(), CodecError>;

    /// Queue a DATA frame.
    fn write_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    ) -> Result<(), CodecError>;

    /// Queue a RST_STREAM frame.
    fn write_reset(&mut self, stream_id: StreamId, code: u32) -> Result<(), CodecError>;

    /// Push bytes held back by the outbound flow controller.
    fn write_pending_bytes(&mut self) -> Result<(), CodecError>;

    /// Return `bytes` of receive window for `stream_id`.
    ///
    /// Returns `true` when this caused a WINDOW_UPDATE to be queued.
    fn consume_bytes(&mut self, stream_id: StreamId, bytes: usize) -> Result<bool, CodecError>;

    /// Whether the remote window for `stream_id` currently allows writing.
    fn is_writable(&self, stream_id: StreamId) -> bool;

    /// Flush queued frames to the physical channel.
    fn flush(&mut self) -> Result<(), CodecError>;
}

/// An established, protocol-upgraded physical channel.
pub struct Channel {
    pub codec: Box<dyn Codec>,
    pub events: mpsc::UnboundedReceiver<FrameEvent>,
}

impl Channel {
    pub fn new(codec: impl Codec, events: mpsc::UnboundedReceiver<FrameEvent>) -> Self {
        Self {
            codec: Box::new(codec),
            events,
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}
