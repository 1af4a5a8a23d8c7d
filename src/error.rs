//! Error kinds delivered to stream handlers and waiters.

use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;

/// Numeric reset / go-away codes used by the core when it resets a stream itself.
pub mod reset_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const CANCEL: u32 = 0x8;
}

/// Errors surfaced to callers of the multiplexing core.
///
/// Cloneable so one failure can be fanned out to every waiter or stream it
/// concerns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MuxError {
    /// The physical connection could not be established. The pool stays retryable.
    #[error("connection establishment failed: {0}")]
    ConnectionEstablishment(String),

    /// The stream was reset, by the peer or locally.
    #[error("stream reset with code {code:#x}")]
    StreamReset { code: u32 },

    /// No inbound data within the request's idle timeout.
    #[error("the timeout period of {}ms has been exceeded", .0.as_millis())]
    Timeout(Duration),

    /// The connection carrying the stream closed before the stream terminated.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer is shutting the connection down and will not process this stream.
    #[error("connection going away (last stream {last_stream_id}, code {code:#x})")]
    GoAway { last_stream_id: u32, code: u32 },

    /// The peer sent something this stream cannot make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An outbound write was rejected by the codec engine.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Too many callers are already waiting for the connection.
    #[error("waiter queue full ({0} pending)")]
    WaiterQueueFull(usize),

    /// The local stream identifier space is used up.
    #[error("stream identifiers exhausted")]
    StreamIdsExhausted,
}

/// Result type for multiplexing operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_configured_duration() {
        let err = MuxError::Timeout(Duration::from_millis(250));
        assert_eq!(
            err.to_string(),
            "the timeout period of 250ms has been exceeded"
        );
    }

    #[test]
    fn reset_message_is_hex() {
        let err = MuxError::StreamReset { code: reset_code::CANCEL };
        assert_eq!(err.to_string(), "stream reset with code 0x8");
    }
}
