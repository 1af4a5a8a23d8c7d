//! Caller-side handle to a logical stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::connection::{Command, ConnectionHandle};
use crate::context::ContextId;
use crate::error::MuxResult;
use crate::stream::{RequestId, StreamId};

/// Handle to a stream living on a connection task.
///
/// Every operation is handed off to the connection's context and applied
/// there in call order; nothing here blocks. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    id: StreamId,
    request_id: RequestId,
    conn: ConnectionHandle,
    writable: Arc<AtomicBool>,
}

impl StreamHandle {
    pub(crate) fn new(
        id: StreamId,
        request_id: RequestId,
        conn: ConnectionHandle,
        writable: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            request_id,
            conn,
            writable,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Context of the connection that owns this stream.
    pub fn context(&self) -> ContextId {
        self.conn.context()
    }

    /// Whether the remote flow-control window currently admits more data.
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    /// Send the request headers, optionally followed by a body.
    pub fn send_headers(&self, body: Option<Bytes>, end_of_stream: bool) -> MuxResult<()> {
        self.conn.send(Command::SendHeaders {
            stream_id: self.id,
            body,
            end_of_stream,
        })
    }

    /// Send a chunk of request body.
    pub fn send_data(&self, data: Bytes, end_of_stream: bool) -> MuxResult<()> {
        self.conn.send(Command::SendData {
            stream_id: self.id,
            data,
            end_of_stream,
        })
    }

    /// Reset the stream. Idempotent; a no-op once the stream is gone.
    pub fn reset(&self, code: u32) {
        let _ = self.conn.send(Command::Reset {
            stream_id: self.id,
            code,
        });
    }

    /// Stop delivering inbound chunks; they are buffered and their bytes are
    /// withheld from the peer's window until [`resume`](Self::resume).
    pub fn pause(&self) {
        let _ = self.conn.send(Command::Pause { stream_id: self.id });
    }

    /// Deliver buffered chunks and return their bytes to the peer's window.
    pub fn resume(&self) {
        let _ = self.conn.send(Command::Resume { stream_id: self.id });
    }

    /// (Re)arm the request's idle timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        let _ = self.conn.send(Command::SetTimeout {
            stream_id: self.id,
            timeout,
        });
    }
}
