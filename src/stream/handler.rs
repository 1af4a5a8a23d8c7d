//! Caller-supplied callbacks.

use bytes::Bytes;
use http::HeaderMap;

use crate::error::MuxError;
use crate::stream::{PushPromise, Response, StreamHandle};

/// Receives the stream once the request is bound to a connection, or the
/// reason it could not be.
///
/// Runs on the connection's task.
pub type ReadyHandler = Box<dyn FnOnce(Result<StreamHandle, MuxError>) + Send + 'static>;

/// Per-stream event sink.
///
/// All methods run on the owning connection's task. A handler sees exactly one
/// terminal call: `on_completion` or a single `on_error`.
pub trait StreamHandler: Send + 'static {
    fn on_response_headers(&mut self, _response: &Response) {}

    fn on_body_chunk(&mut self, _chunk: Bytes) {}

    /// The response finished. `trailers` is empty when none were sent.
    fn on_completion(&mut self, _trailers: HeaderMap) {}

    /// The peer offers a pushed response. Return a handler to accept it;
    /// `None` rejects the push and the promised stream is cancelled.
    fn on_push_offered(&mut self, _push: PushPromise) -> Option<Box<dyn StreamHandler>> {
        None
    }

    /// Request-level failure.
    ///
    /// The default routes the error to the log so it is never lost.
    fn on_error(&mut self, error: MuxError) {
        tracing::error!(error = %error, "Unhandled stream error");
    }

    /// Failure after the response started, delivered alongside `on_error`
    /// for resets and connection loss.
    fn on_response_error(&mut self, _error: MuxError) {}

    /// The remote flow-control window opened (`true`) or filled up (`false`).
    fn on_writability_changed(&mut self, _writable: bool) {}
}
