//! Per-exchange state held in a connection's registry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::MuxError;
use crate::resilience::{IdleTimeout, TimerGeneration, TimerOutcome};
use crate::stream::{
    PushPromise, RequestHead, RequestId, Response, StreamHandler, StreamId, StreamState,
};

/// A logical request/response exchange.
///
/// Owned by the connection's `StreamRegistry` and only ever touched from the
/// connection task.
pub(crate) struct LogicalStream {
    id: StreamId,
    request_id: RequestId,
    head: RequestHead,
    handler: Box<dyn StreamHandler>,
    response: Option<Response>,
    state: StreamState,
    /// Pushed stream: we never write on it.
    passive: bool,

    paused: bool,
    /// Bytes received while paused, not yet returned to the peer's window.
    unconsumed: usize,
    buffered: VecDeque<Bytes>,
    /// Completion that arrived while paused.
    deferred_end: Option<HeaderMap>,

    /// The handler has seen its terminal call.
    terminated: bool,
    writable: Arc<AtomicBool>,

    idle: IdleTimeout,
    idle_timer: Option<JoinHandle<()>>,
}

impl LogicalStream {
    pub fn new(
        id: StreamId,
        request_id: RequestId,
        head: RequestHead,
        handler: Box<dyn StreamHandler>,
        writable: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            request_id,
            head,
            handler,
            response: None,
            state: StreamState::Open,
            passive: false,
            paused: false,
            unconsumed: 0,
            buffered: VecDeque::new(),
            deferred_end: None,
            terminated: false,
            writable,
            idle: IdleTimeout::new(),
            idle_timer: None,
        }
    }

    /// A server-pushed stream. Its request side is closed from the start.
    pub fn pushed(
        id: StreamId,
        request_id: RequestId,
        head: RequestHead,
        handler: Box<dyn StreamHandler>,
        writable: Arc<AtomicBool>,
    ) -> Self {
        let mut stream = Self::new(id, request_id, head, handler, writable);
        stream.state = StreamState::HalfClosedLocal;
        stream.passive = true;
        stream
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Closed on the wire and the handler has been told. Safe to drop.
    pub fn is_finished(&self) -> bool {
        self.state.is_closed() && self.terminated
    }

    // -- Outbound bookkeeping --

    pub fn mark_headers_sent(&mut self, end_of_stream: bool) {
        self.state = self.state.on_headers_sent(end_of_stream);
    }

    pub fn mark_local_end(&mut self) {
        self.state = self.state.on_local_end();
    }

    pub fn mark_closed(&mut self) {
        self.state = StreamState::Closed;
    }

    // -- Inbound events --

    pub fn on_headers(
        &mut self,
        status: Option<StatusCode>,
        headers: HeaderMap,
        end_of_stream: bool,
    ) -> Result<(), MuxError> {
        if self.response.is_none() {
            let status = status.ok_or_else(|| {
                MuxError::Protocol("response headers without :status".to_string())
            })?;
            let response = Response::new(status, headers);
            self.cancel_idle();
            self.handler.on_response_headers(&response);
            self.response = Some(response);
            if end_of_stream {
                self.remote_end(HeaderMap::new());
            }
        } else if end_of_stream {
            self.remote_end(headers);
        } else {
            tracing::debug!(
                stream_id = self.id,
                request_id = %self.request_id,
                "Ignoring non-final header block after response"
            );
        }
        Ok(())
    }

    /// Returns the number of bytes the handler consumed right away.
    pub fn on_data(
        &mut self,
        data: Bytes,
        end_of_stream: bool,
        now: Instant,
    ) -> Result<usize, MuxError> {
        self.idle.record_data(now);

        if self.response.is_none() {
            return Err(MuxError::Protocol(
                "data received before response headers".to_string(),
            ));
        }
        if self.terminated {
            return Ok(data.len());
        }

        let len = data.len();
        let consumed = if self.paused {
            if len > 0 {
                self.unconsumed += len;
                self.buffered.push_back(data);
            }
            0
        } else {
            if len > 0 {
                self.handler.on_body_chunk(data);
            }
            len
        };

        if end_of_stream {
            self.remote_end(HeaderMap::new());
        }
        Ok(consumed)
    }

    pub fn on_reset(&mut self, code: u32) {
        self.state = StreamState::Closed;
        self.fail(MuxError::StreamReset { code }, true);
    }

    pub fn offer_push(&mut self, push: PushPromise) -> Option<Box<dyn StreamHandler>> {
        if self.terminated {
            return None;
        }
        self.handler.on_push_offered(push)
    }

    pub fn set_writable(&mut self, writable: bool) {
        let previous = self.writable.swap(writable, Ordering::AcqRel);
        if previous != writable && !self.terminated {
            self.handler.on_writability_changed(writable);
        }
    }

    // -- Flow control --

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Deliver everything held back while paused.
    ///
    /// Returns the byte count to hand back to the codec's window accounting.
    pub fn resume(&mut self) -> usize {
        if !self.paused {
            return 0;
        }
        self.paused = false;

        while let Some(chunk) = self.buffered.pop_front() {
            if self.terminated {
                break;
            }
            self.handler.on_body_chunk(chunk);
        }
        self.buffered.clear();

        if let Some(trailers) = self.deferred_end.take() {
            self.complete(trailers);
        }
        std::mem::take(&mut self.unconsumed)
    }

    /// Bytes held back by a pause that were never handed to the handler.
    pub fn take_unconsumed(&mut self) -> usize {
        std::mem::take(&mut self.unconsumed)
    }

    // -- Terminal notifications --

    /// Deliver `error` as the terminal notification. No-op once terminated.
    ///
    /// Dropped chunks stay counted in `unconsumed` until the connection
    /// returns them to the window.
    pub fn fail(&mut self, error: MuxError, notify_response: bool) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.cancel_idle();
        self.buffered.clear();
        self.deferred_end = None;

        tracing::debug!(
            stream_id = self.id,
            request_id = %self.request_id,
            error = %error,
            "Stream failed"
        );

        if notify_response && self.response.is_some() {
            self.handler.on_response_error(error.clone());
        }
        self.handler.on_error(error);
    }

    fn remote_end(&mut self, trailers: HeaderMap) {
        self.state = self.state.on_remote_end();
        if self.paused {
            self.deferred_end = Some(trailers);
        } else {
            self.complete(trailers);
        }
    }

    fn complete(&mut self, trailers: HeaderMap) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.cancel_idle();
        self.handler.on_completion(trailers);
    }

    // -- Idle timeout --

    /// Arm the idle timeout, cancelling any scheduled timer.
    ///
    /// The caller schedules the returned generation and hands the task back
    /// through [`set_idle_timer`](Self::set_idle_timer).
    pub fn arm_idle(&mut self, timeout: Duration) -> TimerGeneration {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        self.idle.arm(timeout)
    }

    pub fn set_idle_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.idle_timer.replace(timer) {
            previous.abort();
        }
    }

    pub fn on_idle_fire(&mut self, generation: TimerGeneration, now: Instant) -> TimerOutcome {
        let outcome = self.idle.fire(generation, now);
        if matches!(outcome, TimerOutcome::Expired(_)) {
            self.idle_timer = None;
        }
        outcome
    }

    pub fn cancel_idle(&mut self) {
        self.idle.disarm();
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for LogicalStream {
    fn drop(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use http::Method;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Headers(u16),
        Chunk(usize),
        Completion(usize),
        Error(MuxError),
        ResponseError(MuxError),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Seen>>>);

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }
    }

    impl StreamHandler for Recorder {
        fn on_response_headers(&mut self, response: &Response) {
            self.0.lock().unwrap().push(Seen::Headers(response.status().as_u16()));
        }
        fn on_body_chunk(&mut self, chunk: Bytes) {
            self.0.lock().unwrap().push(Seen::Chunk(chunk.len()));
        }
        fn on_completion(&mut self, trailers: HeaderMap) {
            self.0.lock().unwrap().push(Seen::Completion(trailers.len()));
        }
        fn on_error(&mut self, error: MuxError) {
            self.0.lock().unwrap().push(Seen::Error(error));
        }
        fn on_response_error(&mut self, error: MuxError) {
            self.0.lock().unwrap().push(Seen::ResponseError(error));
        }
    }

    fn stream(recorder: &Recorder) -> LogicalStream {
        let mut s = LogicalStream::new(
            1,
            RequestId::new(),
            RequestHead::new(Method::GET, "/"),
            Box::new(recorder.clone()),
            Arc::new(AtomicBool::new(true)),
        );
        s.mark_headers_sent(true);
        s
    }

    #[test]
    fn trailers_complete_the_stream() {
        let rec = Recorder::default();
        let mut s = stream(&rec);

        s.on_headers(Some(StatusCode::OK), HeaderMap::new(), false).unwrap();
        s.on_data(Bytes::from_static(b"abc"), false, Instant::now()).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        s.on_headers(None, trailers, true).unwrap();

        assert_eq!(
            rec.seen(),
            vec![Seen::Headers(200), Seen::Chunk(3), Seen::Completion(1)]
        );
        assert!(s.is_finished());
    }

    #[test]
    fn paused_chunks_are_buffered_and_counted() {
        let rec = Recorder::default();
        let mut s = stream(&rec);
        s.on_headers(Some(StatusCode::OK), HeaderMap::new(), false).unwrap();

        s.pause();
        for len in [10, 20, 5] {
            let consumed = s
                .on_data(Bytes::from(vec![0u8; len]), false, Instant::now())
                .unwrap();
            assert_eq!(consumed, 0);
        }
        s.on_data(Bytes::new(), true, Instant::now()).unwrap();
        assert_eq!(rec.seen(), vec![Seen::Headers(200)]);

        assert_eq!(s.resume(), 35);
        assert_eq!(s.resume(), 0);
        assert_eq!(
            rec.seen(),
            vec![
                Seen::Headers(200),
                Seen::Chunk(10),
                Seen::Chunk(20),
                Seen::Chunk(5),
                Seen::Completion(0),
            ]
        );
    }

    #[test]
    fn reset_reaches_request_and_response_once() {
        let rec = Recorder::default();
        let mut s = stream(&rec);
        s.on_headers(Some(StatusCode::OK), HeaderMap::new(), false).unwrap();

        s.on_reset(0x8);
        s.on_reset(0x8);
        s.fail(MuxError::ConnectionClosed, true);

        let err = MuxError::StreamReset { code: 0x8 };
        assert_eq!(
            rec.seen(),
            vec![
                Seen::Headers(200),
                Seen::ResponseError(err.clone()),
                Seen::Error(err),
            ]
        );
        assert!(s.is_finished());
    }

    #[test]
    fn reset_while_paused_keeps_window_accounting() {
        let rec = Recorder::default();
        let mut s = stream(&rec);
        s.on_headers(Some(StatusCode::OK), HeaderMap::new(), false).unwrap();

        s.pause();
        s.on_data(Bytes::from(vec![0u8; 10]), false, Instant::now()).unwrap();
        s.on_data(Bytes::from(vec![0u8; 25]), false, Instant::now()).unwrap();
        s.on_reset(0x8);

        assert_eq!(s.take_unconsumed(), 35);
        assert_eq!(s.take_unconsumed(), 0);
        assert!(!rec.seen().iter().any(|seen| matches!(seen, Seen::Chunk(_))));
    }

    #[test]
    fn headers_without_status_are_rejected() {
        let rec = Recorder::default();
        let mut s = stream(&rec);
        assert!(matches!(
            s.on_headers(None, HeaderMap::new(), false),
            Err(MuxError::Protocol(_))
        ));
    }
}
