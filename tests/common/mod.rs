//! Shared utilities for integration and load testing.
//!
//! `MockCodec` records every outbound call and lets the test play the peer
//! by injecting `FrameEvent`s. `MockConnector` hands out mock channels
//! according to a script.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use h2mux::codec::{Channel, Codec, CodecError, FrameEvent, Settings};
use h2mux::connection::{Connection, ConnectionHandle};
use h2mux::stream::{PushPromise, ReadyHandler, StreamId};
use h2mux::{ContextId, Connector, MuxError, Request, RequestHead, Response, RouteKey};
use h2mux::{StreamHandle, StreamHandler};
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::{mpsc, oneshot, Notify};

/// How long a test waits for something that should happen before failing.
const WAIT: Duration = Duration::from_secs(5);

// -- Mock codec --

/// One outbound call made by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecCall {
    Headers { stream_id: StreamId, path: String, end_of_stream: bool },
    Data { stream_id: StreamId, len: usize, end_of_stream: bool },
    Reset { stream_id: StreamId, code: u32 },
    PendingBytes,
    Consume { stream_id: StreamId, bytes: usize },
    Flush,
}

#[derive(Debug, Default)]
struct CodecState {
    blocked: HashSet<StreamId>,
    fail_writes: bool,
}

pub struct MockCodec {
    calls: mpsc::UnboundedSender<CodecCall>,
    state: Arc<Mutex<CodecState>>,
}

impl MockCodec {
    fn record(&self, call: CodecCall) {
        let _ = self.calls.send(call);
    }

    fn check_write(&self) -> Result<(), CodecError> {
        if self.state.lock().unwrap().fail_writes {
            Err(CodecError::Other("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Codec for MockCodec {
    fn write_headers(
        &mut self,
        stream_id: StreamId,
        head: &RequestHead,
        end_of_stream: bool,
    ) -> Result<(), CodecError> {
        self.check_write()?;
        self.record(CodecCall::Headers {
            stream_id,
            path: head.path.clone(),
            end_of_stream,
        });
        Ok(())
    }

    fn write_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    ) -> Result<(), CodecError> {
        self.check_write()?;
        self.record(CodecCall::Data {
            stream_id,
            len: data.len(),
            end_of_stream,
        });
        Ok(())
    }

    fn write_reset(&mut self, stream_id: StreamId, code: u32) -> Result<(), CodecError> {
        self.record(CodecCall::Reset { stream_id, code });
        Ok(())
    }

    fn write_pending_bytes(&mut self) -> Result<(), CodecError> {
        self.record(CodecCall::PendingBytes);
        Ok(())
    }

    fn consume_bytes(&mut self, stream_id: StreamId, bytes: usize) -> Result<bool, CodecError> {
        self.record(CodecCall::Consume { stream_id, bytes });
        Ok(bytes > 0)
    }

    fn is_writable(&self, stream_id: StreamId) -> bool {
        !self.state.lock().unwrap().blocked.contains(&stream_id)
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        self.record(CodecCall::Flush);
        Ok(())
    }
}

/// The test's side of a mock channel: plays the peer and watches the codec.
pub struct MockPeer {
    events: Option<mpsc::UnboundedSender<FrameEvent>>,
    calls: mpsc::UnboundedReceiver<CodecCall>,
    state: Arc<Mutex<CodecState>>,
}

pub fn mock_channel() -> (Channel, MockPeer) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (call_tx, call_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(CodecState::default()));
    let codec = MockCodec {
        calls: call_tx,
        state: Arc::clone(&state),
    };
    let peer = MockPeer {
        events: Some(event_tx),
        calls: call_rx,
        state,
    };
    (Channel::new(codec, event_rx), peer)
}

impl MockPeer {
    pub fn send(&self, event: FrameEvent) {
        self.events
            .as_ref()
            .expect("peer already closed")
            .send(event)
            .expect("connection task gone");
    }

    pub fn headers(&self, stream_id: StreamId, status: u16, end_of_stream: bool) {
        self.send(FrameEvent::Headers {
            stream_id,
            status: Some(StatusCode::from_u16(status).unwrap()),
            headers: HeaderMap::new(),
            end_of_stream,
        });
    }

    pub fn trailers(&self, stream_id: StreamId, trailers: HeaderMap) {
        self.send(FrameEvent::Headers {
            stream_id,
            status: None,
            headers: trailers,
            end_of_stream: true,
        });
    }

    pub fn data(&self, stream_id: StreamId, data: &'static [u8], end_of_stream: bool) {
        self.send(FrameEvent::Data {
            stream_id,
            data: Bytes::from_static(data),
            end_of_stream,
        });
    }

    pub fn reset(&self, stream_id: StreamId, code: u32) {
        self.send(FrameEvent::Reset { stream_id, code });
    }

    pub fn push_promise(&self, parent: StreamId, promised: StreamId, path: &str) {
        self.send(FrameEvent::PushPromise {
            parent,
            promised,
            method: Some(Method::GET),
            path: Some(path.to_string()),
            authority: Some("example.com".to_string()),
            headers: HeaderMap::new(),
        });
    }

    pub fn window_update(&self, stream_id: StreamId) {
        self.send(FrameEvent::WindowUpdate { stream_id });
    }

    pub fn settings(&self, settings: Settings) {
        self.send(FrameEvent::Settings(settings));
    }

    pub fn go_away(&self, last_stream_id: StreamId, code: u32) {
        self.send(FrameEvent::GoAway {
            last_stream_id,
            code,
        });
    }

    pub fn fatal(&self, reason: &str) {
        self.send(FrameEvent::ConnectionError(CodecError::Fatal(reason.to_string())));
    }

    /// Drop the event sender, as if the transport closed.
    pub fn close(&mut self) {
        self.events = None;
    }

    pub fn set_writable(&self, stream_id: StreamId, writable: bool) {
        let mut state = self.state.lock().unwrap();
        if writable {
            state.blocked.remove(&stream_id);
        } else {
            state.blocked.insert(stream_id);
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Wait for a codec call matching `pred`; returns every call seen on
    /// the way, the match last.
    pub async fn wait_for(&mut self, pred: impl Fn(&CodecCall) -> bool) -> Vec<CodecCall> {
        let mut seen = Vec::new();
        loop {
            let call = within(self.calls.recv())
                .await
                .expect("codec dropped while waiting for a call");
            let done = pred(&call);
            seen.push(call);
            if done {
                return seen;
            }
        }
    }

    /// Calls already made and not yet observed.
    pub fn drain_calls(&mut self) -> Vec<CodecCall> {
        let mut calls = Vec::new();
        while let Ok(call) = self.calls.try_recv() {
            calls.push(call);
        }
        calls
    }
}

// -- Mock connector --

#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connect,
    Fail(&'static str),
    Hang,
}

struct ConnectorState {
    script: Mutex<VecDeque<ConnectOutcome>>,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<MockPeer>,
    gate: Option<Arc<Notify>>,
}

/// Connector handing out mock channels. Unscripted attempts succeed.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        Self::build(Vec::new(), None)
    }

    pub fn scripted(script: Vec<ConnectOutcome>) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        Self::build(script, None)
    }

    /// Every attempt waits for `gate` to be notified before resolving.
    pub fn gated(gate: Arc<Notify>) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        Self::build(Vec::new(), Some(gate))
    }

    fn build(
        script: Vec<ConnectOutcome>,
        gate: Option<Arc<Notify>>,
    ) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(ConnectorState {
                script: Mutex::new(script.into()),
                attempts: AtomicUsize::new(0),
                peers: tx,
                gate,
            }),
        };
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        _route: &RouteKey,
        _settings: &Settings,
    ) -> impl Future<Output = io::Result<Channel>> + Send {
        let state = Arc::clone(&self.state);
        async move {
            state.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &state.gate {
                gate.notified().await;
            }
            let outcome = state
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ConnectOutcome::Connect);
            match outcome {
                ConnectOutcome::Connect => {
                    let (channel, peer) = mock_channel();
                    let _ = state.peers.send(peer);
                    Ok(channel)
                }
                ConnectOutcome::Fail(reason) => {
                    Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason))
                }
                ConnectOutcome::Hang => std::future::pending().await,
            }
        }
    }
}

// -- Recording handler --

/// What a handler saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Headers(u16),
    Chunk(Bytes),
    Completion(HeaderMap),
    PushOffered(String),
    Error(MuxError),
    ResponseError(MuxError),
    Writability(bool),
}

/// Handler forwarding every callback, with the context it ran on.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<(Event, Option<ContextId>)>,
    accept_push: Option<Box<Recorder>>,
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<(Event, Option<ContextId>)>,
}

pub fn recorder() -> (Recorder, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Recorder {
            tx,
            accept_push: None,
        },
        Events { rx },
    )
}

impl Recorder {
    /// Accept pushes, routing pushed-stream callbacks to `child`.
    pub fn accepting_push(mut self, child: Recorder) -> Self {
        self.accept_push = Some(Box::new(child));
        self
    }

    fn record(&self, event: Event) {
        let _ = self.tx.send((event, ContextId::current()));
    }
}

impl StreamHandler for Recorder {
    fn on_response_headers(&mut self, response: &Response) {
        self.record(Event::Headers(response.status().as_u16()));
    }

    fn on_body_chunk(&mut self, chunk: Bytes) {
        self.record(Event::Chunk(chunk));
    }

    fn on_completion(&mut self, trailers: HeaderMap) {
        self.record(Event::Completion(trailers));
    }

    fn on_push_offered(&mut self, push: PushPromise) -> Option<Box<dyn StreamHandler>> {
        self.record(Event::PushOffered(push.head.path.clone()));
        self.accept_push
            .as_ref()
            .map(|child| Box::new((**child).clone()) as Box<dyn StreamHandler>)
    }

    fn on_error(&mut self, error: MuxError) {
        self.record(Event::Error(error));
    }

    fn on_response_error(&mut self, error: MuxError) {
        self.record(Event::ResponseError(error));
    }

    fn on_writability_changed(&mut self, writable: bool) {
        self.record(Event::Writability(writable));
    }
}

impl Events {
    pub async fn next(&mut self) -> Event {
        self.next_with_context().await.0
    }

    pub async fn next_with_context(&mut self) -> (Event, Option<ContextId>) {
        within(self.rx.recv())
            .await
            .expect("handler dropped while waiting for an event")
    }

    /// Next event without a deadline; for tests on a paused clock.
    pub async fn next_untimed(&mut self) -> Event {
        self.rx
            .recv()
            .await
            .expect("handler dropped while waiting for an event")
            .0
    }

    /// Events already delivered and not yet observed.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok((event, _)) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

// -- Helpers --

pub type ReadyResult = (Result<StreamHandle, MuxError>, Option<ContextId>);

/// A ready handler reporting its outcome and the context it ran on.
pub fn ready_channel() -> (ReadyHandler, oneshot::Receiver<ReadyResult>) {
    let (tx, rx) = oneshot::channel();
    let ready: ReadyHandler = Box::new(move |result: Result<StreamHandle, MuxError>| {
        let _ = tx.send((result, ContextId::current()));
    });
    (ready, rx)
}

pub async fn ready(rx: oneshot::Receiver<ReadyResult>) -> Result<StreamHandle, MuxError> {
    within(rx).await.expect("ready handler dropped").0
}

pub fn get(path: &str, handler: Recorder) -> Request {
    Request::new(
        RequestHead::new(Method::GET, path).authority("example.com"),
        handler,
    )
}

pub fn route() -> RouteKey {
    RouteKey::https("example.com", 443)
}

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting for the connection")
}

/// A connection task over a fresh mock channel.
pub fn connection() -> (ConnectionHandle, MockPeer) {
    let (channel, peer) = mock_channel();
    let conn = Connection::spawn(channel, route().to_string(), None);
    (conn, peer)
}

/// Open a GET stream on `conn` and send its headers with end-of-stream.
pub async fn open(conn: &ConnectionHandle, path: &str) -> (StreamHandle, Events) {
    let (handler, events) = recorder();
    let stream = open_with(conn, get(path, handler)).await;
    stream.send_headers(None, true).unwrap();
    (stream, events)
}

pub async fn open_with(conn: &ConnectionHandle, request: Request) -> StreamHandle {
    let (ready_tx, ready_rx) = ready_channel();
    conn.open_stream(request, ready_tx)
        .map_err(|_| ())
        .expect("connection closed");
    ready(ready_rx).await.expect("stream not created")
}
