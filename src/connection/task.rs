//! The connection task: owns the codec and the stream registry.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{Channel, Codec, CodecError, FrameEvent, Settings};
use crate::connection::registry::StreamRegistry;
use crate::connection::{Command, ConnectionHandle, ConnectionId};
use crate::context::ContextId;
use crate::error::{reset_code, MuxError};
use crate::observability::metrics;
use crate::resilience::{TimerGeneration, TimerOutcome};
use crate::stream::logical::LogicalStream;
use crate::stream::{
    PushPromise, ReadyHandler, Request, RequestHead, RequestId, StreamHandle, StreamId,
};

/// Highest stream id a client may open.
const MAX_STREAM_ID: StreamId = 0x7fff_ffff;

/// One multiplexed physical connection.
///
/// Runs as its own task; that task is the connection's execution context.
/// Everything else talks to it through a [`ConnectionHandle`].
pub struct Connection {
    id: ConnectionId,
    context: ContextId,
    route: String,
    codec: Box<dyn Codec>,
    events: mpsc::UnboundedReceiver<FrameEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: ConnectionHandle,
    registry: StreamRegistry,
    next_stream_id: StreamId,
    remote_settings: Settings,
    /// Opens waiting for the peer's concurrency limit.
    parked: VecDeque<(Request, ReadyHandler)>,
    draining: Arc<AtomicBool>,
    go_away: Option<(StreamId, u32)>,
    default_idle_timeout: Option<Duration>,
}

impl Connection {
    /// Start a connection task over `channel` and return its handle.
    pub fn spawn(
        channel: Channel,
        route: impl Into<String>,
        default_idle_timeout: Option<Duration>,
    ) -> ConnectionHandle {
        let id = ConnectionId::new();
        let context = ContextId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let draining = Arc::new(AtomicBool::new(false));
        let handle = ConnectionHandle::new(id, context, tx, Arc::clone(&draining));

        let connection = Connection {
            id,
            context,
            route: route.into(),
            codec: channel.codec,
            events: channel.events,
            commands: rx,
            handle: handle.clone(),
            registry: StreamRegistry::new(context),
            next_stream_id: 1,
            remote_settings: Settings::default(),
            parked: VecDeque::new(),
            draining,
            go_away: None,
            default_idle_timeout,
        };

        tokio::spawn(context.scope(connection.run()));
        handle
    }

    async fn run(mut self) {
        tracing::debug!(
            connection_id = %self.id,
            context = %self.context,
            route = %self.route,
            "Connection task started"
        );
        metrics::record_connection_opened(&self.route);

        let reason = loop {
            let flow = tokio::select! {
                biased;

                Some(command) = self.commands.recv() => self.handle_command(command),
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => ControlFlow::Break("channel closed"),
                },
            };

            if let ControlFlow::Break(reason) = flow {
                break reason;
            }
            if self.draining.load(Ordering::Acquire) && self.registry.is_empty() {
                break "drained after go-away";
            }
        };

        self.teardown(reason);
    }

    // -- Inbound --

    fn dispatch(&mut self, event: FrameEvent) -> ControlFlow<&'static str> {
        match event {
            FrameEvent::Headers {
                stream_id,
                status,
                headers,
                end_of_stream,
            } => self.on_headers(stream_id, status, headers, end_of_stream),
            FrameEvent::Data {
                stream_id,
                data,
                end_of_stream,
            } => self.on_data(stream_id, data, end_of_stream),
            FrameEvent::Reset { stream_id, code } => self.on_reset(stream_id, code),
            FrameEvent::PushPromise {
                parent,
                promised,
                method,
                path,
                authority,
                headers,
            } => self.on_push_promise(parent, promised, method, path, authority, headers),
            FrameEvent::WindowUpdate { stream_id } => self.on_window_update(stream_id),
            FrameEvent::Settings(settings) => self.on_settings(settings),
            FrameEvent::GoAway {
                last_stream_id,
                code,
            } => self.on_go_away(last_stream_id, code),
            FrameEvent::ConnectionError(error) => {
                tracing::error!(
                    connection_id = %self.id,
                    route = %self.route,
                    error = %error,
                    "Connection-fatal codec error"
                );
                return ControlFlow::Break("codec error");
            }
        }
        ControlFlow::Continue(())
    }

    fn on_headers(
        &mut self,
        stream_id: StreamId,
        status: Option<StatusCode>,
        headers: HeaderMap,
        end_of_stream: bool,
    ) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            tracing::trace!(stream_id, "Headers for unknown stream ignored");
            return;
        };
        if let Err(error) = stream.on_headers(status, headers, end_of_stream) {
            self.protocol_reset(stream_id, error);
            return;
        }
        self.reap(stream_id);
    }

    fn on_data(&mut self, stream_id: StreamId, data: Bytes, end_of_stream: bool) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            tracing::trace!(stream_id, "Data for unknown stream ignored");
            return;
        };
        match stream.on_data(data, end_of_stream, Instant::now()) {
            Ok(0) => {}
            Ok(consumed) => self.consume(stream_id, consumed),
            Err(error) => {
                self.protocol_reset(stream_id, error);
                return;
            }
        }
        self.reap(stream_id);
    }

    fn on_reset(&mut self, stream_id: StreamId, code: u32) {
        let Some(mut stream) = self.registry.remove(stream_id) else {
            tracing::trace!(stream_id, code, "Reset for unknown stream ignored");
            return;
        };
        tracing::debug!(
            connection_id = %self.id,
            stream_id,
            request_id = %stream.request_id(),
            code,
            "Stream reset by peer"
        );
        stream.on_reset(code);
        self.release_window(&mut stream);
        self.on_stream_removed();
    }

    fn on_push_promise(
        &mut self,
        parent: StreamId,
        promised: StreamId,
        method: Option<Method>,
        path: Option<String>,
        authority: Option<String>,
        headers: HeaderMap,
    ) {
        let (Some(method), Some(path)) = (method, path) else {
            tracing::debug!(parent, promised, "Malformed push promise ignored");
            return;
        };
        if self.registry.contains(promised) {
            tracing::debug!(parent, promised, "Push promise for a live stream id ignored");
            return;
        }
        let Some(parent_stream) = self.registry.get_mut(parent) else {
            tracing::debug!(parent, promised, "Push promise for unknown parent ignored");
            return;
        };

        let head = RequestHead {
            method,
            scheme: parent_stream.head().scheme.clone(),
            path,
            authority,
            headers,
        };
        let request_id = RequestId::new();
        let writable = Arc::new(AtomicBool::new(false));
        let push = PushPromise {
            head: head.clone(),
            stream: StreamHandle::new(
                promised,
                request_id,
                self.handle.clone(),
                Arc::clone(&writable),
            ),
        };

        match parent_stream.offer_push(push) {
            Some(handler) => {
                tracing::debug!(connection_id = %self.id, parent, promised, "Push accepted");
                self.registry.insert(LogicalStream::pushed(
                    promised, request_id, head, handler, writable,
                ));
                metrics::record_push(&self.route, true);
            }
            None => {
                tracing::debug!(connection_id = %self.id, parent, promised, "Push rejected");
                if let Err(error) = self.codec.write_reset(promised, reset_code::CANCEL) {
                    tracing::debug!(promised, error = %error, "Failed to cancel pushed stream");
                }
                self.flush();
                metrics::record_push(&self.route, false);
            }
        }
    }

    fn on_window_update(&mut self, stream_id: StreamId) {
        let writable = self.codec.is_writable(stream_id);
        if let Some(stream) = self.registry.get_mut(stream_id) {
            stream.set_writable(writable);
        }
    }

    fn on_settings(&mut self, settings: Settings) {
        tracing::debug!(
            connection_id = %self.id,
            max_concurrent_streams = ?settings.max_concurrent_streams,
            initial_window_size = settings.initial_window_size,
            "Peer settings received"
        );
        self.remote_settings = settings;
        self.open_parked();
    }

    fn on_go_away(&mut self, last_stream_id: StreamId, code: u32) {
        tracing::info!(
            connection_id = %self.id,
            route = %self.route,
            last_stream_id,
            code,
            "Peer is going away"
        );
        self.draining.store(true, Ordering::Release);
        self.go_away = Some((last_stream_id, code));

        let error = MuxError::GoAway {
            last_stream_id,
            code,
        };
        for mut stream in self.registry.drain_local_above(last_stream_id) {
            stream.mark_closed();
            stream.fail(error.clone(), true);
            self.release_window(&mut stream);
            metrics::record_stream_closed(&self.route, "go_away");
        }
        for (_, ready) in self.parked.drain(..) {
            ready(Err(error.clone()));
        }
    }

    // -- Outbound --

    fn handle_command(&mut self, command: Command) -> ControlFlow<&'static str> {
        match command {
            Command::Open { request, ready } => self.open(request, ready),
            Command::SendHeaders {
                stream_id,
                body,
                end_of_stream,
            } => self.send_headers(stream_id, body, end_of_stream),
            Command::SendData {
                stream_id,
                data,
                end_of_stream,
            } => self.send_data(stream_id, data, end_of_stream),
            Command::Reset { stream_id, code } => self.reset(stream_id, code),
            Command::Pause { stream_id } => {
                if let Some(stream) = self.registry.get_mut(stream_id) {
                    stream.pause();
                }
            }
            Command::Resume { stream_id } => self.resume(stream_id),
            Command::SetTimeout { stream_id, timeout } => self.set_timeout(stream_id, timeout),
            Command::IdleTimerFired {
                stream_id,
                generation,
            } => self.on_idle_timer(stream_id, generation),
            Command::Close => return ControlFlow::Break("closed locally"),
        }
        ControlFlow::Continue(())
    }

    fn open(&mut self, request: Request, ready: ReadyHandler) {
        if let Some((last_stream_id, code)) = self.go_away {
            ready(Err(MuxError::GoAway {
                last_stream_id,
                code,
            }));
            return;
        }
        if !self.has_capacity() {
            tracing::debug!(
                connection_id = %self.id,
                request_id = %request.id(),
                parked = self.parked.len() + 1,
                "Peer stream limit reached, parking open"
            );
            self.parked.push_back((request, ready));
            return;
        }
        self.create_stream(request, ready);
    }

    fn has_capacity(&self) -> bool {
        match self.remote_settings.max_concurrent_streams {
            Some(max) => self.registry.active_local() < max as usize,
            None => true,
        }
    }

    fn create_stream(&mut self, mut request: Request, ready: ReadyHandler) {
        let stream_id = self.next_stream_id;
        if stream_id > MAX_STREAM_ID {
            tracing::warn!(connection_id = %self.id, "Stream ids exhausted");
            ready(Err(MuxError::StreamIdsExhausted));
            return;
        }
        self.next_stream_id += 2;

        request.set_default_timeout(self.default_idle_timeout);
        let (request_id, head, handler, timeout) = request.into_parts();
        let writable = Arc::new(AtomicBool::new(true));
        let handle = StreamHandle::new(
            stream_id,
            request_id,
            self.handle.clone(),
            Arc::clone(&writable),
        );

        tracing::debug!(
            connection_id = %self.id,
            stream_id,
            request_id = %request_id,
            method = %head.method,
            path = %head.path,
            "Stream created"
        );
        self.registry.insert(LogicalStream::new(
            stream_id, request_id, head, handler, writable,
        ));
        metrics::record_stream_opened(&self.route);

        if let Some(timeout) = timeout {
            self.set_timeout(stream_id, timeout);
        }
        ready(Ok(handle));
    }

    fn open_parked(&mut self) {
        while self.has_capacity() {
            let Some((request, ready)) = self.parked.pop_front() else {
                break;
            };
            self.create_stream(request, ready);
        }
    }

    fn send_headers(&mut self, stream_id: StreamId, body: Option<Bytes>, end_of_stream: bool) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            tracing::debug!(stream_id, "Headers for a finished stream dropped");
            return;
        };
        if !stream.state().can_send_headers() {
            tracing::warn!(stream_id, state = ?stream.state(), "Headers already sent");
            return;
        }

        let end_headers = end_of_stream && body.is_none();
        if let Err(error) = self.codec.write_headers(stream_id, stream.head(), end_headers) {
            self.write_failed(stream_id, error);
            return;
        }
        stream.mark_headers_sent(end_headers);

        match body {
            Some(body) => self.send_data(stream_id, body, end_of_stream),
            None => {
                self.flush();
                self.refresh_writability(stream_id);
            }
        }
    }

    fn send_data(&mut self, stream_id: StreamId, data: Bytes, end_of_stream: bool) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            tracing::debug!(stream_id, "Data for a finished stream dropped");
            return;
        };
        if !stream.state().can_send_data() {
            tracing::warn!(stream_id, state = ?stream.state(), "Stream does not accept data");
            return;
        }

        let written = self
            .codec
            .write_data(stream_id, data, end_of_stream)
            .and_then(|()| {
                if end_of_stream {
                    self.codec.write_pending_bytes()
                } else {
                    Ok(())
                }
            });
        if let Err(error) = written {
            self.write_failed(stream_id, error);
            return;
        }
        if end_of_stream {
            stream.mark_local_end();
        }

        self.flush();
        self.refresh_writability(stream_id);
        self.reap(stream_id);
    }

    fn reset(&mut self, stream_id: StreamId, code: u32) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            return;
        };
        if stream.state().is_closed() {
            return;
        }
        tracing::debug!(
            connection_id = %self.id,
            stream_id,
            request_id = %stream.request_id(),
            code,
            "Resetting stream"
        );
        stream.mark_closed();
        stream.fail(MuxError::StreamReset { code }, true);
        self.write_reset(stream_id, code);
        self.reap(stream_id);
    }

    fn resume(&mut self, stream_id: StreamId) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            return;
        };
        let consumed = stream.resume();
        if consumed > 0 {
            self.consume(stream_id, consumed);
        }
        self.reap(stream_id);
    }

    fn consume(&mut self, stream_id: StreamId, bytes: usize) {
        match self.codec.consume_bytes(stream_id, bytes) {
            Ok(true) => self.flush(),
            Ok(false) => {}
            Err(error) => {
                tracing::debug!(stream_id, bytes, error = %error, "Failed to return window");
            }
        }
    }

    fn refresh_writability(&mut self, stream_id: StreamId) {
        let writable = self.codec.is_writable(stream_id);
        if let Some(stream) = self.registry.get_mut(stream_id) {
            stream.set_writable(writable);
        }
    }

    fn write_reset(&mut self, stream_id: StreamId, code: u32) {
        if let Err(error) = self.codec.write_reset(stream_id, code) {
            tracing::debug!(stream_id, code, error = %error, "Failed to write reset");
        }
        self.flush();
    }

    fn flush(&mut self) {
        if let Err(error) = self.codec.flush() {
            tracing::warn!(connection_id = %self.id, error = %error, "Flush failed");
        }
    }

    fn write_failed(&mut self, stream_id: StreamId, error: CodecError) {
        tracing::warn!(
            connection_id = %self.id,
            stream_id,
            error = %error,
            "Write failed, resetting stream"
        );
        if let Some(stream) = self.registry.get_mut(stream_id) {
            stream.mark_closed();
            stream.fail(MuxError::Codec(error), true);
        }
        self.write_reset(stream_id, reset_code::INTERNAL_ERROR);
        self.reap(stream_id);
    }

    fn protocol_reset(&mut self, stream_id: StreamId, error: MuxError) {
        tracing::warn!(
            connection_id = %self.id,
            stream_id,
            error = %error,
            "Protocol violation on stream"
        );
        if let Some(stream) = self.registry.get_mut(stream_id) {
            stream.mark_closed();
            stream.fail(error, true);
        }
        self.write_reset(stream_id, reset_code::PROTOCOL_ERROR);
        self.reap(stream_id);
    }

    // -- Idle timeout --

    fn set_timeout(&mut self, stream_id: StreamId, timeout: Duration) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            return;
        };
        if stream.is_terminated() {
            return;
        }
        let generation = stream.arm_idle(timeout);
        stream.set_idle_timer(schedule_idle_timer(
            &self.handle,
            stream_id,
            generation,
            timeout,
        ));
    }

    fn on_idle_timer(&mut self, stream_id: StreamId, generation: TimerGeneration) {
        let Some(stream) = self.registry.get_mut(stream_id) else {
            return;
        };
        match stream.on_idle_fire(generation, Instant::now()) {
            TimerOutcome::Stale => {}
            TimerOutcome::Reschedule { generation, delay } => {
                stream.set_idle_timer(schedule_idle_timer(
                    &self.handle,
                    stream_id,
                    generation,
                    delay,
                ));
            }
            TimerOutcome::Expired(timeout) => {
                tracing::warn!(
                    connection_id = %self.id,
                    stream_id,
                    request_id = %stream.request_id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Request idle timeout"
                );
                stream.mark_closed();
                stream.fail(MuxError::Timeout(timeout), false);
                metrics::record_timeout(&self.route);
                self.write_reset(stream_id, reset_code::CANCEL);
                self.reap(stream_id);
            }
        }
    }

    // -- Lifecycle --

    /// Remove the stream if it is done and let parked opens through.
    fn reap(&mut self, stream_id: StreamId) {
        if let Some(mut stream) = self.registry.remove_if_finished(stream_id) {
            tracing::trace!(connection_id = %self.id, stream_id, "Stream removed");
            self.release_window(&mut stream);
            self.on_stream_removed();
        }
    }

    /// Return window for paused bytes the handler will never see.
    fn release_window(&mut self, stream: &mut LogicalStream) {
        let held = stream.take_unconsumed();
        if held > 0 {
            self.consume(stream.id(), held);
        }
    }

    fn on_stream_removed(&mut self) {
        metrics::record_stream_closed(&self.route, "finished");
        self.open_parked();
    }

    fn teardown(mut self, reason: &'static str) {
        self.commands.close();
        self.draining.store(true, Ordering::Release);

        let streams = self.registry.drain();
        let live = streams.iter().filter(|s| !s.is_terminated()).count();
        tracing::info!(
            connection_id = %self.id,
            route = %self.route,
            reason,
            live_streams = live,
            "Connection closed"
        );

        for mut stream in streams {
            stream.fail(MuxError::ConnectionClosed, true);
            metrics::record_stream_closed(&self.route, "connection_closed");
        }
        for (_, ready) in self.parked.drain(..) {
            ready(Err(MuxError::ConnectionClosed));
        }
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Open { ready, .. } = command {
                ready(Err(MuxError::ConnectionClosed));
            }
        }

        metrics::record_connection_closed(&self.route);
    }
}

/// Post `IdleTimerFired` back to the connection after `delay`.
fn schedule_idle_timer(
    handle: &ConnectionHandle,
    stream_id: StreamId,
    generation: TimerGeneration,
    delay: Duration,
) -> JoinHandle<()> {
    let handle = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = handle.send(Command::IdleTimerFired {
            stream_id,
            generation,
        });
    })
}
