//! Cross-context handle to a connection task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::{Command, ConnectionId};
use crate::context::ContextId;
use crate::error::{MuxError, MuxResult};
use crate::stream::{ReadyHandler, Request};

/// Sender side of a connection's command queue.
///
/// Sending never blocks: it schedules the command onto the connection's
/// context.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    context: ContextId,
    commands: mpsc::UnboundedSender<Command>,
    draining: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        context: ContextId,
        commands: mpsc::UnboundedSender<Command>,
        draining: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            context,
            commands,
            draining,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The execution context that owns the connection.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Whether the connection task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Whether the peer asked to stop opening streams on this connection.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Whether new streams may be dispatched here.
    pub fn is_usable(&self) -> bool {
        !self.is_closed() && !self.is_draining()
    }

    pub(crate) fn send(&self, command: Command) -> MuxResult<()> {
        self.commands
            .send(command)
            .map_err(|_| MuxError::ConnectionClosed)
    }

    /// Schedule creation of a stream for `request`; `ready` runs on the
    /// connection's context.
    ///
    /// Hands the request back if the connection is already gone.
    pub fn open_stream(
        &self,
        request: Request,
        ready: ReadyHandler,
    ) -> Result<(), (Request, ReadyHandler)> {
        self.commands
            .send(Command::Open { request, ready })
            .map_err(|mpsc::error::SendError(command)| match command {
                Command::Open { request, ready } => (request, ready),
                _ => unreachable!("sent an Open command"),
            })
    }

    /// Ask the connection to shut down. Live streams get `ConnectionClosed`.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}
