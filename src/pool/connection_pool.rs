//! Per-route connection pool.
//!
//! # Responsibilities
//! - Hand requests to the route's connection, or queue them until it exists
//! - Build at most one connection at a time
//! - Drain waiters in arrival order once the connection is ready
//! - Fail every waiter when establishment fails, then allow a retry

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::Settings;
use crate::config::MuxConfig;
use crate::connection::{Connection, ConnectionHandle};
use crate::context::ContextId;
use crate::error::MuxError;
use crate::observability::metrics;
use crate::pool::connector::{Connector, RouteKey};
use crate::pool::waiter::Waiter;
use crate::stream::{ReadyHandler, Request, RequestId};

/// Pool behaviour derived from [`MuxConfig`].
#[derive(Debug, Clone)]
struct PoolOptions {
    connect_timeout: Duration,
    max_waiters: Option<usize>,
    default_idle_timeout: Option<Duration>,
    settings: Settings,
}

impl From<&MuxConfig> for PoolOptions {
    fn from(config: &MuxConfig) -> Self {
        Self {
            connect_timeout: config.pool.connect_timeout(),
            max_waiters: config.pool.max_waiters,
            default_idle_timeout: config.stream.default_idle_timeout(),
            settings: config.settings.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    connection: Option<ConnectionHandle>,
    connecting: bool,
    waiters: VecDeque<Waiter>,
}

impl PoolState {
    /// The current connection if new streams may still go there.
    fn usable_connection(&mut self) -> Option<ConnectionHandle> {
        match &self.connection {
            Some(conn) if conn.is_usable() => Some(conn.clone()),
            Some(_) => {
                self.connection = None;
                None
            }
            None => None,
        }
    }
}

/// Connection pool for one route.
///
/// At most one physical connection is live at a time; every request to the
/// route is multiplexed over it.
pub struct ConnectionPool<C> {
    route: RouteKey,
    label: String,
    connector: Arc<C>,
    options: PoolOptions,
    state: Mutex<PoolState>,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(route: RouteKey, connector: Arc<C>, config: &MuxConfig) -> Self {
        Self {
            label: route.to_string(),
            route,
            connector,
            options: PoolOptions::from(config),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    /// Bind `request` to a stream on this route's connection.
    ///
    /// Never blocks. `ready` runs exactly once: on the connection's context
    /// with the new stream, or with the reason no stream could be created.
    /// `caller` is the context the caller runs on; `None` means "whatever
    /// context the connection has".
    pub fn acquire_stream(
        self: &Arc<Self>,
        request: Request,
        ready: ReadyHandler,
        caller: Option<ContextId>,
    ) {
        let mut state = self.state.lock().expect("pool lock poisoned");

        let (request, ready) = match state.usable_connection() {
            Some(conn) => {
                self.check_context(caller, &conn, request.id());
                match conn.open_stream(request, ready) {
                    Ok(()) => return,
                    Err(returned) => {
                        tracing::debug!(
                            route = %self.label,
                            connection_id = %conn.id(),
                            "Connection went away, queueing request"
                        );
                        state.connection = None;
                        returned
                    }
                }
            }
            None => (request, ready),
        };

        if let Some(max) = self.options.max_waiters {
            if state.waiters.len() >= max {
                drop(state);
                tracing::warn!(
                    route = %self.label,
                    request_id = %request.id(),
                    max_waiters = max,
                    "Waiter queue full"
                );
                ready(Err(MuxError::WaiterQueueFull(max)));
                return;
            }
        }

        tracing::debug!(
            route = %self.label,
            request_id = %request.id(),
            waiters = state.waiters.len() + 1,
            "Queueing request until the connection is ready"
        );
        state.waiters.push_back(Waiter::new(request, ready, caller));
        metrics::record_waiters(&self.label, state.waiters.len());

        if !state.connecting {
            state.connecting = true;
            drop(state);
            let pool = Arc::clone(self);
            tokio::spawn(async move { pool.establish().await });
        }
    }

    async fn establish(self: Arc<Self>) {
        tracing::info!(route = %self.label, "Establishing connection");

        let connect = self.connector.connect(&self.route, &self.options.settings);
        let channel = match tokio::time::timeout(self.options.connect_timeout, connect).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(error)) => {
                self.fail_waiters(error.to_string());
                return;
            }
            Err(_) => {
                self.fail_waiters(format!(
                    "connect timed out after {}ms",
                    self.options.connect_timeout.as_millis()
                ));
                return;
            }
        };

        let conn = Connection::spawn(
            channel,
            self.label.clone(),
            self.options.default_idle_timeout,
        );

        let mut closed = Vec::new();
        {
            let mut state = self.state.lock().expect("pool lock poisoned");
            state.connecting = false;
            state.connection = Some(conn.clone());

            let waiters = std::mem::take(&mut state.waiters);
            tracing::info!(
                route = %self.label,
                connection_id = %conn.id(),
                waiters = waiters.len(),
                "Connection ready"
            );
            for waiter in waiters {
                self.check_context(waiter.caller, &conn, waiter.request.id());
                if let Err((_, ready)) = conn.open_stream(waiter.request, waiter.ready) {
                    closed.push(ready);
                }
            }
            metrics::record_waiters(&self.label, 0);
        }

        for ready in closed {
            ready(Err(MuxError::ConnectionClosed));
        }
    }

    fn fail_waiters(&self, reason: String) {
        let waiters = {
            let mut state = self.state.lock().expect("pool lock poisoned");
            state.connecting = false;
            std::mem::take(&mut state.waiters)
        };

        tracing::warn!(
            route = %self.label,
            reason = %reason,
            waiters = waiters.len(),
            "Connection establishment failed"
        );
        metrics::record_connect_failure(&self.label);
        metrics::record_waiters(&self.label, 0);

        let error = MuxError::ConnectionEstablishment(reason);
        for waiter in waiters {
            (waiter.ready)(Err(error.clone()));
        }
    }

    fn check_context(
        &self,
        caller: Option<ContextId>,
        conn: &ConnectionHandle,
        request_id: RequestId,
    ) {
        if let Some(caller) = caller {
            if caller != conn.context() {
                tracing::warn!(
                    route = %self.label,
                    request_id = %request_id,
                    caller_context = %caller,
                    connection_context = %conn.context(),
                    "Request handed to a connection on a different context; \
                     callbacks will run on the connection's context"
                );
            }
        }
    }

    /// Shut down the route's connection. Its live streams get
    /// `ConnectionClosed`; later requests build a new connection.
    pub fn close(&self) {
        let conn = self
            .state
            .lock()
            .expect("pool lock poisoned")
            .connection
            .take();
        if let Some(conn) = conn {
            tracing::info!(route = %self.label, connection_id = %conn.id(), "Closing connection");
            conn.close();
        }
    }

    /// Number of requests waiting for a connection.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().expect("pool lock poisoned").waiters.len()
    }

    /// Whether a usable connection is installed.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .expect("pool lock poisoned")
            .connection
            .as_ref()
            .is_some_and(ConnectionHandle::is_usable)
    }

    /// Whether a connection is being built right now.
    pub fn is_connecting(&self) -> bool {
        self.state.lock().expect("pool lock poisoned").connecting
    }
}

impl<C> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("route", &self.route)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
