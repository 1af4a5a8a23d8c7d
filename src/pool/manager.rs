//! Pool management across routes.
//!
//! # Responsibilities
//! - Create one `ConnectionPool` per route on first use
//! - Route requests to the right pool

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::MuxConfig;
use crate::context::ContextId;
use crate::pool::connection_pool::ConnectionPool;
use crate::pool::connector::{Connector, RouteKey};
use crate::stream::{ReadyHandler, Request};

/// Owns the per-route pools.
pub struct PoolManager<C> {
    connector: Arc<C>,
    config: MuxConfig,
    pools: DashMap<RouteKey, Arc<ConnectionPool<C>>>,
}

impl<C: Connector> PoolManager<C> {
    /// Create a manager from configuration.
    pub fn new(connector: C, config: MuxConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            pools: DashMap::new(),
        }
    }

    /// The pool for `route`, created on first use.
    pub fn pool(&self, route: &RouteKey) -> Arc<ConnectionPool<C>> {
        if let Some(pool) = self.pools.get(route) {
            return Arc::clone(pool.value());
        }
        let pool = self.pools.entry(route.clone()).or_insert_with(|| {
            tracing::debug!(route = %route, "Creating connection pool");
            Arc::new(ConnectionPool::new(
                route.clone(),
                Arc::clone(&self.connector),
                &self.config,
            ))
        });
        Arc::clone(pool.value())
    }

    /// Bind `request` to a stream on `route`. See
    /// [`ConnectionPool::acquire_stream`].
    pub fn acquire_stream(
        &self,
        route: &RouteKey,
        request: Request,
        ready: ReadyHandler,
        caller: Option<ContextId>,
    ) {
        self.pool(route).acquire_stream(request, ready, caller);
    }

    /// Close every route's connection.
    pub fn close_all(&self) {
        for pool in self.pools.iter() {
            pool.value().close();
        }
    }

    /// Number of routes with a pool.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<C> std::fmt::Debug for PoolManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("routes", &self.pools.len())
            .finish_non_exhaustive()
    }
}
