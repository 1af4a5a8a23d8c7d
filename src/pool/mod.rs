//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! acquire_stream(route, request, ready)
//!     → manager.rs (route → ConnectionPool, created lazily)
//!     → connection_pool.rs
//!         connection usable → Command::Open to the connection task
//!         otherwise        → waiter.rs queue, establish once via connector.rs
//!     → on ready: waiters drained FIFO under the pool lock
//!     → on failure: every waiter gets ConnectionEstablishment
//! ```
//!
//! # Design Decisions
//! - The pool lock is the only lock shared between callers
//! - One physical connection per route; no backoff between attempts
//! - Ready handlers run on the connection's context, never under the lock

pub mod connection_pool;
pub mod connector;
pub mod manager;
mod waiter;

pub use connection_pool::ConnectionPool;
pub use connector::{Connector, RouteKey};
pub use manager::PoolManager;
