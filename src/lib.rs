//! Client-side stream multiplexing core.
//!
//! Many logical request/response exchanges share one physical connection per
//! route. The pool builds connections and queues callers, each connection task
//! owns its streams and the codec, and callers drive their streams through
//! [`StreamHandle`]s.

pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod stream;

pub use config::schema::MuxConfig;
pub use context::ContextId;
pub use error::{MuxError, MuxResult};
pub use pool::{ConnectionPool, Connector, PoolManager, RouteKey};
pub use stream::{Request, RequestHead, Response, StreamHandle, StreamHandler};
