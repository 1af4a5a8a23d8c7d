//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request armed with an idle timeout:
//!     → timeouts.rs (sliding idle-timeout state machine)
//!     → connection task schedules the timer and feeds fires back
//!     → on expiry: Timeout error to the request, stream reset
//! ```
//!
//! # Design Decisions
//! - Timeouts belong to the request, not to the transport
//! - Connect timeouts are enforced by the pool around the connector
//! - Reconnection backoff is out of scope

pub mod timeouts;

pub use timeouts::{IdleTimeout, TimerGeneration, TimerOutcome};
