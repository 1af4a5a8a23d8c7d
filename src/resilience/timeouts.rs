//! Request idle-timeout enforcement.
//!
//! # States
//! ```text
//! DISARMED → ARMED → (RESCHEDULED)* → FIRED | DISARMED
//! ```
//!
//! # Design Decisions
//! - Sliding idle timeout, not a fixed deadline: data arriving while armed
//!   pushes expiry out to `last_data + timeout`
//! - The monitor holds no timer itself; the connection task schedules one
//!   sleep per generation and feeds the fire back in
//! - Every re-arm bumps the generation, so a late fire from a replaced timer
//!   is ignored
//! - Cancelling is idempotent

use std::time::Duration;

use tokio::time::Instant;

/// Token identifying one scheduled timer.
pub type TimerGeneration = u64;

/// Result of feeding a timer fire into the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The fire belongs to a cancelled or replaced timer.
    Stale,
    /// The request has been idle for the full timeout.
    Expired(Duration),
    /// Data arrived since arming; schedule `generation` to fire after `delay`.
    Reschedule {
        generation: TimerGeneration,
        delay: Duration,
    },
}

/// Per-request idle-timeout state.
#[derive(Debug, Default)]
pub struct IdleTimeout {
    timeout: Option<Duration>,
    armed: bool,
    generation: TimerGeneration,
    last_data: Option<Instant>,
}

impl IdleTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `timeout`, replacing any armed timer.
    pub fn arm(&mut self, timeout: Duration) -> TimerGeneration {
        self.timeout = Some(timeout);
        self.armed = true;
        self.last_data = None;
        self.generation += 1;
        self.generation
    }

    /// Cancel the armed timer. No-op when disarmed.
    pub fn disarm(&mut self) {
        if self.armed {
            self.armed = false;
            self.last_data = None;
            self.generation += 1;
        }
    }

    /// Note inbound data. Only recorded while armed.
    pub fn record_data(&mut self, now: Instant) {
        if self.armed {
            self.last_data = Some(now);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Handle a timer fire for `generation` at `now`.
    pub fn fire(&mut self, generation: TimerGeneration, now: Instant) -> TimerOutcome {
        if !self.armed || generation != self.generation {
            return TimerOutcome::Stale;
        }
        let Some(timeout) = self.timeout else {
            return TimerOutcome::Stale;
        };

        match self.last_data.take() {
            None => {
                self.armed = false;
                TimerOutcome::Expired(timeout)
            }
            Some(at) => {
                let idle = now.saturating_duration_since(at);
                if idle >= timeout {
                    self.armed = false;
                    TimerOutcome::Expired(timeout)
                } else {
                    self.generation += 1;
                    TimerOutcome::Reschedule {
                        generation: self.generation,
                        delay: timeout - idle,
                    }
                }
            }
        }
    }
}
