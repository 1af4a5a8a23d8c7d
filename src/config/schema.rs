//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! multiplexing client. All types derive Serde traits for deserialization
//! from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Settings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MuxConfig {
    /// Per-route connection pool settings.
    pub pool: PoolConfig,

    /// Defaults applied to every stream.
    pub stream: StreamConfig,

    /// Local protocol settings announced to the peer.
    pub settings: Settings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum queued waiters per route; `None` means unbounded.
    pub max_waiters: Option<usize>,

    /// Time allowed for establishing a physical connection (milliseconds).
    pub connect_timeout_ms: u64,
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_waiters: None,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Stream defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StreamConfig {
    /// Idle timeout for requests that do not set their own (milliseconds).
    pub default_idle_timeout_ms: Option<u64>,
}

impl StreamConfig {
    pub fn default_idle_timeout(&self) -> Option<Duration> {
        self.default_idle_timeout_ms.map(Duration::from_millis)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
