//! Connection settings exchanged with the peer.

use serde::{Deserialize, Serialize};

/// Protocol settings.
///
/// The local copy is handed to the connector when a connection is built; the
/// peer's copy arrives as [`FrameEvent::Settings`](super::FrameEvent::Settings).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// HPACK dynamic table size.
    pub header_table_size: u32,

    /// Whether the peer may push streams.
    pub enable_push: bool,

    /// Maximum concurrently open streams; `None` means unlimited.
    pub max_concurrent_streams: Option<u32>,

    /// Initial stream-level flow-control window.
    pub initial_window_size: u32,

    /// Largest frame payload accepted.
    pub max_frame_size: u32,

    /// Advisory limit on decoded header list size.
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: 65_535,
            max_frame_size: 16_384,
            max_header_list_size: None,
        }
    }
}
