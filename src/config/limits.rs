//! Resource cap configuration.

use serde::Deserialize;

use super::defaults::{
    default_history_depth, default_max_channels, default_max_frame_bytes,
    default_max_members_per_channel, default_max_message_length, default_outbound_queue_depth,
};

/// Resource caps.
///
/// Exceeding any of these raises a `Capacity` error rather than degrading
/// service for everyone else.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum channels in the registry (default: 200).
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
    /// Maximum members subscribed to one channel room (default: 500).
    #[serde(default = "default_max_members_per_channel")]
    pub max_members_per_channel: usize,
    /// Maximum chat message length after trimming (default: 2000).
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Per-channel chat ring depth (default: 200).
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    /// Per-connection outbound queue depth. A full queue marks the
    /// connection slow and drops it (default: 256).
    #[serde(default = "default_outbound_queue_depth")]
    pub outbound_queue_depth: usize,
    /// Maximum inbound frame size in bytes (default: 64 KiB).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_channels: default_max_channels(),
            max_members_per_channel: default_max_members_per_channel(),
            max_message_length: default_max_message_length(),
            history_depth: default_history_depth(),
            outbound_queue_depth: default_outbound_queue_depth(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}
