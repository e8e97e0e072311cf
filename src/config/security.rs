//! Rate-limit configuration.

use serde::Deserialize;

use super::defaults::{
    default_login_per_minute, default_register_per_minute, default_stream_auth_per_minute,
};

/// Per-IP rate limits, expressed as events per minute.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Account registrations per IP (default: 5/min).
    #[serde(default = "default_register_per_minute")]
    pub register_per_minute: u32,
    /// Login attempts per IP (default: 10/min).
    #[serde(default = "default_login_per_minute")]
    pub login_per_minute: u32,
    /// RTMP auth attempts per (IP, identity) (default: 30/min).
    #[serde(default = "default_stream_auth_per_minute")]
    pub stream_auth_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            register_per_minute: default_register_per_minute(),
            login_per_minute: default_login_per_minute(),
            stream_auth_per_minute: default_stream_auth_per_minute(),
        }
    }
}
