//! Security management state.
//!
//! Thin aggregation of the rate limiters so the hub exposes one
//! `security_manager` the way it exposes the other registries.

use crate::config::RateLimitConfig;
use crate::security::RateLimitManager;

/// Security management state.
pub struct SecurityManager {
    /// Per-IP (and per-identity for RTMP) rate limiting.
    pub rate_limiter: RateLimitManager,
}

impl SecurityManager {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            rate_limiter: RateLimitManager::new(config),
        }
    }
}
