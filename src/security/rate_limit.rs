//! Rate limiting for abuse protection.
//!
//! Governor token buckets keyed per IP (and per credential identity for the
//! RTMP hook). Each limiter family has its own storage so a registration
//! flood cannot exhaust login budget.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use tracing::debug;

use crate::config::RateLimitConfig;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Thread-safe rate limit manager.
#[derive(Debug)]
pub struct RateLimitManager {
    register_limiters: DashMap<IpAddr, DirectRateLimiter>,
    login_limiters: DashMap<IpAddr, DirectRateLimiter>,
    /// Keyed by `(ip, identity)` rendered as a string; identity is the
    /// username or stream-key prefix the publisher presented.
    stream_auth_limiters: DashMap<String, DirectRateLimiter>,
    config: Arc<RateLimitConfig>,
}

impl RateLimitManager {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            register_limiters: DashMap::new(),
            login_limiters: DashMap::new(),
            stream_auth_limiters: DashMap::new(),
            config: Arc::new(config),
        }
    }

    fn per_minute(rate: u32) -> DirectRateLimiter {
        let rate = NonZeroU32::new(rate).unwrap_or(nonzero!(1u32));
        GovRateLimiter::direct(Quota::per_minute(rate))
    }

    /// Check whether an IP may register an account.
    pub fn check_register(&self, ip: IpAddr) -> bool {
        let limiter = self
            .register_limiters
            .entry(ip)
            .or_insert_with(|| Self::per_minute(self.config.register_per_minute));
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "registration rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Check whether an IP may attempt a login.
    pub fn check_login(&self, ip: IpAddr) -> bool {
        let limiter = self
            .login_limiters
            .entry(ip)
            .or_insert_with(|| Self::per_minute(self.config.login_per_minute));
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "login rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Check whether an `(ip, identity)` pair may hit the RTMP auth hook.
    pub fn check_stream_auth(&self, ip: IpAddr, identity: &str) -> bool {
        let key = format!("{ip}|{identity}");
        let limiter = self
            .stream_auth_limiters
            .entry(key)
            .or_insert_with(|| Self::per_minute(self.config.stream_auth_per_minute));
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, identity, "stream auth rate limit exceeded");
            crate::metrics::RATE_LIMITED.inc();
        }
        allowed
    }

    /// Reap limiter storage. Called from the maintenance sweep; the simple
    /// clear-on-threshold strategy bounds memory without tracking ages.
    pub fn cleanup(&self) {
        const MAX_ENTRIES: usize = 10_000;

        if self.register_limiters.len() > MAX_ENTRIES {
            self.register_limiters.clear();
            debug!("cleared register rate limiters (exceeded {MAX_ENTRIES} entries)");
        }
        if self.login_limiters.len() > MAX_ENTRIES {
            self.login_limiters.clear();
            debug!("cleared login rate limiters (exceeded {MAX_ENTRIES} entries)");
        }
        if self.stream_auth_limiters.len() > MAX_ENTRIES {
            self.stream_auth_limiters.clear();
            debug!("cleared stream auth rate limiters (exceeded {MAX_ENTRIES} entries)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(register: u32) -> RateLimitManager {
        RateLimitManager::new(RateLimitConfig {
            register_per_minute: register,
            login_per_minute: 10,
            stream_auth_per_minute: 30,
        })
    }

    #[test]
    fn register_budget_is_enforced() {
        let limits = manager(2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limits.check_register(ip));
        assert!(limits.check_register(ip));
        assert!(!limits.check_register(ip));
        // A different IP has its own budget.
        assert!(limits.check_register("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn stream_auth_keys_by_identity() {
        let limits = manager(5);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..30 {
            assert!(limits.check_stream_auth(ip, "cam1"));
        }
        assert!(!limits.check_stream_auth(ip, "cam1"));
        assert!(limits.check_stream_auth(ip, "cam2"));
    }
}
