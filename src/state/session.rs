//! Session entity - bearer proof of account identity.
//!
//! Tokens outlive connections: a client may resume on a fresh connection
//! with `auth:session` until the token expires or is revoked.

use serde::{Deserialize, Serialize};

/// A bearer session. Mirrored into the sessions snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub account_id: String,
    pub created_at: i64,
    pub last_seen_at: i64,
    /// Strictly monotonic under touch.
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Refresh on use: bump `last_seen_at` and extend `expires_at`, never
    /// shrinking it.
    pub fn touch(&mut self, now: i64, ttl_ms: i64) {
        self.last_seen_at = now;
        self.expires_at = self.expires_at.max(now + ttl_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_is_monotonic() {
        let mut session = Session {
            token: "t".into(),
            account_id: "a".into(),
            created_at: 0,
            last_seen_at: 0,
            expires_at: 10_000,
        };
        session.touch(1_000, 5_000);
        assert_eq!(session.expires_at, 10_000);
        session.touch(9_000, 5_000);
        assert_eq!(session.expires_at, 14_000);
        assert_eq!(session.last_seen_at, 9_000);
    }

    #[test]
    fn expiry_boundary() {
        let session = Session {
            token: "t".into(),
            account_id: "a".into(),
            created_at: 0,
            last_seen_at: 0,
            expires_at: 100,
        };
        assert!(!session.is_expired(99));
        assert!(session.is_expired(100));
    }
}
