//! Presence registry - connection → user mapping and account-wide indexes.
//!
//! Owns the materialized [`User`] for every live connection, the
//! account↔connection index, ban records, and voice timeouts. Lock order:
//! a user lock is always taken after any channel lock, never before.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use hearth_proto::types::UserView;
use parking_lot::RwLock;
use tracing::debug;

use crate::state::account::Account;
use crate::state::user::{Ban, Capability, User};

/// Presence management state.
pub struct PresenceManager {
    users: DashMap<String, Arc<RwLock<User>>>,
    by_account: DashMap<String, HashSet<String>>,
    bans: DashMap<String, Ban>,
}

impl PresenceManager {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            by_account: DashMap::new(),
            bans: DashMap::new(),
        }
    }

    /// Register a fresh connection.
    pub fn create(&self, conn_id: &str, remote_ip: IpAddr, now: i64) -> Arc<RwLock<User>> {
        let user = Arc::new(RwLock::new(User::new(conn_id.to_string(), remote_ip, now)));
        self.users.insert(conn_id.to_string(), user.clone());
        user
    }

    /// Remove a connection. Returns the final user state for teardown.
    pub fn remove(&self, conn_id: &str) -> Option<User> {
        let (_, user) = self.users.remove(conn_id)?;
        let snapshot = user.read().clone();
        if let Some(account_id) = &snapshot.account_id {
            self.unindex(account_id, conn_id);
        }
        Some(snapshot)
    }

    pub fn by_conn(&self, conn_id: &str) -> Option<Arc<RwLock<User>>> {
        self.users.get(conn_id).map(|entry| entry.value().clone())
    }

    /// All connections of one account.
    pub fn by_account(&self, account_id: &str) -> Vec<String> {
        self.by_account
            .get(account_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, account_id: &str) -> usize {
        self.by_account
            .get(account_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Bind a connection to an account after authentication.
    pub fn attach_account(&self, conn_id: &str, account: &Account) {
        if let Some(user) = self.by_conn(conn_id) {
            let mut user = user.write();
            user.account_id = Some(account.id.clone());
            user.display_name = account.display_name.clone();
            user.roles = account.roles.clone();
        }
        self.by_account
            .entry(account.id.clone())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Unbind on logout. Presence fields (rooms) are cleared by the caller.
    pub fn detach_account(&self, conn_id: &str) {
        let account_id = match self.by_conn(conn_id) {
            Some(user) => {
                let mut user = user.write();
                let id = user.account_id.take();
                user.roles.clear();
                user.display_name = "anonymous".to_string();
                id
            }
            None => None,
        };
        if let Some(account_id) = account_id {
            self.unindex(&account_id, conn_id);
        }
    }

    fn unindex(&self, account_id: &str, conn_id: &str) {
        if let Some(mut set) = self.by_account.get_mut(account_id) {
            set.remove(conn_id);
            if set.is_empty() {
                drop(set);
                self.by_account.remove(account_id);
            }
        }
    }

    /// Re-materialize roles/display across every connection of one account
    /// (role change, profile update, disable).
    pub fn sync_account(&self, account: &Account) {
        for conn_id in self.by_account(&account.id) {
            if let Some(user) = self.by_conn(&conn_id) {
                let mut user = user.write();
                user.display_name = account.display_name.clone();
                user.roles = account.roles.clone();
            }
        }
    }

    pub fn set_current_channel(&self, conn_id: &str, channel_id: Option<String>) {
        if let Some(user) = self.by_conn(conn_id) {
            user.write().current_channel = channel_id;
        }
    }

    pub fn set_voice_channel(&self, conn_id: &str, channel_id: Option<String>) {
        if let Some(user) = self.by_conn(conn_id) {
            user.write().voice_channel = channel_id;
        }
    }

    pub fn set_screenshare_host(&self, conn_id: &str, channel_id: Option<String>) {
        if let Some(user) = self.by_conn(conn_id) {
            user.write().screenshare_host_of = channel_id;
        }
    }

    pub fn set_screenshare_viewer(&self, conn_id: &str, channel_id: Option<String>) {
        if let Some(user) = self.by_conn(conn_id) {
            user.write().screenshare_viewer_of = channel_id;
        }
    }

    /// Clear every presence field that still references a channel (used
    /// when the channel itself goes away).
    pub fn clear_channel_refs(&self, conn_id: &str, channel_id: &str) {
        if let Some(user) = self.by_conn(conn_id) {
            let mut user = user.write();
            if user.current_channel.as_deref() == Some(channel_id) {
                user.current_channel = None;
            }
            if user.voice_channel.as_deref() == Some(channel_id) {
                user.voice_channel = None;
            }
            if user.screenshare_host_of.as_deref() == Some(channel_id) {
                user.screenshare_host_of = None;
            }
            if user.screenshare_viewer_of.as_deref() == Some(channel_id) {
                user.screenshare_viewer_of = None;
            }
        }
    }

    pub fn set_voice_timeout(&self, conn_id: &str, deadline: i64) {
        if let Some(user) = self.by_conn(conn_id) {
            user.write().voice_timeout_until = Some(deadline);
        }
    }

    /// Remaining voice timeout in milliseconds, if active.
    pub fn voice_timeout_remaining(&self, conn_id: &str, now: i64) -> Option<i64> {
        self.by_conn(conn_id)?.read().voice_timeout_remaining(now)
    }

    /// Capability check for a connection. Unauthenticated connections hold
    /// no capabilities.
    pub fn has_permission(&self, conn_id: &str, cap: Capability) -> bool {
        self.by_conn(conn_id)
            .is_some_and(|user| user.read().has_capability(cap))
    }

    // === Bans ===

    pub fn ban(
        &self,
        account_id: &str,
        reason: Option<String>,
        banned_by: &str,
        now: i64,
        duration_ms: Option<i64>,
    ) {
        let ban = Ban {
            account_id: account_id.to_string(),
            reason,
            banned_by: banned_by.to_string(),
            banned_at: now,
            expires_at: duration_ms.map(|d| now + d),
        };
        self.bans.insert(account_id.to_string(), ban);
    }

    pub fn unban(&self, account_id: &str) -> bool {
        self.bans.remove(account_id).is_some()
    }

    /// The active ban for an account, if any. Expired records are pruned on
    /// read as well as by the periodic sweep.
    pub fn active_ban(&self, account_id: &str, now: i64) -> Option<Ban> {
        match self.bans.get(account_id) {
            Some(ban) if !ban.is_expired(now) => return Some(ban.clone()),
            Some(_) => {}
            None => return None,
        }
        self.bans.remove(account_id);
        None
    }

    pub fn is_banned(&self, account_id: &str, now: i64) -> bool {
        self.active_ban(account_id, now).is_some()
    }

    /// Drop expired bans. Returns how many were removed.
    pub fn sweep_expired_bans(&self, now: i64) -> usize {
        let before = self.bans.len();
        self.bans.retain(|_, ban| !ban.is_expired(now));
        let removed = before - self.bans.len();
        if removed > 0 {
            debug!(removed, "expired bans swept");
        }
        removed
    }

    /// Presence snapshot for broadcast: all authenticated connections.
    pub fn views(&self) -> Vec<UserView> {
        self.users
            .iter()
            .filter_map(|entry| {
                let user = entry.value().read();
                user.is_authenticated().then(|| user.to_view())
            })
            .collect()
    }

    pub fn connection_total(&self) -> usize {
        self.users.len()
    }
}

impl Default for PresenceManager {
    fn default() -> Self {
        Self::new()
    }
}
