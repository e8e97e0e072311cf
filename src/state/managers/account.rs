//! Account store - durable identities and bearer sessions.
//!
//! The first account ever registered is promoted to admin; thereafter the
//! store protects the "last active admin" invariant on every role, status,
//! and deletion-adjacent mutation. Mutations nudge the snapshot writer via
//! the dirty channel; persistence failures never propagate back here.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use dashmap::DashMap;
use hearth_proto::Role;
use hearth_proto::command::{AccountUpdateParams, ProfileParams};
use hearth_proto::types::AccountView;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::AccountError;
use crate::security::password::{KdfParams, hash_password, verify_password};
use crate::state::account::{Account, AccountStatus};
use crate::state::session::Session;
use crate::util::{id, validate};

/// Account store state.
pub struct AccountManager {
    accounts: DashMap<String, Account>,
    by_username: DashMap<String, String>,
    sessions: DashMap<String, Session>,
    sessions_by_account: DashMap<String, HashSet<String>>,
    /// Serializes registration and role/status mutations so the first-admin
    /// grant and the last-admin check cannot race.
    mutation_lock: Mutex<()>,
    auth: AuthConfig,
    dirty_tx: mpsc::UnboundedSender<()>,
}

impl AccountManager {
    pub fn new(auth: AuthConfig, dirty_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            accounts: DashMap::new(),
            by_username: DashMap::new(),
            sessions: DashMap::new(),
            sessions_by_account: DashMap::new(),
            mutation_lock: Mutex::new(()),
            auth,
            dirty_tx,
        }
    }

    fn mark_dirty(&self) {
        let _ = self.dirty_tx.send(());
    }

    fn ttl_ms(&self) -> i64 {
        (self.auth.session_ttl_secs as i64) * 1000
    }

    // === Registration & authentication ===

    /// Register a new account. The first account ever is granted admin.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        profile: Option<ProfileParams>,
    ) -> Result<Account, AccountError> {
        validate::username(username).map_err(AccountError::Validation)?;
        validate::password(password, self.auth.password_min).map_err(AccountError::Validation)?;
        if self.by_username.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        let profile = profile.unwrap_or_default();
        let display_name = match profile.display_name {
            Some(name) => {
                validate::display_name(&name).map_err(AccountError::Validation)?;
                name
            }
            None => username
                .split('@')
                .next()
                .unwrap_or(username)
                .chars()
                .take(validate::DISPLAY_NAME_MAX)
                .collect(),
        };

        // KDF runs outside the mutation lock; uniqueness is re-checked under
        // it afterwards.
        let verifier = hash_password(password.to_string(), KdfParams::from(&self.auth))
            .await
            .map_err(|e| AccountError::Validation(format!("password hashing failed: {e}")))?;

        let now = now_ms();
        let account = {
            let _guard = self.mutation_lock.lock();
            if self.by_username.contains_key(username) {
                return Err(AccountError::UsernameTaken);
            }
            let roles: BTreeSet<Role> = if self.accounts.is_empty() {
                info!(username, "first account registered, granting admin");
                [Role::Admin].into()
            } else {
                [Role::User].into()
            };
            let account = Account {
                id: id::new_id(),
                username: username.to_string(),
                verifier,
                display_name,
                roles,
                status: AccountStatus::Active,
                disabled_reason: None,
                email: profile.email,
                bio: profile.bio,
                avatar_url: profile.avatar_url,
                metadata: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            };
            self.by_username
                .insert(username.to_string(), account.id.clone());
            self.accounts.insert(account.id.clone(), account.clone());
            account
        };
        self.mark_dirty();
        Ok(account)
    }

    /// Verify credentials. Absent account and wrong password are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Account, AccountError> {
        let account = self
            .by_username(username)
            .ok_or(AccountError::InvalidCredentials)?;
        let ok = verify_password(password.to_string(), account.verifier.clone())
            .await
            .unwrap_or(false);
        if !ok {
            return Err(AccountError::InvalidCredentials);
        }
        if !account.is_active() {
            return Err(AccountError::Disabled {
                reason: account.disabled_reason.clone(),
            });
        }
        Ok(account)
    }

    // === Sessions ===

    /// Mint a session for an account. Multiple concurrent sessions are
    /// allowed.
    pub fn create_session(&self, account_id: &str) -> Session {
        let now = now_ms();
        let session = Session {
            token: id::new_session_token(),
            account_id: account_id.to_string(),
            created_at: now,
            last_seen_at: now,
            expires_at: now + self.ttl_ms(),
        };
        self.sessions
            .insert(session.token.clone(), session.clone());
        self.sessions_by_account
            .entry(account_id.to_string())
            .or_default()
            .insert(session.token.clone());
        self.mark_dirty();
        session
    }

    /// Refresh and return a session. Expired or unknown tokens return
    /// `None`; expired ones are revoked synchronously.
    pub fn touch_session(&self, token: &str) -> Option<Session> {
        let now = now_ms();
        let expired = {
            let mut entry = self.sessions.get_mut(token)?;
            if entry.is_expired(now) {
                true
            } else {
                entry.touch(now, self.ttl_ms());
                return Some(entry.clone());
            }
        };
        if expired {
            self.revoke_session(token);
        }
        None
    }

    pub fn revoke_session(&self, token: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(token) else {
            return false;
        };
        if let Some(mut set) = self.sessions_by_account.get_mut(&session.account_id) {
            set.remove(token);
            if set.is_empty() {
                drop(set);
                self.sessions_by_account.remove(&session.account_id);
            }
        }
        self.mark_dirty();
        true
    }

    /// Revoke every session of one account. Returns how many were revoked.
    pub fn revoke_all_for_account(&self, account_id: &str) -> usize {
        let tokens: Vec<String> = self
            .sessions_by_account
            .remove(account_id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default();
        for token in &tokens {
            self.sessions.remove(token);
        }
        if !tokens.is_empty() {
            self.mark_dirty();
        }
        tokens.len()
    }

    /// Drop every expired session. Returns how many were pruned.
    pub fn sweep_expired_sessions(&self) -> usize {
        let now = now_ms();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.token.clone())
            .collect();
        for token in &expired {
            self.revoke_session(token);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired sessions pruned");
        }
        expired.len()
    }

    // === Mutation ===

    /// Apply a profile update. Password changes verify the current password
    /// and revoke every session of the account; the caller re-issues one for
    /// the initiating connection.
    pub async fn update(
        &self,
        account_id: &str,
        params: AccountUpdateParams,
    ) -> Result<(Account, bool), AccountError> {
        let current = self
            .by_id(account_id)
            .ok_or(AccountError::UnknownAccount)?;

        let new_verifier = match &params.new_password {
            Some(new_password) => {
                validate::password(new_password, self.auth.password_min)
                    .map_err(AccountError::Validation)?;
                let supplied = params
                    .current_password
                    .as_deref()
                    .ok_or_else(|| {
                        AccountError::Validation("current password required".to_string())
                    })?;
                let ok = verify_password(supplied.to_string(), current.verifier.clone())
                    .await
                    .unwrap_or(false);
                if !ok {
                    return Err(AccountError::InvalidCredentials);
                }
                Some(
                    hash_password(new_password.clone(), KdfParams::from(&self.auth))
                        .await
                        .map_err(|e| {
                            AccountError::Validation(format!("password hashing failed: {e}"))
                        })?,
                )
            }
            None => None,
        };

        if let Some(name) = &params.display_name {
            validate::display_name(name).map_err(AccountError::Validation)?;
        }

        let password_changed = new_verifier.is_some();
        let account = {
            let mut entry = self
                .accounts
                .get_mut(account_id)
                .ok_or(AccountError::UnknownAccount)?;
            if let Some(name) = params.display_name {
                entry.display_name = name;
            }
            if let Some(email) = params.email {
                entry.email = Some(email);
            }
            if let Some(bio) = params.bio {
                entry.bio = Some(bio);
            }
            if let Some(url) = params.avatar_url {
                entry.avatar_url = Some(url);
            }
            if let Some(metadata) = params.metadata {
                entry.metadata = metadata;
            }
            if let Some(verifier) = new_verifier {
                entry.verifier = verifier;
            }
            entry.updated_at = now_ms();
            entry.clone()
        };

        if password_changed {
            let revoked = self.revoke_all_for_account(account_id);
            info!(account = account_id, revoked, "password changed, sessions revoked");
        }
        self.mark_dirty();
        Ok((account, password_changed))
    }

    /// Replace an account's role set. Rejects an empty set and removal of
    /// the last active admin. Active sessions keep working with new roles.
    pub fn assign_roles(
        &self,
        account_id: &str,
        roles: BTreeSet<Role>,
    ) -> Result<Account, AccountError> {
        if roles.is_empty() {
            return Err(AccountError::EmptyRoles);
        }
        let _guard = self.mutation_lock.lock();
        let target = self
            .by_id(account_id)
            .ok_or(AccountError::UnknownAccount)?;
        let keeps_admin = roles.iter().any(|r| r.level() >= Role::Admin.level());
        if target.is_active_admin() && !keeps_admin && !self.other_active_admin_exists(account_id)
        {
            return Err(AccountError::LastAdmin);
        }
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or(AccountError::UnknownAccount)?;
        entry.roles = roles;
        entry.updated_at = now_ms();
        let account = entry.clone();
        drop(entry);
        self.mark_dirty();
        Ok(account)
    }

    /// Disable an account and revoke its sessions. The orchestrator uses
    /// this signal to force-disconnect related connections.
    pub fn disable(
        &self,
        account_id: &str,
        reason: Option<String>,
    ) -> Result<Account, AccountError> {
        let account = {
            let _guard = self.mutation_lock.lock();
            let target = self
                .by_id(account_id)
                .ok_or(AccountError::UnknownAccount)?;
            if target.is_active_admin() && !self.other_active_admin_exists(account_id) {
                return Err(AccountError::LastAdmin);
            }
            let mut entry = self
                .accounts
                .get_mut(account_id)
                .ok_or(AccountError::UnknownAccount)?;
            entry.status = AccountStatus::Disabled;
            entry.disabled_reason = reason;
            entry.updated_at = now_ms();
            entry.clone()
        };
        let revoked = self.revoke_all_for_account(account_id);
        info!(account = account_id, revoked, "account disabled");
        self.mark_dirty();
        Ok(account)
    }

    pub fn enable(&self, account_id: &str) -> Result<Account, AccountError> {
        let _guard = self.mutation_lock.lock();
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or(AccountError::UnknownAccount)?;
        entry.status = AccountStatus::Active;
        entry.disabled_reason = None;
        entry.updated_at = now_ms();
        let account = entry.clone();
        drop(entry);
        self.mark_dirty();
        Ok(account)
    }

    fn other_active_admin_exists(&self, except_id: &str) -> bool {
        self.accounts
            .iter()
            .any(|entry| entry.id != except_id && entry.is_active_admin())
    }

    // === Queries ===

    pub fn by_id(&self, account_id: &str) -> Option<Account> {
        self.accounts.get(account_id).map(|entry| entry.clone())
    }

    pub fn by_username(&self, username: &str) -> Option<Account> {
        let id = self.by_username.get(username)?.clone();
        self.by_id(&id)
    }

    pub fn count(&self) -> usize {
        self.accounts.len()
    }

    /// Sanitized listing, username-sorted.
    pub fn list_views(&self) -> Vec<AccountView> {
        let mut views: Vec<AccountView> = self
            .accounts
            .iter()
            .map(|entry| entry.to_view())
            .collect();
        views.sort_by(|a, b| a.username.cmp(&b.username));
        views
    }

    // === Snapshots ===

    /// Materialize the snapshot payloads.
    pub fn snapshot_data(&self) -> (Vec<Account>, Vec<Session>) {
        let mut accounts: Vec<Account> =
            self.accounts.iter().map(|entry| entry.clone()).collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        let sessions: Vec<Session> = self.sessions.iter().map(|entry| entry.clone()).collect();
        (accounts, sessions)
    }

    /// Rehydrate from a snapshot. Expired sessions found at load are pruned.
    pub fn load(&self, accounts: Vec<Account>, sessions: Vec<Session>) {
        let now = now_ms();
        for account in accounts {
            self.by_username
                .insert(account.username.clone(), account.id.clone());
            self.accounts.insert(account.id.clone(), account);
        }
        let mut pruned = 0usize;
        for session in sessions {
            if session.is_expired(now) {
                pruned += 1;
                continue;
            }
            self.sessions_by_account
                .entry(session.account_id.clone())
                .or_default()
                .insert(session.token.clone());
            self.sessions.insert(session.token.clone(), session);
        }
        info!(
            accounts = self.accounts.len(),
            sessions = self.sessions.len(),
            pruned,
            "account store rehydrated"
        );
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_auth() -> AuthConfig {
        AuthConfig {
            session_ttl_secs: 3600,
            password_min: 8,
            kdf_memory_kib: 8192,
            kdf_iterations: 1,
        }
    }

    fn manager() -> AccountManager {
        let (tx, _rx) = mpsc::unbounded_channel();
        AccountManager::new(fast_auth(), tx)
    }

    #[tokio::test]
    async fn first_account_is_admin_then_user() {
        let store = manager();
        let first = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(first.roles, [Role::Admin].into());
        let second = store
            .register("bob@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(second.roles, [Role::User].into());
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let store = manager();
        store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(
            store
                .register("alice@x.io", "correcthorse", None)
                .await
                .unwrap_err(),
            AccountError::UsernameTaken
        );
        assert!(matches!(
            store.register("Bad@x.io", "correcthorse", None).await,
            Err(AccountError::Validation(_))
        ));
        assert!(matches!(
            store.register("short@x.io", "tiny", None).await,
            Err(AccountError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn authenticate_paths() {
        let store = manager();
        let account = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();

        assert!(store.authenticate("alice@x.io", "correcthorse").await.is_ok());
        assert_eq!(
            store
                .authenticate("alice@x.io", "wrongwrong")
                .await
                .unwrap_err(),
            AccountError::InvalidCredentials
        );
        assert_eq!(
            store
                .authenticate("ghost@x.io", "correcthorse")
                .await
                .unwrap_err(),
            AccountError::InvalidCredentials
        );

        // Disabled accounts are told so only with valid credentials - but
        // disabling the last admin is refused, so add a second admin first.
        let other = store
            .register("bob@x.io", "correcthorse", None)
            .await
            .unwrap();
        store
            .assign_roles(&other.id, [Role::Admin].into())
            .unwrap();
        store.disable(&account.id, Some("test".into())).unwrap();
        assert!(matches!(
            store
                .authenticate("alice@x.io", "correcthorse")
                .await
                .unwrap_err(),
            AccountError::Disabled { .. }
        ));
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = manager();
        let account = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        let session = store.create_session(&account.id);
        assert!(store.touch_session(&session.token).is_some());

        assert!(store.revoke_session(&session.token));
        assert!(store.touch_session(&session.token).is_none());

        let s1 = store.create_session(&account.id);
        let s2 = store.create_session(&account.id);
        assert_eq!(store.revoke_all_for_account(&account.id), 2);
        assert!(store.touch_session(&s1.token).is_none());
        assert!(store.touch_session(&s2.token).is_none());
    }

    #[tokio::test]
    async fn last_admin_is_protected() {
        let store = manager();
        let admin = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(
            store
                .assign_roles(&admin.id, [Role::User].into())
                .unwrap_err(),
            AccountError::LastAdmin
        );
        assert_eq!(
            store.disable(&admin.id, None).unwrap_err(),
            AccountError::LastAdmin
        );
        // State unchanged.
        assert!(store.by_id(&admin.id).unwrap().is_active_admin());

        // With a second admin the demotion goes through.
        let second = store
            .register("bob@x.io", "correcthorse", None)
            .await
            .unwrap();
        store
            .assign_roles(&second.id, [Role::Admin].into())
            .unwrap();
        store.assign_roles(&admin.id, [Role::User].into()).unwrap();
    }

    #[tokio::test]
    async fn assign_roles_rejects_empty() {
        let store = manager();
        let account = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(
            store.assign_roles(&account.id, BTreeSet::new()).unwrap_err(),
            AccountError::EmptyRoles
        );
    }

    #[tokio::test]
    async fn password_change_revokes_sessions() {
        let store = manager();
        let account = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        let session = store.create_session(&account.id);

        let params = AccountUpdateParams {
            new_password: Some("newhorsebattery".into()),
            current_password: Some("correcthorse".into()),
            ..Default::default()
        };
        let (_, changed) = store.update(&account.id, params).await.unwrap();
        assert!(changed);
        assert!(store.touch_session(&session.token).is_none());
        assert!(
            store
                .authenticate("alice@x.io", "newhorsebattery")
                .await
                .is_ok()
        );

        // Wrong current password is rejected.
        let params = AccountUpdateParams {
            new_password: Some("anotherpassword".into()),
            current_password: Some("wrong".into()),
            ..Default::default()
        };
        assert_eq!(
            store.update(&account.id, params).await.unwrap_err(),
            AccountError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn snapshot_roundtrip_prunes_expired_sessions() {
        let store = manager();
        let account = store
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();
        store.create_session(&account.id);
        let (accounts, mut sessions) = store.snapshot_data();
        assert_eq!(accounts.len(), 1);
        assert_eq!(sessions.len(), 1);

        // One live, one long-expired.
        sessions.push(Session {
            token: "stale".into(),
            account_id: account.id.clone(),
            created_at: 0,
            last_seen_at: 0,
            expires_at: 1,
        });

        let restored = manager();
        restored.load(accounts, sessions);
        assert_eq!(restored.count(), 1);
        assert!(restored.touch_session("stale").is_none());
        // First-admin grant only applies to an empty store; rehydrated
        // stores keep their roles.
        let next = restored
            .register("carol@x.io", "correcthorse", None)
            .await
            .unwrap();
        assert_eq!(next.roles, [Role::User].into());
    }
}
