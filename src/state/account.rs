//! Account entity - the durable identity record.

use std::collections::{BTreeMap, BTreeSet};

use hearth_proto::Role;
use hearth_proto::types::AccountView;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
}

/// A durable account. Serialized verbatim (verifier included) into the
/// accounts snapshot; never sent to clients - see [`Account::to_view`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Lowercase email, unique across the store.
    pub username: String,
    /// Opaque KDF output (argon2 PHC string).
    pub verifier: String,
    pub display_name: String,
    /// Never empty.
    pub roles: BTreeSet<Role>,
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// Whether the account may authenticate and act.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether the account is an active admin (or above).
    pub fn is_active_admin(&self) -> bool {
        self.is_active() && self.roles.iter().any(|r| r.level() >= Role::Admin.level())
    }

    /// Highest role level held.
    pub fn highest_role_level(&self) -> u8 {
        self.roles.iter().map(Role::level).max().unwrap_or(0)
    }

    /// The sanitized client-facing view (no verifier).
    pub fn to_view(&self) -> AccountView {
        AccountView {
            id: self.id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            roles: self.roles.iter().copied().collect(),
            status: match self.status {
                AccountStatus::Active => "active".to_string(),
                AccountStatus::Disabled => "disabled".to_string(),
            },
            disabled_reason: self.disabled_reason.clone(),
            email: self.email.clone(),
            bio: self.bio.clone(),
            avatar_url: self.avatar_url.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            connections: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(roles: &[Role], status: AccountStatus) -> Account {
        Account {
            id: "a1".into(),
            username: "a@x.io".into(),
            verifier: "$argon2id$stub".into(),
            display_name: "A".into(),
            roles: roles.iter().copied().collect(),
            status,
            disabled_reason: None,
            email: None,
            bio: None,
            avatar_url: None,
            metadata: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn active_admin_detection() {
        assert!(account(&[Role::Admin], AccountStatus::Active).is_active_admin());
        assert!(account(&[Role::Superuser], AccountStatus::Active).is_active_admin());
        assert!(!account(&[Role::Admin], AccountStatus::Disabled).is_active_admin());
        assert!(!account(&[Role::Moderator], AccountStatus::Active).is_active_admin());
    }

    #[test]
    fn view_never_carries_verifier() {
        let view = account(&[Role::User], AccountStatus::Active).to_view();
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("verifier"));
    }

    #[test]
    fn snapshot_roundtrip_keeps_verifier() {
        let original = account(&[Role::Admin], AccountStatus::Active);
        let json = serde_json::to_string(&original).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back.verifier, original.verifier);
        assert_eq!(back.roles, original.roles);
    }
}
