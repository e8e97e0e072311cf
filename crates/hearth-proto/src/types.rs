//! Shared wire views.
//!
//! These are the payload shapes that appear inside frames. Field names use
//! camelCase on the wire; struct names end in `View` when they are a
//! sanitized projection of server-side state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Streamer,
    Moderator,
    Admin,
    Superuser,
}

impl Role {
    /// Numeric privilege level; higher outranks lower.
    pub fn level(&self) -> u8 {
        match self {
            Self::User => 0,
            Self::Streamer => 1,
            Self::Moderator => 2,
            Self::Admin => 3,
            Self::Superuser => 4,
        }
    }

    /// Parse a lowercase role name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "streamer" => Some(Self::Streamer),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            "superuser" => Some(Self::Superuser),
            _ => None,
        }
    }

    /// The wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Streamer => "streamer",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
            Self::Superuser => "superuser",
        }
    }
}

/// Channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Voice,
    Stream,
    Screenshare,
}

impl ChannelKind {
    /// Parse a lowercase kind name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "stream" => Some(Self::Stream),
            "screenshare" => Some(Self::Screenshare),
            _ => None,
        }
    }
}

/// Permission grants for one action: role names (or `"*"`) plus explicit
/// account ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// A channel's full permission matrix keyed by action name
/// (`view`, `chat`, `voice`, `stream`, `manage`).
pub type PermissionsView = BTreeMap<String, PermissionGrant>;

/// Sanitized account record (never carries the password verifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Live connection count; present only in admin listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<usize>,
}

/// A bearer session handed to the client on auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub token: String,
    pub expires_at: i64,
}

/// The presence view of one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// Connection id - the peer handle used in voice signaling.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub name: String,
    pub roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_channel: Option<String>,
}

/// A voice participant as seen by peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    pub id: String,
    pub name: String,
    pub muted: bool,
    pub deafened: bool,
}

/// Live screenshare session descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshareView {
    pub channel_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    pub viewer_count: usize,
}

/// A channel in the `channels:update` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub member_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voice_participants: Vec<PeerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshare: Option<ScreenshareView>,
}

/// A channel group (purely organizational).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub collapsed: bool,
}

/// A chat record as delivered in `chat` and `chat:history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub channel_id: String,
    pub from: String,
    pub from_name: String,
    pub text: String,
    pub ts: i64,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_follows_levels() {
        assert!(Role::Superuser > Role::Admin);
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Streamer);
        assert!(Role::Streamer > Role::User);
    }

    #[test]
    fn role_wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::parse("superuser"), Some(Role::Superuser));
        assert_eq!(Role::parse("Admin"), None);
    }

    #[test]
    fn channel_view_uses_type_key() {
        let view = ChannelView {
            id: "c1".into(),
            name: "general".into(),
            kind: ChannelKind::Text,
            group_id: None,
            member_count: 0,
            is_live: None,
            voice_participants: vec![],
            screenshare: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "text");
        assert!(json.get("isLive").is_none());
    }

    #[test]
    fn account_view_roundtrip() {
        let view = AccountView {
            id: "a1".into(),
            username: "alice@x.io".into(),
            display_name: "Alice".into(),
            roles: vec![Role::Admin],
            status: "active".into(),
            disabled_reason: None,
            email: None,
            bio: None,
            avatar_url: None,
            metadata: BTreeMap::new(),
            created_at: 1,
            updated_at: 2,
            connections: None,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"displayName\":\"Alice\""));
        assert!(!json.contains("verifier"));
        let back: AccountView = serde_json::from_str(&json).unwrap();
        assert_eq!(back.roles, vec![Role::Admin]);
    }
}
