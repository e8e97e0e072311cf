//! The materialized per-connection user and the role capability table.

use std::collections::BTreeSet;
use std::net::IpAddr;

use hearth_proto::Role;
use hearth_proto::types::UserView;

/// Capabilities granted by roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateChannels,
    DeleteChannels,
    EditChannels,
    ManageUsers,
    AssignRoles,
    RegenerateKeys,
    StreamAnywhere,
    Moderate,
    ViewAllKeys,
    DeleteAnyMessage,
    BanUsers,
    ViewLogs,
    ManageChannelPermissions,
    DisableAccounts,
}

/// Static role → capability table. Superuser short-circuits in
/// [`User::has_capability`] and never consults this.
pub fn role_capabilities(role: Role) -> &'static [Capability] {
    use Capability::*;
    match role {
        Role::Superuser | Role::Admin => &[
            CreateChannels,
            DeleteChannels,
            EditChannels,
            ManageUsers,
            AssignRoles,
            RegenerateKeys,
            StreamAnywhere,
            Moderate,
            ViewAllKeys,
            DeleteAnyMessage,
            BanUsers,
            ViewLogs,
            ManageChannelPermissions,
            DisableAccounts,
        ],
        Role::Moderator => &[Moderate, DeleteAnyMessage, BanUsers, ViewLogs],
        Role::Streamer => &[StreamAnywhere],
        Role::User => &[],
    }
}

/// A live connection's materialized view of its account plus presence
/// fields. Owned exclusively by the presence registry.
#[derive(Debug, Clone)]
pub struct User {
    pub conn_id: String,
    pub account_id: Option<String>,
    pub display_name: String,
    pub roles: BTreeSet<Role>,
    /// Text/stream/screenshare room currently joined (at most one).
    pub current_channel: Option<String>,
    /// Voice channel currently joined (at most one, independent slot).
    pub voice_channel: Option<String>,
    /// Screenshare the connection is hosting, if any.
    pub screenshare_host_of: Option<String>,
    /// Screenshare the connection is viewing, if any.
    pub screenshare_viewer_of: Option<String>,
    pub voice_timeout_until: Option<i64>,
    pub remote_ip: IpAddr,
    pub connected_at: i64,
    pub last_activity: i64,
}

impl User {
    pub fn new(conn_id: String, remote_ip: IpAddr, now: i64) -> Self {
        Self {
            conn_id,
            account_id: None,
            display_name: "anonymous".to_string(),
            roles: BTreeSet::new(),
            current_channel: None,
            voice_channel: None,
            screenshare_host_of: None,
            screenshare_viewer_of: None,
            voice_timeout_until: None,
            remote_ip,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some()
    }

    pub fn is_superuser(&self) -> bool {
        self.roles.contains(&Role::Superuser)
    }

    pub fn highest_role_level(&self) -> u8 {
        self.roles.iter().map(Role::level).max().unwrap_or(0)
    }

    /// Capability check against the static table. Superuser always passes.
    pub fn has_capability(&self, cap: Capability) -> bool {
        if self.is_superuser() {
            return true;
        }
        self.roles
            .iter()
            .any(|role| role_capabilities(*role).contains(&cap))
    }

    /// Remaining voice timeout in milliseconds, if one is active.
    pub fn voice_timeout_remaining(&self, now: i64) -> Option<i64> {
        self.voice_timeout_until
            .map(|deadline| deadline - now)
            .filter(|remaining| *remaining > 0)
    }

    pub fn to_view(&self) -> UserView {
        UserView {
            id: self.conn_id.clone(),
            account_id: self.account_id.clone(),
            name: self.display_name.clone(),
            roles: self.roles.iter().copied().collect(),
            current_channel: self.current_channel.clone(),
            voice_channel: self.voice_channel.clone(),
        }
    }
}

/// The privilege-escalation rule for role mutation: the actor's highest
/// level must cover both the target's current highest level and the highest
/// role being assigned. Superuser bypasses.
pub fn may_assign_roles(actor: &User, target_highest: u8, assigning: &BTreeSet<Role>) -> bool {
    if actor.is_superuser() {
        return true;
    }
    let actor_level = actor.highest_role_level();
    let assigning_max = assigning.iter().map(Role::level).max().unwrap_or(0);
    actor_level >= target_highest && actor_level >= assigning_max
}

/// An account-level ban record.
#[derive(Debug, Clone)]
pub struct Ban {
    pub account_id: String,
    pub reason: Option<String>,
    pub banned_by: String,
    pub banned_at: i64,
    /// Absent means permanent.
    pub expires_at: Option<i64>,
}

impl Ban {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}
