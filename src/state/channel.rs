//! Channel entity: permissions, membership, and the kind-specific slots
//! (voice participants, stream publish session, screenshare session).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;

use hearth_proto::types::{
    ChannelKind, ChannelView, GroupView, PeerView, PermissionGrant, PermissionsView, Role,
    ScreenshareView,
};
use serde::{Deserialize, Serialize};

/// Channel actions gated by the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    View,
    Chat,
    Voice,
    Stream,
    Manage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Chat => "chat",
            Self::Voice => "voice",
            Self::Stream => "stream",
            Self::Manage => "manage",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "view" => Some(Self::View),
            "chat" => Some(Self::Chat),
            "voice" => Some(Self::Voice),
            "stream" => Some(Self::Stream),
            "manage" => Some(Self::Manage),
            _ => None,
        }
    }

    const ALL: [Action; 5] = [
        Action::View,
        Action::Chat,
        Action::Voice,
        Action::Stream,
        Action::Manage,
    ];
}

/// Canonical grant for one action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    /// Lowercased role names, or the single wildcard `"*"`.
    pub roles: BTreeSet<String>,
    /// Explicit account grants.
    pub accounts: BTreeSet<String>,
}

impl Grant {
    fn wildcard() -> Self {
        Self {
            roles: BTreeSet::from(["*".to_string()]),
            accounts: BTreeSet::new(),
        }
    }

    fn for_roles(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            accounts: BTreeSet::new(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.roles.contains("*")
    }
}

/// A channel's canonical permission matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    grants: BTreeMap<String, Grant>,
}

impl Permissions {
    /// The default matrix: everything open except `manage`.
    pub fn defaults() -> Self {
        let mut grants = BTreeMap::new();
        for action in Action::ALL {
            grants.insert(action.as_str().to_string(), default_grant(action));
        }
        Self { grants }
    }

    /// Normalize raw client input into the canonical form.
    ///
    /// - role names are lowercased and de-duplicated; `*` or `@all` collapses
    ///   the set to the wildcard
    /// - absent actions get their default
    /// - unknown action keys are dropped
    /// - `allowed_streamers` (legacy) folds into `stream.accounts`
    /// - the legacy pair `{admin, streamer}` on `stream.roles` with no
    ///   account grants collapses back to the wildcard (older configs meant
    ///   "anyone may stream" by it)
    pub fn normalize(input: &PermissionsView, allowed_streamers: Option<&[String]>) -> Self {
        let mut grants = BTreeMap::new();

        for action in Action::ALL {
            let grant = match input.get(action.as_str()) {
                Some(raw) => {
                    let mut roles: BTreeSet<String> = raw
                        .roles
                        .iter()
                        .map(|r| r.trim().to_ascii_lowercase())
                        .filter(|r| !r.is_empty())
                        .collect();
                    if roles.contains("*") || roles.contains("@all") {
                        roles = BTreeSet::from(["*".to_string()]);
                    }
                    let accounts: BTreeSet<String> = raw
                        .accounts
                        .iter()
                        .filter(|a| !a.is_empty())
                        .cloned()
                        .collect();
                    if roles.is_empty() && accounts.is_empty() {
                        default_grant(action)
                    } else {
                        Grant { roles, accounts }
                    }
                }
                None => default_grant(action),
            };
            grants.insert(action.as_str().to_string(), grant);
        }

        let mut normalized = Self { grants };

        if let Some(streamers) = allowed_streamers {
            let stream = normalized
                .grants
                .get_mut(Action::Stream.as_str())
                .expect("all actions installed");
            stream
                .accounts
                .extend(streamers.iter().filter(|a| !a.is_empty()).cloned());
        }

        // Legacy collapse: {admin, streamer} with no explicit accounts meant
        // "anyone may stream" in older configs.
        let stream = normalized
            .grants
            .get_mut(Action::Stream.as_str())
            .expect("all actions installed");
        let legacy_pair: BTreeSet<String> =
            ["admin".to_string(), "streamer".to_string()].into();
        if stream.roles == legacy_pair && stream.accounts.is_empty() {
            tracing::debug!("collapsing legacy stream roles {{admin,streamer}} to wildcard");
            *stream = Grant::wildcard();
        }

        normalized
    }

    pub fn grant(&self, action: Action) -> &Grant {
        self.grants
            .get(action.as_str())
            .expect("all actions installed at construction")
    }

    /// Replace one action's grant (used by permission updates).
    pub fn set_grant(&mut self, action: Action, grant: Grant) {
        self.grants.insert(action.as_str().to_string(), grant);
    }

    /// The wire view.
    pub fn to_view(&self) -> PermissionsView {
        self.grants
            .iter()
            .map(|(action, grant)| {
                (
                    action.clone(),
                    PermissionGrant {
                        roles: grant.roles.iter().cloned().collect(),
                        accounts: grant.accounts.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    /// The access check.
    ///
    /// Order: superuser, wildcard, role intersection, explicit account.
    pub fn allows(
        &self,
        action: Action,
        roles: &BTreeSet<Role>,
        account_id: Option<&str>,
    ) -> bool {
        if roles.contains(&Role::Superuser) {
            return true;
        }
        let grant = self.grant(action);
        if grant.is_wildcard() {
            return true;
        }
        if roles.iter().any(|role| grant.roles.contains(role.as_str())) {
            return true;
        }
        account_id.is_some_and(|id| grant.accounts.contains(id))
    }
}

fn default_grant(action: Action) -> Grant {
    match action {
        Action::Manage => Grant::for_roles(&["admin"]),
        _ => Grant::wildcard(),
    }
}

/// A participant in a voice room.
#[derive(Debug, Clone)]
pub struct VoiceParticipant {
    pub conn_id: String,
    pub display_name: String,
    pub muted: bool,
    pub deafened: bool,
    pub joined_at: i64,
}

impl VoiceParticipant {
    pub fn to_peer(&self) -> PeerView {
        PeerView {
            id: self.conn_id.clone(),
            name: self.display_name.clone(),
            muted: self.muted,
            deafened: self.deafened,
        }
    }
}

/// An active RTMP publish session.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub session_id: String,
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub started_at: i64,
    pub source_ip: Option<IpAddr>,
}

impl StreamSession {
    /// Whether an incoming publish attempt is the same principal (idempotent
    /// re-publish) rather than a competing one.
    pub fn same_principal(&self, account_id: Option<&str>, client_id: Option<&str>) -> bool {
        match (&self.account_id, account_id) {
            (Some(ours), Some(theirs)) => return ours == theirs,
            (None, None) => {}
            _ => return false,
        }
        match (&self.client_id, client_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            (None, None) => true,
            _ => false,
        }
    }
}

/// An active screenshare session.
#[derive(Debug, Clone)]
pub struct ScreenshareSession {
    pub host_conn_id: String,
    pub host_name: String,
    pub started_at: i64,
    pub viewers: BTreeSet<String>,
}

/// A named addressable room.
#[derive(Debug)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub group_id: Option<String>,
    pub permissions: Permissions,
    /// Connections subscribed to the channel room (text/stream/screenshare
    /// membership; voice participants are tracked separately).
    pub members: HashSet<String>,
    /// Join-ordered participants. Non-empty iff `voice_session_id` is set.
    pub voice_participants: Vec<VoiceParticipant>,
    pub voice_session_id: Option<String>,
    pub voice_started_at: Option<i64>,
    pub active_stream: Option<StreamSession>,
    /// Present iff `kind == Stream`; immutable except via key regeneration.
    pub stream_key_token: Option<String>,
    pub screenshare: Option<ScreenshareSession>,
    pub created_at: i64,
}

impl Channel {
    pub fn is_live(&self) -> bool {
        self.active_stream.is_some()
    }

    pub fn participant(&self, conn_id: &str) -> Option<&VoiceParticipant> {
        self.voice_participants
            .iter()
            .find(|p| p.conn_id == conn_id)
    }

    pub fn peer_views(&self) -> Vec<PeerView> {
        self.voice_participants
            .iter()
            .map(VoiceParticipant::to_peer)
            .collect()
    }

    pub fn screenshare_view(&self) -> ScreenshareView {
        match &self.screenshare {
            Some(session) => ScreenshareView {
                channel_id: self.id.clone(),
                active: true,
                host_id: Some(session.host_conn_id.clone()),
                host_name: Some(session.host_name.clone()),
                started_at: Some(session.started_at),
                viewer_count: session.viewers.len(),
            },
            None => ScreenshareView {
                channel_id: self.id.clone(),
                active: false,
                host_id: None,
                host_name: None,
                started_at: None,
                viewer_count: 0,
            },
        }
    }

    pub fn to_view(&self) -> ChannelView {
        ChannelView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            group_id: self.group_id.clone(),
            member_count: self.members.len(),
            is_live: matches!(self.kind, ChannelKind::Stream).then(|| self.is_live()),
            voice_participants: self.peer_views(),
            screenshare: matches!(self.kind, ChannelKind::Screenshare)
                .then(|| self.screenshare_view()),
        }
    }
}

/// A channel group. Purely organizational.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub collapsed: bool,
}

impl ChannelGroup {
    pub fn to_view(&self) -> GroupView {
        GroupView {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            collapsed: self.collapsed,
        }
    }
}
