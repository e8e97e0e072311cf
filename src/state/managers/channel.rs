//! Channel registry - channels, groups, permissions, and the voice /
//! stream / screenshare state machines.
//!
//! Every transition that touches one channel runs under that channel's
//! write lock and returns plain data; broadcasting happens in the handlers
//! after the lock is released. Lock order: DashMap shard → channel lock →
//! (optionally) user lock, never reversed.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use hearth_proto::types::{ChannelKind, ChannelView, GroupView, PeerView};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::LimitsConfig;
use crate::error::ChannelError;
use crate::state::channel::{
    Action, Channel, ChannelGroup, Permissions, ScreenshareSession, StreamSession,
    VoiceParticipant,
};
use crate::state::managers::stats::StatsManager;
use crate::util::{id::new_id, stream_key, validate};

/// Outcome of a voice join.
pub struct VoiceJoined {
    /// Peers present before the join (the set to notify).
    pub prior_peers: Vec<PeerView>,
    pub participant: PeerView,
    pub session_id: String,
    pub started_at: i64,
}

/// Outcome of a voice leave.
pub struct VoiceLeft {
    /// Peers remaining after the leave.
    pub remaining_peers: Vec<PeerView>,
    /// Whether this leave emptied the room and cleared the session.
    pub session_cleared: bool,
}

/// Outcome of a stream start.
pub struct StreamStarted {
    pub channel_id: String,
    pub channel_name: String,
    pub session_id: String,
    pub started_at: i64,
    /// False when an identical principal re-published into its own live
    /// session (idempotent restart).
    pub newly_live: bool,
}

/// Outcome of a stream end.
pub struct StreamEnded {
    pub released: bool,
    /// The supplied reference did not match the active session. The end is
    /// still performed - the RTMP server is authoritative on disconnection.
    pub mismatch: bool,
}

/// Channel registry state.
pub struct ChannelManager {
    channels: DashMap<String, Arc<RwLock<Channel>>>,
    by_name: DashMap<String, String>,
    by_stream_token: DashMap<String, String>,
    groups: DashMap<String, ChannelGroup>,
    limits: LimitsConfig,
    stats: Arc<StatsManager>,
}

impl ChannelManager {
    pub fn new(limits: LimitsConfig, stats: Arc<StatsManager>) -> Self {
        Self {
            channels: DashMap::new(),
            by_name: DashMap::new(),
            by_stream_token: DashMap::new(),
            groups: DashMap::new(),
            limits,
            stats,
        }
    }

    // === CRUD ===

    /// Create a channel. Stream channels mint their key token here.
    pub fn create(
        &self,
        name: &str,
        kind: ChannelKind,
        group_id: Option<String>,
        permissions: Permissions,
    ) -> Result<ChannelView, ChannelError> {
        validate::channel_name(name).map_err(ChannelError::Validation)?;
        if self.channels.len() >= self.limits.max_channels {
            return Err(ChannelError::TooManyChannels);
        }
        let name_key = name.to_lowercase();
        if self.by_name.contains_key(&name_key) {
            return Err(ChannelError::NameTaken);
        }
        if let Some(group) = &group_id {
            if !self.groups.contains_key(group) {
                return Err(ChannelError::Validation("unknown group".to_string()));
            }
        }

        let channel_id = new_id();
        let stream_key_token =
            matches!(kind, ChannelKind::Stream).then(stream_key::generate_token);
        if let Some(token) = &stream_key_token {
            self.by_stream_token.insert(token.clone(), channel_id.clone());
        }

        let channel = Channel {
            id: channel_id.clone(),
            name: name.to_string(),
            kind,
            group_id,
            permissions,
            members: HashSet::new(),
            voice_participants: Vec::new(),
            voice_session_id: None,
            voice_started_at: None,
            active_stream: None,
            stream_key_token,
            screenshare: None,
            created_at: now_ms(),
        };
        let view = channel.to_view();

        self.by_name.insert(name_key, channel_id.clone());
        self.channels
            .insert(channel_id, Arc::new(RwLock::new(channel)));
        self.stats.channel_created();
        crate::metrics::ACTIVE_CHANNELS.inc();
        info!(channel = name, kind = ?kind, "channel created");
        Ok(view)
    }

    /// Delete a channel. Returns every connection that must be ejected:
    /// room members first, then voice participants.
    pub fn delete(&self, channel_id: &str) -> Result<(Vec<String>, Vec<String>), ChannelError> {
        let (_, channel) = self
            .channels
            .remove(channel_id)
            .ok_or(ChannelError::NotFound)?;
        let channel = channel.read();
        self.by_name.remove(&channel.name.to_lowercase());
        if let Some(token) = &channel.stream_key_token {
            self.by_stream_token.remove(token);
        }
        if channel.voice_session_id.is_some() {
            crate::metrics::ACTIVE_VOICE_SESSIONS.dec();
        }
        if channel.is_live() {
            crate::metrics::LIVE_STREAMS.dec();
        }
        self.stats.channel_destroyed();
        crate::metrics::ACTIVE_CHANNELS.dec();
        info!(channel = %channel.name, "channel deleted");
        Ok((
            channel.members.iter().cloned().collect(),
            channel
                .voice_participants
                .iter()
                .map(|p| p.conn_id.clone())
                .collect(),
        ))
    }

    pub fn get(&self, channel_id: &str) -> Option<Arc<RwLock<Channel>>> {
        self.channels.get(channel_id).map(|e| e.value().clone())
    }

    pub fn resolve_name(&self, name: &str) -> Option<String> {
        self.by_name.get(&name.to_lowercase()).map(|e| e.clone())
    }

    pub fn by_stream_token(&self, token: &str) -> Option<String> {
        self.by_stream_token.get(token).map(|e| e.clone())
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    /// Snapshot of every channel, name-sorted for stable output.
    pub fn views(&self) -> Vec<ChannelView> {
        let mut views: Vec<ChannelView> = self
            .channels
            .iter()
            .map(|entry| entry.value().read().to_view())
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    // === Groups ===

    pub fn create_group(&self, name: &str, kind: ChannelKind, collapsed: bool) -> String {
        let group = ChannelGroup {
            id: new_id(),
            name: name.to_string(),
            kind,
            collapsed,
        };
        let id = group.id.clone();
        self.groups.insert(id.clone(), group);
        id
    }

    pub fn group_views(&self) -> Vec<GroupView> {
        let mut views: Vec<GroupView> = self
            .groups
            .iter()
            .map(|entry| entry.value().to_view())
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    // === Access ===

    /// The access check of §4.3: superuser, wildcard, role, account.
    pub fn can_access(
        &self,
        channel_id: &str,
        roles: &std::collections::BTreeSet<hearth_proto::Role>,
        account_id: Option<&str>,
        action: Action,
    ) -> Result<bool, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let channel = channel.read();
        Ok(channel.permissions.allows(action, roles, account_id))
    }

    // === Membership (text/stream/screenshare rooms) ===

    pub fn add_member(&self, channel_id: &str, conn_id: &str) -> Result<(), ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        if channel.members.len() >= self.limits.max_members_per_channel
            && !channel.members.contains(conn_id)
        {
            return Err(ChannelError::ChannelFull);
        }
        channel.members.insert(conn_id.to_string());
        Ok(())
    }

    pub fn remove_member(&self, channel_id: &str, conn_id: &str) {
        if let Some(channel) = self.get(channel_id) {
            channel.write().members.remove(conn_id);
        }
    }

    // === Voice state machine ===

    /// Insert (or refresh) a voice participant.
    ///
    /// The first participant opens the voice session: a fresh opaque
    /// `session_id` and `started_at` are assigned; the last removal clears
    /// both ([`Self::remove_voice`]).
    pub fn add_voice(
        &self,
        channel_id: &str,
        conn_id: &str,
        display_name: &str,
    ) -> Result<VoiceJoined, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        if !matches!(channel.kind, ChannelKind::Voice) {
            return Err(ChannelError::Validation("not a voice channel".to_string()));
        }

        let now = now_ms();
        if channel.voice_participants.is_empty() {
            channel.voice_session_id = Some(new_id());
            channel.voice_started_at = Some(now);
            crate::metrics::ACTIVE_VOICE_SESSIONS.inc();
        }

        let prior_peers: Vec<PeerView> = channel
            .voice_participants
            .iter()
            .filter(|p| p.conn_id != conn_id)
            .map(VoiceParticipant::to_peer)
            .collect();

        let participant = match channel
            .voice_participants
            .iter_mut()
            .find(|p| p.conn_id == conn_id)
        {
            Some(existing) => {
                existing.display_name = display_name.to_string();
                existing.clone()
            }
            None => {
                let participant = VoiceParticipant {
                    conn_id: conn_id.to_string(),
                    display_name: display_name.to_string(),
                    muted: false,
                    deafened: false,
                    joined_at: now,
                };
                channel.voice_participants.push(participant.clone());
                participant
            }
        };

        Ok(VoiceJoined {
            prior_peers,
            participant: participant.to_peer(),
            session_id: channel
                .voice_session_id
                .clone()
                .expect("session id set above"),
            started_at: channel.voice_started_at.expect("started_at set above"),
        })
    }

    /// Remove a voice participant; the last removal closes the session.
    pub fn remove_voice(&self, channel_id: &str, conn_id: &str) -> Option<VoiceLeft> {
        let channel = self.get(channel_id)?;
        let mut channel = channel.write();
        let before = channel.voice_participants.len();
        channel.voice_participants.retain(|p| p.conn_id != conn_id);
        if channel.voice_participants.len() == before {
            return None;
        }
        let session_cleared = channel.voice_participants.is_empty();
        if session_cleared {
            channel.voice_session_id = None;
            channel.voice_started_at = None;
            crate::metrics::ACTIVE_VOICE_SESSIONS.dec();
        }
        Some(VoiceLeft {
            remaining_peers: channel.peer_views(),
            session_cleared,
        })
    }

    /// Merge a mute/deafen update. Deafen implies muted.
    pub fn update_voice_state(
        &self,
        channel_id: &str,
        conn_id: &str,
        muted: bool,
        deafened: bool,
    ) -> Option<PeerView> {
        let channel = self.get(channel_id)?;
        let mut channel = channel.write();
        let participant = channel
            .voice_participants
            .iter_mut()
            .find(|p| p.conn_id == conn_id)?;
        participant.deafened = deafened;
        participant.muted = muted || deafened;
        Some(participant.to_peer())
    }

    // === Stream publish state machine ===

    /// Begin (or idempotently re-enter) a publish session.
    pub fn start_stream(
        &self,
        channel_id: &str,
        account_id: Option<String>,
        client_id: Option<String>,
        source_ip: Option<IpAddr>,
    ) -> Result<StreamStarted, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        if !matches!(channel.kind, ChannelKind::Stream) {
            return Err(ChannelError::Validation("not a stream channel".to_string()));
        }

        if let Some(active) = &channel.active_stream {
            if active.same_principal(account_id.as_deref(), client_id.as_deref()) {
                debug!(channel = %channel.name, "idempotent stream restart");
                return Ok(StreamStarted {
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    session_id: active.session_id.clone(),
                    started_at: active.started_at,
                    newly_live: false,
                });
            }
            return Err(ChannelError::StreamAlreadyLive);
        }

        let session = StreamSession {
            session_id: new_id(),
            account_id,
            client_id,
            started_at: now_ms(),
            source_ip,
        };
        let started = StreamStarted {
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            session_id: session.session_id.clone(),
            started_at: session.started_at,
            newly_live: true,
        };
        channel.active_stream = Some(session);
        crate::metrics::LIVE_STREAMS.inc();
        info!(channel = %channel.name, session = %started.session_id, "stream live");
        Ok(started)
    }

    /// Release a publish session.
    ///
    /// A stale or missing reference still releases - the RTMP server has
    /// authoritative liveness - but the mismatch is reported and logged.
    pub fn end_stream(
        &self,
        channel_id: &str,
        session_id: Option<&str>,
        client_id: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<StreamEnded, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        let Some(active) = channel.active_stream.take() else {
            return Ok(StreamEnded {
                released: false,
                mismatch: false,
            });
        };

        let mismatch = session_id.is_some_and(|s| s != active.session_id)
            || client_id.is_some_and(|c| active.client_id.as_deref() != Some(c))
            || account_id.is_some_and(|a| active.account_id.as_deref() != Some(a));
        if mismatch {
            warn!(
                channel = %channel.name,
                active_session = %active.session_id,
                "stream end reference mismatch, releasing anyway"
            );
        }
        crate::metrics::LIVE_STREAMS.dec();
        info!(channel = %channel.name, "stream ended");
        Ok(StreamEnded {
            released: true,
            mismatch,
        })
    }

    /// The publishable key string for a stream channel.
    pub fn stream_key(&self, channel_id: &str) -> Result<(String, String), ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let channel = channel.read();
        let token = channel
            .stream_key_token
            .as_ref()
            .ok_or_else(|| ChannelError::Validation("not a stream channel".to_string()))?;
        Ok((
            channel.name.clone(),
            stream_key::format_stream_key(&channel.name, token),
        ))
    }

    /// Mint a fresh key token, invalidating the old one.
    pub fn regenerate_stream_key(&self, channel_id: &str) -> Result<String, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        let old = channel
            .stream_key_token
            .take()
            .ok_or_else(|| ChannelError::Validation("not a stream channel".to_string()))?;
        self.by_stream_token.remove(&old);
        let token = stream_key::generate_token();
        self.by_stream_token.insert(token.clone(), channel.id.clone());
        let key = stream_key::format_stream_key(&channel.name, &token);
        channel.stream_key_token = Some(token);
        Ok(key)
    }

    // === Screenshare state machine ===

    /// Start hosting. Fails if another host is active.
    pub fn start_screenshare(
        &self,
        channel_id: &str,
        host_conn_id: &str,
        host_name: &str,
    ) -> Result<(), ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        if !matches!(channel.kind, ChannelKind::Screenshare) {
            return Err(ChannelError::Validation(
                "not a screenshare channel".to_string(),
            ));
        }
        match &channel.screenshare {
            Some(session) if session.host_conn_id != host_conn_id => {
                Err(ChannelError::ScreenshareActive)
            }
            _ => {
                channel.screenshare = Some(ScreenshareSession {
                    host_conn_id: host_conn_id.to_string(),
                    host_name: host_name.to_string(),
                    started_at: now_ms(),
                    viewers: Default::default(),
                });
                Ok(())
            }
        }
    }

    /// Stop hosting. Only the current host (or a force-clear on disconnect)
    /// may stop. Returns the viewers to notify.
    pub fn stop_screenshare(
        &self,
        channel_id: &str,
        host_conn_id: &str,
    ) -> Result<Vec<String>, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        match &channel.screenshare {
            Some(session) if session.host_conn_id == host_conn_id => {
                let viewers = session.viewers.iter().cloned().collect();
                channel.screenshare = None;
                Ok(viewers)
            }
            Some(_) => Err(ChannelError::Validation(
                "not the screenshare host".to_string(),
            )),
            None => Err(ChannelError::Validation("no active screenshare".to_string())),
        }
    }

    pub fn screenshare_viewer_join(
        &self,
        channel_id: &str,
        conn_id: &str,
    ) -> Result<usize, ChannelError> {
        let channel = self.get(channel_id).ok_or(ChannelError::NotFound)?;
        let mut channel = channel.write();
        let session = channel
            .screenshare
            .as_mut()
            .ok_or_else(|| ChannelError::Validation("no active screenshare".to_string()))?;
        session.viewers.insert(conn_id.to_string());
        Ok(session.viewers.len())
    }

    pub fn screenshare_viewer_leave(&self, channel_id: &str, conn_id: &str) -> Option<usize> {
        let channel = self.get(channel_id)?;
        let mut channel = channel.write();
        let session = channel.screenshare.as_mut()?;
        session.viewers.remove(conn_id);
        Some(session.viewers.len())
    }

    // === Boot seeding ===

    /// Materialize the default groups and channels. Skips anything already
    /// present (rehydration keeps user-created channels intact).
    pub fn seed_defaults(&self) {
        let text_group = self.find_or_create_group("Text", ChannelKind::Text);
        let voice_group = self.find_or_create_group("Voice", ChannelKind::Voice);
        let stream_group = self.find_or_create_group("Streams", ChannelKind::Stream);

        let defaults = [
            ("general", ChannelKind::Text, &text_group),
            ("random", ChannelKind::Text, &text_group),
            ("lounge", ChannelKind::Voice, &voice_group),
            ("cam1", ChannelKind::Stream, &stream_group),
            ("screens", ChannelKind::Screenshare, &stream_group),
        ];
        for (name, kind, group) in defaults {
            if self.resolve_name(name).is_none() {
                if let Err(e) = self.create(
                    name,
                    kind,
                    Some(group.clone()),
                    Permissions::defaults(),
                ) {
                    warn!(channel = name, error = %e, "failed to seed default channel");
                }
            }
        }
    }

    fn find_or_create_group(&self, name: &str, kind: ChannelKind) -> String {
        self.groups
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| entry.key().clone())
            .unwrap_or_else(|| self.create_group(name, kind, false))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
