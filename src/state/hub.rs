//! The Hub - central shared state for the communication server.
//!
//! The Hub is a dependency-injection container delegating state and
//! behavior to specialized managers:
//! - [`AccountManager`]: durable accounts and bearer sessions.
//! - [`ChannelManager`]: channels, groups, permissions, and the voice /
//!   stream / screenshare state machines.
//! - [`PresenceManager`]: connection → user materialization, bans, voice
//!   timeouts.
//! - [`HistoryManager`]: per-channel chat rings.
//! - [`SecurityManager`]: rate limiting.
//! - [`LifecycleManager`]: shutdown and forced disconnects.
//!
//! # Lock Order (Deadlock Prevention)
//!
//! When acquiring multiple locks, always follow this order:
//!
//! 1. DashMap shard lock (acquired during `.get()` / `.iter()`)
//! 2. Channel `RwLock` (read or write)
//! 3. User `RwLock` (read or write)
//!
//! **Never acquire locks in reverse order**, and never hold any of them
//! while emitting through the fabric: every manager method returns plain
//! data, and broadcasting happens afterwards.

use std::sync::Arc;

use hearth_proto::{Frame, event};
use tokio::sync::mpsc;
use tracing::info;

use crate::broadcast::Fabric;
use crate::config::Config;
use crate::state::managers::lifecycle::DropReason;
use crate::state::managers::{
    AccountManager, ChannelManager, HistoryManager, LifecycleManager, PresenceManager,
    SecurityManager, StatsManager,
};

/// Central shared state container.
pub struct Hub {
    /// Account and session state.
    pub accounts: Arc<AccountManager>,

    /// Channel registry state.
    pub channels: ChannelManager,

    /// Presence registry state.
    pub presence: PresenceManager,

    /// Chat history state.
    pub history: HistoryManager,

    /// Security (rate limiting) state.
    pub security: SecurityManager,

    /// Runtime statistics.
    pub stats: Arc<StatsManager>,

    /// Shutdown and forced-disconnect signaling.
    pub lifecycle: LifecycleManager,

    /// Room-indexed broadcast fan-out.
    pub fabric: Fabric,

    /// Server configuration (for handlers to access).
    pub config: Config,
}

/// Parameters for creating a new Hub.
pub struct HubParams {
    pub config: Config,
    /// Snapshot writer nudge; mutations in the account store signal it.
    pub dirty_tx: mpsc::UnboundedSender<()>,
    /// Forced-disconnect queue consumed by the disconnect worker.
    pub disconnect_tx: mpsc::Sender<(String, DropReason)>,
}

impl Hub {
    /// Create a new Hub with the given configuration.
    pub fn new(params: HubParams) -> Self {
        let HubParams {
            config,
            dirty_tx,
            disconnect_tx,
        } = params;

        let stats = Arc::new(StatsManager::new());
        let accounts = Arc::new(AccountManager::new(config.auth.clone(), dirty_tx));
        let channels = ChannelManager::new(config.limits.clone(), stats.clone());
        let fabric = Fabric::new(disconnect_tx.clone());

        Self {
            accounts,
            channels,
            presence: PresenceManager::new(),
            history: HistoryManager::new(config.limits.history_depth),
            security: SecurityManager::new(config.rate_limits.clone()),
            stats,
            lifecycle: LifecycleManager::new(disconnect_tx),
            fabric,
            config,
        }
    }

    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // === Snapshot broadcasts ===

    /// The `channels:update` frame (channel + group snapshot).
    pub fn channels_update_frame(&self) -> Frame {
        Frame::new(
            event::CHANNELS_UPDATE,
            event::ChannelsUpdate {
                channels: self.channels.views(),
                groups: self.channels.group_views(),
            },
        )
    }

    /// The `presence` frame (all authenticated connections).
    pub fn presence_frame(&self) -> Frame {
        Frame::new(event::PRESENCE, self.presence.views())
    }

    /// Broadcast the channel snapshot to every connection.
    pub fn broadcast_channels_update(&self) {
        self.fabric.emit_all(&self.channels_update_frame());
    }

    /// Broadcast presence to every connection.
    pub fn broadcast_presence(&self) {
        self.fabric.emit_all(&self.presence_frame());
    }

    // === Room exit & connection teardown ===

    /// Pull a connection out of every room it occupies, announcing each
    /// departure. Presence fields are cleared but the connection itself
    /// stays registered (logout keeps the transport open).
    ///
    /// Callers follow up with the presence/channel snapshot broadcasts.
    pub fn vacate_rooms(&self, conn_id: &str) {
        let Some(user) = self.presence.by_conn(conn_id).map(|u| u.read().clone()) else {
            return;
        };

        // Voice: announce the departure to remaining peers.
        if let Some(voice_channel) = &user.voice_channel {
            self.fabric.unsubscribe(voice_channel, conn_id);
            if self.channels.remove_voice(voice_channel, conn_id).is_some() {
                self.fabric.emit_room(
                    voice_channel,
                    &Frame::new(
                        event::VOICE_PEER_LEAVE,
                        serde_json::json!({ "id": conn_id }),
                    ),
                );
            }
            self.presence.set_voice_channel(conn_id, None);
        }

        // Screenshare: a departing host force-clears the session.
        if let Some(channel_id) = &user.screenshare_host_of {
            if self.channels.stop_screenshare(channel_id, conn_id).is_ok() {
                if let Some(channel) = self.channels.get(channel_id) {
                    let view = channel.read().screenshare_view();
                    self.fabric
                        .emit_room(channel_id, &Frame::new(event::SCREENSHARE_SESSION, view));
                }
            }
            self.presence.set_screenshare_host(conn_id, None);
        }
        if let Some(channel_id) = &user.screenshare_viewer_of {
            if self
                .channels
                .screenshare_viewer_leave(channel_id, conn_id)
                .is_some()
            {
                if let Some(channel) = self.channels.get(channel_id) {
                    let view = channel.read().screenshare_view();
                    self.fabric
                        .emit_room(channel_id, &Frame::new(event::SCREENSHARE_SESSION, view));
                }
            }
            self.presence.set_screenshare_viewer(conn_id, None);
        }

        // Text/stream/screenshare room membership.
        if let Some(channel_id) = &user.current_channel {
            self.channels.remove_member(channel_id, conn_id);
            self.fabric.unsubscribe(channel_id, conn_id);
            self.presence.set_current_channel(conn_id, None);
        }
    }

    /// Remove a connection from every registry and announce its departure.
    ///
    /// The canonical disconnect logic, shared by normal transport close,
    /// bans, account disables, and slow-subscriber drops. Safe to call
    /// twice; the second call finds nothing to do.
    pub fn teardown_connection(&self, conn_id: &str, reason: Option<DropReason>) {
        if self.presence.by_conn(conn_id).is_none() {
            return;
        }
        self.vacate_rooms(conn_id);
        let user = self.presence.remove(conn_id);

        self.fabric.unregister(conn_id);
        self.stats.client_disconnected();
        crate::metrics::CONNECTED_CLIENTS.dec();
        info!(
            conn_id,
            account = user
                .as_ref()
                .and_then(|u| u.account_id.as_deref())
                .unwrap_or("-"),
            reason = reason.map(|r| r.as_str()).unwrap_or("closed"),
            "connection removed"
        );

        self.broadcast_presence();
        self.broadcast_channels_update();
    }
}
