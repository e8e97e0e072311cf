//! Command handlers.
//!
//! The [`Registry`] maps command names to [`Handler`] implementations; the
//! connection task dispatches every inbound frame through it, one at a
//! time. Failures become a single error event to the initiating
//! connection, routed to the event family the command belongs to - a
//! failed command never closes the connection.

mod account;
mod admin;
mod auth;
mod channel;
mod chat;
mod screenshare;
mod stream_key;
mod voice;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_proto::{Command, Frame, ProtocolError, event};
use tracing::{debug, warn};

pub use account::{AccountGetHandler, AccountUpdateHandler};
pub use admin::{
    AccountsListHandler, DisableAccountHandler, EnableAccountHandler, GetPermissionsHandler,
    UpdatePermissionsHandler, UpdateRolesHandler,
};
pub use auth::{LoginHandler, LogoutHandler, RegisterHandler, ResumeHandler};
pub use channel::{ChannelJoinHandler, CreateChannelHandler, DeleteChannelHandler, ListChannelsHandler};
pub use chat::{ChatDeleteHandler, ChatHandler, ChatHistoryHandler};
pub use screenshare::{
    ScreenshareSignalHandler, StartScreenshareHandler, StopScreenshareHandler,
    ViewerJoinHandler, ViewerLeaveHandler,
};
pub use stream_key::StreamKeyHandler;
pub use voice::{
    BanUserHandler, VoiceJoinHandler, VoiceKickHandler, VoiceLeaveHandler, VoiceSignalHandler,
    VoiceStateHandler, VoiceTimeoutHandler,
};

use crate::error::{HandlerError, HandlerResult};
use crate::state::Hub;

/// Per-connection authentication state, owned by the connection task.
#[derive(Debug, Default)]
pub struct ConnState {
    pub account_id: Option<String>,
    pub session_token: Option<String>,
}

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// This connection's id.
    pub conn_id: &'a str,
    /// Peer address of the transport.
    pub remote_ip: IpAddr,
    /// Shared server state.
    pub hub: &'a Arc<Hub>,
    /// Per-connection auth state.
    pub state: &'a mut ConnState,
}

impl Context<'_> {
    /// Queue a frame for this connection.
    pub fn reply(&self, frame: &Frame) {
        self.hub.fabric.emit_conn(self.conn_id, frame);
    }

    /// The caller's display name, for moderation notices.
    pub fn display_name(&self) -> String {
        self.hub
            .presence
            .by_conn(self.conn_id)
            .map(|user| user.read().display_name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Trait implemented by all command handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one command.
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult;
}

/// Registry of command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Authentication
        handlers.insert("auth:register", Box::new(RegisterHandler));
        handlers.insert("auth:login", Box::new(LoginHandler));
        handlers.insert("auth:session", Box::new(ResumeHandler));
        handlers.insert("auth:logout", Box::new(LogoutHandler));

        // Account self-service
        handlers.insert("account:update", Box::new(AccountUpdateHandler));
        handlers.insert("account:get", Box::new(AccountGetHandler));

        // Administration
        handlers.insert("admin:accounts:list", Box::new(AccountsListHandler));
        handlers.insert("admin:accounts:updateRoles", Box::new(UpdateRolesHandler));
        handlers.insert("admin:accounts:disable", Box::new(DisableAccountHandler));
        handlers.insert("admin:accounts:enable", Box::new(EnableAccountHandler));
        handlers.insert("admin:channels:getPermissions", Box::new(GetPermissionsHandler));
        handlers.insert(
            "admin:channels:updatePermissions",
            Box::new(UpdatePermissionsHandler),
        );

        // Channels
        handlers.insert("channels:create", Box::new(CreateChannelHandler));
        handlers.insert("channels:delete", Box::new(DeleteChannelHandler));
        handlers.insert("channels:list", Box::new(ListChannelsHandler));
        handlers.insert("channel:join", Box::new(ChannelJoinHandler));

        // Chat
        handlers.insert("chat", Box::new(ChatHandler));
        handlers.insert("chat:delete", Box::new(ChatDeleteHandler));
        handlers.insert("chat:history", Box::new(ChatHistoryHandler));

        // Voice & moderation
        handlers.insert("voice:join", Box::new(VoiceJoinHandler));
        handlers.insert("voice:leave", Box::new(VoiceLeaveHandler));
        handlers.insert("voice:state", Box::new(VoiceStateHandler));
        handlers.insert("voice:signal", Box::new(VoiceSignalHandler));
        handlers.insert("voice:kick", Box::new(VoiceKickHandler));
        handlers.insert("voice:timeout", Box::new(VoiceTimeoutHandler));
        handlers.insert("user:ban", Box::new(BanUserHandler));

        // Screenshare
        handlers.insert("screenshare:start", Box::new(StartScreenshareHandler));
        handlers.insert("screenshare:stop", Box::new(StopScreenshareHandler));
        handlers.insert("screenshare:viewer:join", Box::new(ViewerJoinHandler));
        handlers.insert("screenshare:viewer:leave", Box::new(ViewerLeaveHandler));
        handlers.insert("screenshare:signal", Box::new(ScreenshareSignalHandler));

        // Stream keys
        handlers.insert("stream:key:request", Box::new(StreamKeyHandler));

        Self { handlers }
    }

    /// Decode, gate, and dispatch one inbound frame.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, raw: &str) {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                // Malformed frames are logged and dropped without closing.
                debug!(conn_id = ctx.conn_id, error = %e, "malformed frame, ignoring");
                return;
            }
        };

        let cmd = match Command::parse(&frame.event, frame.data) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(conn_id = ctx.conn_id, event = %frame.event, error = %e, "unparseable command");
                let message = match &e {
                    ProtocolError::UnknownCommand { name } => format!("unknown command: {name}"),
                    other => other.to_string(),
                };
                ctx.reply(&Frame::new(
                    error_event_for(&frame.event),
                    event::ErrorEvent::new(hearth_proto::ErrorCode::Validation, message),
                ));
                return;
            }
        };

        let result = self.gate_and_handle(ctx, cmd).await;
        if let Err(err) = result {
            let code = err.code();
            crate::metrics::record_command_error(code.as_str());
            warn!(
                conn_id = ctx.conn_id,
                account_id = ctx.state.account_id.as_deref().unwrap_or("-"),
                command = %frame.event,
                code = code.as_str(),
                reason = %err,
                "command failed"
            );
            ctx.reply(&Frame::new(
                error_event_for(&frame.event),
                event::ErrorEvent::new(code, err.client_message()),
            ));
        }
    }

    async fn gate_and_handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let name = cmd.name();

        if cmd.requires_auth() && ctx.state.account_id.is_none() {
            return Err(HandlerError::AuthRequired);
        }

        // Bans are evaluated at authentication and re-checked here on every
        // authenticated command so a fresh ban bites mid-session.
        if let Some(account_id) = &ctx.state.account_id {
            if self
                .check_banned(ctx.hub, ctx.conn_id, account_id)
                .is_some()
            {
                return Err(HandlerError::PermissionDenied("account is banned".to_string()));
            }
        }

        match self.handlers.get(name) {
            Some(handler) => handler.handle(ctx, cmd).await,
            None => Err(HandlerError::Internal(format!(
                "no handler registered for {name}"
            ))),
        }
    }

    fn check_banned(&self, hub: &Arc<Hub>, conn_id: &str, account_id: &str) -> Option<()> {
        let ban = hub.presence.active_ban(account_id, Hub::now_ms())?;
        warn!(conn_id, account_id, banned_by = %ban.banned_by, "banned account issued a command");
        hub.lifecycle
            .request_disconnect(conn_id, crate::state::managers::lifecycle::DropReason::Banned);
        Some(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Which error event a failed command reports through.
fn error_event_for(command_name: &str) -> &'static str {
    if command_name.starts_with("auth:") {
        event::AUTH_ERROR
    } else if command_name.starts_with("admin:") {
        event::ADMIN_ERROR
    } else if command_name.starts_with("account:") {
        event::ACCOUNT_ERROR
    } else if command_name.starts_with("stream:key") {
        event::STREAM_KEY_ERROR
    } else {
        event::ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_routing() {
        assert_eq!(error_event_for("auth:login"), "auth:error");
        assert_eq!(error_event_for("admin:accounts:list"), "admin:error");
        assert_eq!(error_event_for("account:update"), "account:error");
        assert_eq!(error_event_for("stream:key:request"), "stream:key:error");
        assert_eq!(error_event_for("chat"), "error");
        assert_eq!(error_event_for("voice:join"), "error");
    }

    #[test]
    fn registry_covers_full_alphabet() {
        let registry = Registry::new();
        for name in [
            "auth:register",
            "auth:login",
            "auth:session",
            "auth:logout",
            "account:update",
            "account:get",
            "admin:accounts:list",
            "admin:accounts:updateRoles",
            "admin:accounts:disable",
            "admin:accounts:enable",
            "admin:channels:getPermissions",
            "admin:channels:updatePermissions",
            "channels:create",
            "channels:delete",
            "channels:list",
            "channel:join",
            "chat",
            "chat:delete",
            "chat:history",
            "voice:join",
            "voice:leave",
            "voice:state",
            "voice:signal",
            "voice:kick",
            "voice:timeout",
            "user:ban",
            "screenshare:start",
            "screenshare:stop",
            "screenshare:viewer:join",
            "screenshare:viewer:leave",
            "screenshare:signal",
            "stream:key:request",
        ] {
            assert!(registry.handlers.contains_key(name), "missing {name}");
        }
    }
}
