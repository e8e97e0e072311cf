//! Voice room handlers: join/leave, mute state, signaling relay, and
//! moderation (kick, timeout, ban).

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::Action;
use crate::state::managers::lifecycle::DropReason;
use crate::state::user::Capability;
use crate::state::Hub;

use super::{Context, Handler};

/// Moderation timeout bounds: one minute to seven days, in seconds.
const TIMEOUT_MIN_SECS: u64 = 60;
const TIMEOUT_MAX_SECS: u64 = 7 * 86400;

/// `voice:join`
pub struct VoiceJoinHandler;

#[async_trait]
impl Handler for VoiceJoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceJoin(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let now = Hub::now_ms();
        if let Some(remaining) = ctx.hub.presence.voice_timeout_remaining(ctx.conn_id, now) {
            return Err(HandlerError::PermissionDenied(format!(
                "voice timeout active for another {}s",
                remaining / 1000
            )));
        }

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (roles, account_id, display_name, previous) = {
            let user = user.read();
            (
                user.roles.clone(),
                user.account_id.clone(),
                user.display_name.clone(),
                user.voice_channel.clone(),
            )
        };

        if !ctx.hub.channels.can_access(
            &params.channel_id,
            &roles,
            account_id.as_deref(),
            Action::Voice,
        )? {
            return Err(HandlerError::PermissionDenied("voice access".to_string()));
        }

        // Leaving the previous voice room first: its peers observe
        // peer-leave before anyone sees us join the new room.
        if let Some(prev) = previous.filter(|prev| *prev != params.channel_id) {
            ctx.hub.fabric.unsubscribe(&prev, ctx.conn_id);
            if ctx.hub.channels.remove_voice(&prev, ctx.conn_id).is_some() {
                ctx.hub.fabric.emit_room(
                    &prev,
                    &Frame::new(event::VOICE_PEER_LEAVE, json!({ "id": ctx.conn_id })),
                );
            }
        }

        let joined = ctx
            .hub
            .channels
            .add_voice(&params.channel_id, ctx.conn_id, &display_name)?;
        if !ctx.hub.fabric.subscribe(&params.channel_id, ctx.conn_id) {
            // Subscription failed: roll the participant insertion back.
            ctx.hub.channels.remove_voice(&params.channel_id, ctx.conn_id);
            return Err(HandlerError::Internal("connection lost during join".into()));
        }
        ctx.hub
            .presence
            .set_voice_channel(ctx.conn_id, Some(params.channel_id.clone()));

        // Prior peers learn about us before our own voice:joined is queued.
        ctx.hub.fabric.emit_room_except(
            &params.channel_id,
            ctx.conn_id,
            &Frame::new(event::VOICE_PEER_JOIN, joined.participant.clone()),
        );
        ctx.reply(&Frame::new(
            event::VOICE_JOINED,
            event::VoiceJoined {
                channel_id: params.channel_id.clone(),
                peers: joined.prior_peers,
                started_at: joined.started_at,
                session_id: joined.session_id,
            },
        ));

        ctx.hub.broadcast_presence();
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}

/// `voice:leave`
pub struct VoiceLeaveHandler;

#[async_trait]
impl Handler for VoiceLeaveHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceLeave = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let channel_id = user
            .read()
            .voice_channel
            .clone()
            .ok_or_else(|| HandlerError::Validation("not in a voice channel".to_string()))?;

        ctx.hub.fabric.unsubscribe(&channel_id, ctx.conn_id);
        if ctx.hub.channels.remove_voice(&channel_id, ctx.conn_id).is_some() {
            ctx.hub.fabric.emit_room(
                &channel_id,
                &Frame::new(event::VOICE_PEER_LEAVE, json!({ "id": ctx.conn_id })),
            );
        }
        ctx.hub.presence.set_voice_channel(ctx.conn_id, None);

        ctx.hub.broadcast_presence();
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}

/// `voice:state` - mute/deafen updates.
pub struct VoiceStateHandler;

#[async_trait]
impl Handler for VoiceStateHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceState(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let channel_id = user
            .read()
            .voice_channel
            .clone()
            .ok_or_else(|| HandlerError::Validation("not in a voice channel".to_string()))?;

        let peer = ctx
            .hub
            .channels
            .update_voice_state(&channel_id, ctx.conn_id, params.muted, params.deafened)
            .ok_or_else(|| HandlerError::NotFound("voice participant".to_string()))?;

        ctx.hub.fabric.emit_room(
            &channel_id,
            &Frame::new(
                event::VOICE_STATE,
                json!({ "id": peer.id, "muted": peer.muted, "deafened": peer.deafened }),
            ),
        );
        Ok(())
    }
}

/// `voice:signal` - opaque WebRTC signaling relay.
///
/// Pure forwarding: the payload is never inspected and nothing here awaits
/// anything besides the enqueue. Cross-channel signals are dropped
/// silently (logged, no error event).
pub struct VoiceSignalHandler;

#[async_trait]
impl Handler for VoiceSignalHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceSignal(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let sender_channel = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .and_then(|user| user.read().voice_channel.clone());
        let target_channel = ctx
            .hub
            .presence
            .by_conn(&params.to)
            .and_then(|user| user.read().voice_channel.clone());

        match (sender_channel, target_channel) {
            (Some(ours), Some(theirs)) if ours == theirs => {
                ctx.hub.fabric.emit_conn(
                    &params.to,
                    &Frame::new(
                        event::VOICE_SIGNAL,
                        event::SignalRelay {
                            from: ctx.conn_id.to_string(),
                            data: params.data,
                            channel_id: None,
                        },
                    ),
                );
            }
            _ => {
                debug!(
                    conn_id = ctx.conn_id,
                    target = %params.to,
                    "dropping cross-channel voice signal"
                );
            }
        }
        Ok(())
    }
}

/// Shared moderation precondition: the caller moderates a voice peer in
/// their own channel. Returns `(target_channel, caller_name)`.
fn moderation_target(
    ctx: &Context<'_>,
    target_conn_id: &str,
) -> Result<(String, String), HandlerError> {
    if !ctx
        .hub
        .presence
        .has_permission(ctx.conn_id, Capability::Moderate)
    {
        return Err(HandlerError::PermissionDenied("moderation".to_string()));
    }
    if target_conn_id == ctx.conn_id {
        return Err(HandlerError::Validation("cannot target yourself".to_string()));
    }

    let caller = ctx
        .hub
        .presence
        .by_conn(ctx.conn_id)
        .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
    let target = ctx
        .hub
        .presence
        .by_conn(target_conn_id)
        .ok_or_else(|| HandlerError::NotFound("target connection".to_string()))?;

    let (caller_channel, caller_level, caller_super, caller_name) = {
        let caller = caller.read();
        (
            caller.voice_channel.clone(),
            caller.highest_role_level(),
            caller.is_superuser(),
            caller.display_name.clone(),
        )
    };
    let (target_channel, target_level) = {
        let target = target.read();
        (target.voice_channel.clone(), target.highest_role_level())
    };

    let channel = match (caller_channel, target_channel) {
        (Some(ours), Some(theirs)) if ours == theirs => ours,
        _ => {
            return Err(HandlerError::Validation(
                "target is not in your voice channel".to_string(),
            ));
        }
    };
    if !caller_super && target_level >= caller_level {
        return Err(HandlerError::PermissionDenied(
            "cannot moderate an equal or higher role".to_string(),
        ));
    }
    Ok((channel, caller_name))
}

/// Remove a moderated connection from its voice room and notify everyone.
fn eject_from_voice(ctx: &Context<'_>, channel_id: &str, target_conn_id: &str, notice: Frame) {
    ctx.hub.fabric.emit_conn(target_conn_id, &notice);
    ctx.hub.fabric.unsubscribe(channel_id, target_conn_id);
    if ctx
        .hub
        .channels
        .remove_voice(channel_id, target_conn_id)
        .is_some()
    {
        ctx.hub.fabric.emit_room(
            channel_id,
            &Frame::new(event::VOICE_PEER_LEAVE, json!({ "id": target_conn_id })),
        );
    }
    ctx.hub.presence.set_voice_channel(target_conn_id, None);
    ctx.hub.broadcast_presence();
    ctx.hub.broadcast_channels_update();
}

/// `voice:kick`
pub struct VoiceKickHandler;

#[async_trait]
impl Handler for VoiceKickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceKick(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let (channel_id, caller_name) = moderation_target(ctx, &params.target_conn_id)?;
        info!(
            target = %params.target_conn_id,
            channel_id = %channel_id,
            by = %caller_name,
            "voice kick"
        );

        let notice = Frame::new(
            event::VOICE_KICKED,
            event::ModerationNotice {
                by: caller_name,
                duration: None,
                reason: params.reason,
            },
        );
        eject_from_voice(ctx, &channel_id, &params.target_conn_id, notice);
        Ok(())
    }
}

/// `voice:timeout` - kick plus a re-join lockout.
pub struct VoiceTimeoutHandler;

#[async_trait]
impl Handler for VoiceTimeoutHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::VoiceTimeout(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let (channel_id, caller_name) = moderation_target(ctx, &params.target_conn_id)?;

        let duration_secs = params.duration.clamp(TIMEOUT_MIN_SECS, TIMEOUT_MAX_SECS);
        let deadline = Hub::now_ms() + (duration_secs as i64) * 1000;
        ctx.hub
            .presence
            .set_voice_timeout(&params.target_conn_id, deadline);
        info!(
            target = %params.target_conn_id,
            channel_id = %channel_id,
            by = %caller_name,
            duration_secs,
            "voice timeout"
        );

        let notice = Frame::new(
            event::VOICE_TIMEOUT,
            event::ModerationNotice {
                by: caller_name,
                duration: Some(duration_secs),
                reason: params.reason,
            },
        );
        eject_from_voice(ctx, &channel_id, &params.target_conn_id, notice);
        Ok(())
    }
}

/// `user:ban` - account-level ban plus forced disconnect of every
/// connection of that account.
pub struct BanUserHandler;

#[async_trait]
impl Handler for BanUserHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::UserBan(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if !ctx
            .hub
            .presence
            .has_permission(ctx.conn_id, Capability::BanUsers)
        {
            return Err(HandlerError::PermissionDenied("bans".to_string()));
        }
        if params.target_conn_id == ctx.conn_id {
            return Err(HandlerError::Validation("cannot target yourself".to_string()));
        }

        let target = ctx
            .hub
            .presence
            .by_conn(&params.target_conn_id)
            .ok_or_else(|| HandlerError::NotFound("target connection".to_string()))?;
        let (target_account, target_level) = {
            let target = target.read();
            (target.account_id.clone(), target.highest_role_level())
        };
        let target_account = target_account
            .ok_or_else(|| HandlerError::Validation("target is not authenticated".to_string()))?;

        let caller = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (caller_level, caller_super, caller_name) = {
            let caller = caller.read();
            (
                caller.highest_role_level(),
                caller.is_superuser(),
                caller.display_name.clone(),
            )
        };

        // Admins and superusers are unbannable; moderators are bannable by
        // admin and above only.
        use hearth_proto::Role;
        if target_level >= Role::Admin.level() {
            return Err(HandlerError::PermissionDenied(
                "cannot ban an admin".to_string(),
            ));
        }
        if target_level >= Role::Moderator.level()
            && !caller_super
            && caller_level < Role::Admin.level()
        {
            return Err(HandlerError::PermissionDenied(
                "only admins may ban moderators".to_string(),
            ));
        }

        ctx.hub.presence.ban(
            &target_account,
            params.reason.clone(),
            &caller_name,
            Hub::now_ms(),
            None,
        );
        warn!(
            target_account = %target_account,
            by = %caller_name,
            reason = params.reason.as_deref().unwrap_or("-"),
            "account banned"
        );

        let notice = Frame::new(
            event::USER_BANNED,
            event::ModerationNotice {
                by: caller_name,
                duration: None,
                reason: params.reason,
            },
        );
        let connections = ctx.hub.presence.by_account(&target_account);
        ctx.hub.fabric.emit_many(&connections, &notice);
        for conn_id in connections {
            ctx.hub
                .lifecycle
                .request_disconnect(&conn_id, DropReason::Banned);
        }
        Ok(())
    }
}
