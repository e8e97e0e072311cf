//! Channel CRUD and room join handlers.

use async_trait::async_trait;
use hearth_proto::types::ChannelKind;
use hearth_proto::{Command, Frame, event};
use serde_json::json;
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::{Action, Permissions};
use crate::state::user::Capability;

use super::{Context, Handler};

/// `channels:create`
pub struct CreateChannelHandler;

#[async_trait]
impl Handler for CreateChannelHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChannelCreate(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if !ctx
            .hub
            .presence
            .has_permission(ctx.conn_id, Capability::CreateChannels)
        {
            return Err(HandlerError::PermissionDenied("channel creation".to_string()));
        }

        let kind = match params.kind.as_deref() {
            None => ChannelKind::Text,
            Some(raw) => ChannelKind::parse(raw)
                .ok_or_else(|| HandlerError::Validation(format!("unknown channel type: {raw}")))?,
        };
        let permissions = match &params.permissions {
            Some(input) => Permissions::normalize(input, params.allowed_streamers.as_deref()),
            None => match params.allowed_streamers.as_deref() {
                Some(streamers) => {
                    Permissions::normalize(&Default::default(), Some(streamers))
                }
                None => Permissions::defaults(),
            },
        };

        ctx.hub
            .channels
            .create(&params.name, kind, params.group_id, permissions)?;
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}

/// `channels:delete`
pub struct DeleteChannelHandler;

#[async_trait]
impl Handler for DeleteChannelHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChannelDelete(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if !ctx
            .hub
            .presence
            .has_permission(ctx.conn_id, Capability::DeleteChannels)
        {
            return Err(HandlerError::PermissionDenied("channel deletion".to_string()));
        }

        let (members, voice_participants) = ctx.hub.channels.delete(&params.channel_id)?;
        info!(
            channel_id = %params.channel_id,
            ejected = members.len() + voice_participants.len(),
            "channel deleted, ejecting occupants"
        );

        // Everyone inside observes the deletion before losing the room.
        let deleted = Frame::new(
            event::CHANNEL_DELETED,
            json!({ "channelId": params.channel_id }),
        );
        ctx.hub.fabric.emit_many(&members, &deleted);
        ctx.hub.fabric.emit_many(&voice_participants, &deleted);

        for conn_id in members.iter().chain(voice_participants.iter()) {
            ctx.hub.presence.clear_channel_refs(conn_id, &params.channel_id);
        }
        ctx.hub.fabric.drop_room(&params.channel_id);
        ctx.hub.history.drop_channel(&params.channel_id);

        ctx.hub.broadcast_presence();
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}

/// `channels:list`
pub struct ListChannelsHandler;

#[async_trait]
impl Handler for ListChannelsHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChannelList = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        ctx.reply(&ctx.hub.channels_update_frame());
        Ok(())
    }
}

/// `channel:join` - the text/stream/screenshare room slot.
pub struct ChannelJoinHandler;

#[async_trait]
impl Handler for ChannelJoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChannelJoin(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let channel = ctx
            .hub
            .channels
            .get(&params.channel_id)
            .ok_or_else(|| HandlerError::NotFound("channel".to_string()))?;
        let (channel_name, channel_kind) = {
            let channel = channel.read();
            (channel.name.clone(), channel.kind)
        };
        if matches!(channel_kind, ChannelKind::Voice) {
            return Err(HandlerError::Validation(
                "voice channels are joined with voice:join".to_string(),
            ));
        }

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (roles, account_id, previous, hosting, viewing) = {
            let user = user.read();
            (
                user.roles.clone(),
                user.account_id.clone(),
                user.current_channel.clone(),
                user.screenshare_host_of.clone(),
                user.screenshare_viewer_of.clone(),
            )
        };

        if !ctx.hub.channels.can_access(
            &params.channel_id,
            &roles,
            account_id.as_deref(),
            Action::View,
        )? {
            return Err(HandlerError::PermissionDenied("channel access".to_string()));
        }

        // Leave the previous room unless it is the same one (re-join is
        // idempotent and just re-emits the snapshot). A departing host's
        // screenshare cannot outlive their membership.
        if let Some(prev) = previous.filter(|prev| *prev != params.channel_id) {
            if hosting.as_deref() == Some(prev.as_str())
                && ctx.hub.channels.stop_screenshare(&prev, ctx.conn_id).is_ok()
            {
                ctx.hub.presence.set_screenshare_host(ctx.conn_id, None);
                if let Some(channel) = ctx.hub.channels.get(&prev) {
                    let view = channel.read().screenshare_view();
                    ctx.hub
                        .fabric
                        .emit_room(&prev, &Frame::new(event::SCREENSHARE_SESSION, view));
                }
            }
            if viewing.as_deref() == Some(prev.as_str())
                && ctx
                    .hub
                    .channels
                    .screenshare_viewer_leave(&prev, ctx.conn_id)
                    .is_some()
            {
                ctx.hub.presence.set_screenshare_viewer(ctx.conn_id, None);
                if let Some(channel) = ctx.hub.channels.get(&prev) {
                    let view = channel.read().screenshare_view();
                    ctx.hub
                        .fabric
                        .emit_room(&prev, &Frame::new(event::SCREENSHARE_SESSION, view));
                }
            }
            ctx.hub.channels.remove_member(&prev, ctx.conn_id);
            ctx.hub.fabric.unsubscribe(&prev, ctx.conn_id);
        }

        ctx.hub.channels.add_member(&params.channel_id, ctx.conn_id)?;
        if !ctx.hub.fabric.subscribe(&params.channel_id, ctx.conn_id) {
            ctx.hub.channels.remove_member(&params.channel_id, ctx.conn_id);
            return Err(HandlerError::Internal("connection lost during join".into()));
        }
        ctx.hub
            .presence
            .set_current_channel(ctx.conn_id, Some(params.channel_id.clone()));

        ctx.reply(&Frame::new(
            event::CHANNEL_JOINED,
            event::ChannelJoined {
                channel_id: params.channel_id.clone(),
                channel_name,
                channel_type: channel_kind,
            },
        ));
        ctx.reply(&Frame::new(
            event::CHAT_HISTORY,
            ctx.hub.history.history(&params.channel_id, None),
        ));
        if matches!(channel_kind, ChannelKind::Screenshare) {
            let view = channel.read().screenshare_view();
            ctx.reply(&Frame::new(event::SCREENSHARE_SESSION, view));
        }

        ctx.hub.broadcast_presence();
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}
