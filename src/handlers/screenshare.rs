//! Screenshare handlers: host lifecycle, viewer set, signaling relay.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::Action;

use super::{Context, Handler};

fn emit_session_update(ctx: &Context<'_>, channel_id: &str) {
    if let Some(channel) = ctx.hub.channels.get(channel_id) {
        let view = channel.read().screenshare_view();
        ctx.hub
            .fabric
            .emit_room(channel_id, &Frame::new(event::SCREENSHARE_SESSION, view));
    }
}

/// `screenshare:start`
pub struct StartScreenshareHandler;

#[async_trait]
impl Handler for StartScreenshareHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ScreenshareStart(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (roles, account_id, display_name, current_channel, hosting) = {
            let user = user.read();
            (
                user.roles.clone(),
                user.account_id.clone(),
                user.display_name.clone(),
                user.current_channel.clone(),
                user.screenshare_host_of.clone(),
            )
        };

        // Hosting requires room membership (the host must be a member) and
        // at most one hosted session per connection.
        if current_channel.as_deref() != Some(params.channel_id.as_str()) {
            return Err(HandlerError::Validation(
                "join the channel before sharing".to_string(),
            ));
        }
        if let Some(existing) = hosting {
            if existing != params.channel_id {
                return Err(HandlerError::Validation(
                    "already hosting a screenshare elsewhere".to_string(),
                ));
            }
        }
        if !ctx.hub.channels.can_access(
            &params.channel_id,
            &roles,
            account_id.as_deref(),
            Action::Stream,
        )? {
            return Err(HandlerError::PermissionDenied("screenshare".to_string()));
        }

        ctx.hub
            .channels
            .start_screenshare(&params.channel_id, ctx.conn_id, &display_name)?;
        ctx.hub
            .presence
            .set_screenshare_host(ctx.conn_id, Some(params.channel_id.clone()));

        emit_session_update(ctx, &params.channel_id);
        Ok(())
    }
}

/// `screenshare:stop`
pub struct StopScreenshareHandler;

#[async_trait]
impl Handler for StopScreenshareHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ScreenshareStop(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        ctx.hub
            .channels
            .stop_screenshare(&params.channel_id, ctx.conn_id)?;
        ctx.hub.presence.set_screenshare_host(ctx.conn_id, None);

        emit_session_update(ctx, &params.channel_id);
        Ok(())
    }
}

/// `screenshare:viewer:join`
pub struct ViewerJoinHandler;

#[async_trait]
impl Handler for ViewerJoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ScreenshareViewerJoin(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (roles, account_id, viewer_name) = {
            let user = user.read();
            (
                user.roles.clone(),
                user.account_id.clone(),
                user.display_name.clone(),
            )
        };
        if !ctx.hub.channels.can_access(
            &params.channel_id,
            &roles,
            account_id.as_deref(),
            Action::View,
        )? {
            return Err(HandlerError::PermissionDenied("screenshare viewing".to_string()));
        }

        ctx.hub
            .channels
            .screenshare_viewer_join(&params.channel_id, ctx.conn_id)?;
        ctx.hub
            .presence
            .set_screenshare_viewer(ctx.conn_id, Some(params.channel_id.clone()));

        // The host approves and initiates signaling toward the viewer.
        let host = ctx
            .hub
            .channels
            .get(&params.channel_id)
            .and_then(|channel| {
                channel
                    .read()
                    .screenshare
                    .as_ref()
                    .map(|s| s.host_conn_id.clone())
            });
        if let Some(host_conn) = host {
            ctx.hub.fabric.emit_conn(
                &host_conn,
                &Frame::new(
                    event::SCREENSHARE_VIEWER_PENDING,
                    serde_json::json!({
                        "channelId": params.channel_id,
                        "viewerId": ctx.conn_id,
                        "viewerName": viewer_name,
                    }),
                ),
            );
        }

        emit_session_update(ctx, &params.channel_id);
        Ok(())
    }
}

/// `screenshare:viewer:leave`
pub struct ViewerLeaveHandler;

#[async_trait]
impl Handler for ViewerLeaveHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ScreenshareViewerLeave(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        if ctx
            .hub
            .channels
            .screenshare_viewer_leave(&params.channel_id, ctx.conn_id)
            .is_some()
        {
            emit_session_update(ctx, &params.channel_id);
        }
        ctx.hub.presence.set_screenshare_viewer(ctx.conn_id, None);
        Ok(())
    }
}

/// `screenshare:signal` - opaque relay between the host and a viewer of the
/// same screenshare session. Mismatched targets are dropped silently.
pub struct ScreenshareSignalHandler;

#[async_trait]
impl Handler for ScreenshareSignalHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ScreenshareSignal(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let session_of = |conn_id: &str| -> Option<String> {
            let user = ctx.hub.presence.by_conn(conn_id)?;
            let user = user.read();
            user.screenshare_host_of
                .clone()
                .or_else(|| user.screenshare_viewer_of.clone())
        };

        match (session_of(ctx.conn_id), session_of(&params.to)) {
            (Some(ours), Some(theirs)) if ours == theirs => {
                ctx.hub.fabric.emit_conn(
                    &params.to,
                    &Frame::new(
                        event::SCREENSHARE_SIGNAL,
                        event::SignalRelay {
                            from: ctx.conn_id.to_string(),
                            data: params.data,
                            channel_id: Some(ours),
                        },
                    ),
                );
            }
            _ => {
                debug!(
                    conn_id = ctx.conn_id,
                    target = %params.to,
                    "dropping cross-session screenshare signal"
                );
            }
        }
        Ok(())
    }
}
