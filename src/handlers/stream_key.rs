//! Stream key retrieval.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::Action;
use crate::state::user::Capability;

use super::{Context, Handler};

/// `stream:key:request` - hand the publishable `{channel}+{token}` key to a
/// caller who may stream to that channel (or may view all keys).
pub struct StreamKeyHandler;

#[async_trait]
impl Handler for StreamKeyHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::StreamKeyRequest(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let channel_id = match (params.channel_id, params.channel_name) {
            (Some(id), _) => id,
            (None, Some(name)) => ctx
                .hub
                .channels
                .resolve_name(&name)
                .ok_or_else(|| HandlerError::NotFound("channel".to_string()))?,
            (None, None) => {
                return Err(HandlerError::Validation(
                    "channelId or channelName required".to_string(),
                ));
            }
        };

        let allowed = if ctx
            .hub
            .presence
            .has_permission(ctx.conn_id, Capability::ViewAllKeys)
        {
            true
        } else {
            let user = ctx
                .hub
                .presence
                .by_conn(ctx.conn_id)
                .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
            let (roles, account_id) = {
                let user = user.read();
                (user.roles.clone(), user.account_id.clone())
            };
            ctx.hub
                .channels
                .can_access(&channel_id, &roles, account_id.as_deref(), Action::Stream)?
        };
        if !allowed {
            return Err(HandlerError::PermissionDenied("stream keys".to_string()));
        }

        let (channel_name, stream_key) = ctx.hub.channels.stream_key(&channel_id)?;
        ctx.reply(&Frame::new(
            event::STREAM_KEY_RESPONSE,
            event::StreamKeyResponse {
                channel_id,
                channel_name,
                stream_key,
            },
        ));
        Ok(())
    }
}
