//! Chat handlers: send, delete, history.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::Action;
use crate::state::message::ChatMessage;
use crate::state::user::Capability;
use crate::state::Hub;
use crate::util::{id::new_id, validate};

use super::{Context, Handler};

/// `chat`
pub struct ChatHandler;

#[async_trait]
impl Handler for ChatHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::Chat(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let (channel_id, display_name, roles, account_id, is_superuser) = {
            let user = user.read();
            (
                user.current_channel
                    .clone()
                    .ok_or_else(|| HandlerError::Validation("join a channel first".to_string()))?,
                user.display_name.clone(),
                user.roles.clone(),
                user.account_id.clone(),
                user.is_superuser(),
            )
        };

        let text = validate::chat_text(&params.text, ctx.hub.config.limits.max_message_length)
            .map_err(|reason| {
                if reason.contains("exceeds") {
                    HandlerError::Capacity(reason)
                } else {
                    HandlerError::Validation(reason)
                }
            })?;

        if !ctx
            .hub
            .channels
            .can_access(&channel_id, &roles, account_id.as_deref(), Action::Chat)?
        {
            return Err(HandlerError::PermissionDenied("chat".to_string()));
        }

        let msg = ChatMessage {
            id: new_id(),
            channel_id: channel_id.clone(),
            from_conn_id: ctx.conn_id.to_string(),
            from_name: display_name,
            text,
            ts: Hub::now_ms(),
            roles,
            is_superuser,
            edited: false,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
        };
        let view = msg.to_view();
        ctx.hub.history.append(msg);
        ctx.hub.stats.message_accepted();
        crate::metrics::MESSAGES_SENT.inc();

        ctx.hub
            .fabric
            .emit_room(&channel_id, &Frame::new(event::CHAT, view));
        Ok(())
    }
}

/// `chat:delete`
pub struct ChatDeleteHandler;

#[async_trait]
impl Handler for ChatDeleteHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChatDelete(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if !ctx
            .hub
            .presence
            .has_permission(ctx.conn_id, Capability::DeleteAnyMessage)
        {
            return Err(HandlerError::PermissionDenied("message deletion".to_string()));
        }

        let deleted_by = ctx.display_name();
        if !ctx.hub.history.delete(
            &params.channel_id,
            &params.message_id,
            &deleted_by,
            Hub::now_ms(),
        ) {
            return Err(HandlerError::NotFound("message".to_string()));
        }
        info!(
            channel_id = %params.channel_id,
            message_id = %params.message_id,
            by = %deleted_by,
            "message deleted"
        );

        ctx.hub.fabric.emit_room(
            &params.channel_id,
            &Frame::new(
                event::CHAT_MESSAGE_DELETED,
                event::MessageDeleted {
                    message_id: params.message_id,
                    channel_id: params.channel_id.clone(),
                    deleted_by,
                },
            ),
        );
        Ok(())
    }
}

/// `chat:history` - re-request the current room's history.
pub struct ChatHistoryHandler;

#[async_trait]
impl Handler for ChatHistoryHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::ChatHistory(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let user = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let channel_id = user
            .read()
            .current_channel
            .clone()
            .ok_or_else(|| HandlerError::Validation("join a channel first".to_string()))?;

        ctx.reply(&Frame::new(
            event::CHAT_HISTORY,
            ctx.hub.history.history(&channel_id, params.limit),
        ));
        Ok(())
    }
}
