//! Account self-service handlers.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use serde_json::json;

use crate::error::{HandlerError, HandlerResult};

use super::{Context, Handler};

/// `account:update`
pub struct AccountUpdateHandler;

#[async_trait]
impl Handler for AccountUpdateHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AccountUpdate(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let account_id = ctx
            .state
            .account_id
            .clone()
            .ok_or(HandlerError::AuthRequired)?;

        let (account, password_changed) = ctx.hub.accounts.update(&account_id, params).await?;

        // A password change revoked every session of the account; mint a
        // fresh one so this connection survives its own change.
        let new_session = password_changed.then(|| {
            let session = ctx.hub.accounts.create_session(&account.id);
            ctx.state.session_token = Some(session.token.clone());
            session
        });

        ctx.hub.presence.sync_account(&account);

        let mut payload = json!({ "account": account.to_view() });
        if let Some(session) = new_session {
            payload["session"] = json!(hearth_proto::types::SessionView {
                token: session.token,
                expires_at: session.expires_at,
            });
        }
        ctx.reply(&Frame::new(event::ACCOUNT_UPDATED, payload));
        ctx.hub.broadcast_presence();
        Ok(())
    }
}

/// `account:get`
pub struct AccountGetHandler;

#[async_trait]
impl Handler for AccountGetHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AccountGet = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        let account_id = ctx
            .state
            .account_id
            .clone()
            .ok_or(HandlerError::AuthRequired)?;
        let account = ctx
            .hub
            .accounts
            .by_id(&account_id)
            .ok_or_else(|| HandlerError::NotFound("account".to_string()))?;
        ctx.reply(&Frame::new(
            event::ACCOUNT_DATA,
            json!({ "account": account.to_view() }),
        ));
        Ok(())
    }
}
