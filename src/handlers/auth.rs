//! Authentication handlers: register, login, session resume, logout.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::state::account::Account;
use crate::state::session::Session;
use crate::state::Hub;

use super::{Context, Handler};

/// Build the `auth:success` payload for a freshly bound connection.
fn auth_success_frame(
    ctx: &Context<'_>,
    account: &Account,
    session: &Session,
    is_new_account: bool,
    resumed: bool,
) -> Frame {
    let user = ctx
        .hub
        .presence
        .by_conn(ctx.conn_id)
        .map(|user| user.read().to_view())
        .unwrap_or_else(|| {
            // The connection raced its own teardown; the frame goes nowhere.
            hearth_proto::types::UserView {
                id: ctx.conn_id.to_string(),
                account_id: Some(account.id.clone()),
                name: account.display_name.clone(),
                roles: account.roles.iter().copied().collect(),
                current_channel: None,
                voice_channel: None,
            }
        });
    Frame::new(
        event::AUTH_SUCCESS,
        event::AuthSuccess {
            user,
            account: account.to_view(),
            session: hearth_proto::types::SessionView {
                token: session.token.clone(),
                expires_at: session.expires_at,
            },
            channels: ctx.hub.channels.views(),
            groups: ctx.hub.channels.group_views(),
            is_new_account,
            resumed,
        },
    )
}

/// Bind an authenticated account to the connection and announce it.
fn bind_account(ctx: &mut Context<'_>, account: &Account, session: &Session) {
    ctx.hub.presence.attach_account(ctx.conn_id, account);
    ctx.state.account_id = Some(account.id.clone());
    ctx.state.session_token = Some(session.token.clone());
    ctx.hub.broadcast_presence();
}

fn check_not_banned(ctx: &Context<'_>, account: &Account) -> HandlerResult {
    if let Some(ban) = ctx.hub.presence.active_ban(&account.id, Hub::now_ms()) {
        return Err(HandlerError::AccountDisabled {
            reason: ban.reason.clone().or_else(|| Some("banned".to_string())),
        });
    }
    Ok(())
}

/// `auth:register`
pub struct RegisterHandler;

#[async_trait]
impl Handler for RegisterHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::Register(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if ctx.state.account_id.is_some() {
            return Err(HandlerError::AlreadyAuthenticated);
        }
        if !ctx
            .hub
            .security
            .rate_limiter
            .check_register(ctx.remote_ip)
        {
            return Err(HandlerError::RateLimited);
        }

        let account = ctx
            .hub
            .accounts
            .register(&params.username, &params.password, params.profile)
            .await?;
        let session = ctx.hub.accounts.create_session(&account.id);
        info!(conn_id = ctx.conn_id, account_id = %account.id, "account registered");

        bind_account(ctx, &account, &session);
        ctx.reply(&auth_success_frame(ctx, &account, &session, true, false));
        Ok(())
    }
}

/// `auth:login`
pub struct LoginHandler;

#[async_trait]
impl Handler for LoginHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::Login(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        if ctx.state.account_id.is_some() {
            return Err(HandlerError::AlreadyAuthenticated);
        }
        if !ctx.hub.security.rate_limiter.check_login(ctx.remote_ip) {
            return Err(HandlerError::RateLimited);
        }

        let account = ctx
            .hub
            .accounts
            .authenticate(&params.username, &params.password)
            .await?;
        check_not_banned(ctx, &account)?;

        let session = ctx.hub.accounts.create_session(&account.id);
        info!(conn_id = ctx.conn_id, account_id = %account.id, "login");

        bind_account(ctx, &account, &session);
        ctx.reply(&auth_success_frame(ctx, &account, &session, false, false));
        Ok(())
    }
}

/// `auth:session` - resume with a bearer token.
pub struct ResumeHandler;

#[async_trait]
impl Handler for ResumeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::Resume(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        let session = ctx
            .hub
            .accounts
            .touch_session(&params.token)
            .ok_or(HandlerError::SessionExpired)?;
        let account = ctx
            .hub
            .accounts
            .by_id(&session.account_id)
            .ok_or_else(|| HandlerError::NotFound("account".to_string()))?;

        // A connection authenticates at most once. Resuming the same
        // account is idempotent; switching accounts requires a logout.
        if let Some(bound) = &ctx.state.account_id {
            if *bound == account.id {
                ctx.reply(&auth_success_frame(ctx, &account, &session, false, true));
                return Ok(());
            }
            return Err(HandlerError::AlreadyAuthenticated);
        }

        if !account.is_active() {
            return Err(HandlerError::AccountDisabled {
                reason: account.disabled_reason.clone(),
            });
        }
        check_not_banned(ctx, &account)?;

        info!(conn_id = ctx.conn_id, account_id = %account.id, "session resumed");
        bind_account(ctx, &account, &session);
        ctx.reply(&auth_success_frame(ctx, &account, &session, false, true));
        Ok(())
    }
}

/// `auth:logout`
pub struct LogoutHandler;

#[async_trait]
impl Handler for LogoutHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::Logout = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };

        if let Some(token) = ctx.state.session_token.take() {
            ctx.hub.accounts.revoke_session(&token);
        }
        ctx.hub.vacate_rooms(ctx.conn_id);
        ctx.hub.presence.detach_account(ctx.conn_id);
        ctx.state.account_id = None;

        ctx.reply(&Frame::bare(event::AUTH_LOGGED_OUT));
        ctx.hub.broadcast_presence();
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}
