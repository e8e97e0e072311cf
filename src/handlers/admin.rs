//! Administration handlers: account management and channel permissions.

use async_trait::async_trait;
use hearth_proto::{Command, Frame, event};
use serde_json::json;
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::state::channel::Permissions;
use crate::state::managers::lifecycle::DropReason;
use crate::state::user::{Capability, may_assign_roles};

use super::{Context, Handler};

fn require_capability(ctx: &Context<'_>, cap: Capability, what: &str) -> HandlerResult {
    if ctx.hub.presence.has_permission(ctx.conn_id, cap) {
        Ok(())
    } else {
        Err(HandlerError::PermissionDenied(what.to_string()))
    }
}

/// `admin:accounts:list`
pub struct AccountsListHandler;

#[async_trait]
impl Handler for AccountsListHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminAccountsList = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(ctx, Capability::ManageUsers, "account management")?;

        let mut accounts = ctx.hub.accounts.list_views();
        for view in &mut accounts {
            view.connections = Some(ctx.hub.presence.connection_count(&view.id));
        }
        ctx.reply(&Frame::new(
            event::ADMIN_ACCOUNTS,
            json!({ "accounts": accounts }),
        ));
        Ok(())
    }
}

/// `admin:accounts:updateRoles`
pub struct UpdateRolesHandler;

#[async_trait]
impl Handler for UpdateRolesHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminUpdateRoles(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(ctx, Capability::AssignRoles, "role assignment")?;

        let target = ctx
            .hub
            .accounts
            .by_id(&params.account_id)
            .ok_or_else(|| HandlerError::NotFound("account".to_string()))?;

        let new_roles: std::collections::BTreeSet<_> = params.roles.into_iter().collect();
        let actor = ctx
            .hub
            .presence
            .by_conn(ctx.conn_id)
            .ok_or_else(|| HandlerError::Internal("caller presence missing".into()))?;
        let allowed = {
            let actor = actor.read();
            may_assign_roles(&actor, target.highest_role_level(), &new_roles)
        };
        if !allowed {
            return Err(HandlerError::PrivilegeEscalation);
        }

        let account = ctx.hub.accounts.assign_roles(&params.account_id, new_roles)?;
        info!(
            account_id = %account.id,
            by = ctx.state.account_id.as_deref().unwrap_or("-"),
            "roles updated"
        );

        ctx.hub.presence.sync_account(&account);
        // Tell the target's live connections their privileges moved.
        let notice = Frame::new(
            event::ACCOUNT_ROLES_UPDATED,
            json!({ "roles": account.roles.iter().copied().collect::<Vec<_>>() }),
        );
        ctx.hub
            .fabric
            .emit_many(&ctx.hub.presence.by_account(&account.id), &notice);

        ctx.reply(&Frame::new(
            event::ADMIN_ROLES_UPDATED,
            json!({ "account": account.to_view() }),
        ));
        ctx.hub.broadcast_presence();
        Ok(())
    }
}

/// `admin:accounts:disable`
pub struct DisableAccountHandler;

#[async_trait]
impl Handler for DisableAccountHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminDisableAccount(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(ctx, Capability::DisableAccounts, "account disable")?;

        let account = ctx
            .hub
            .accounts
            .disable(&params.account_id, params.reason)?;
        info!(
            account_id = %account.id,
            by = ctx.state.account_id.as_deref().unwrap_or("-"),
            "account disabled"
        );

        // Force-disconnect every live connection of the account.
        for conn_id in ctx.hub.presence.by_account(&account.id) {
            ctx.hub
                .lifecycle
                .request_disconnect(&conn_id, DropReason::AccountDisabled);
        }

        ctx.reply(&Frame::new(
            event::ADMIN_ACCOUNT_DISABLED,
            json!({ "accountId": account.id }),
        ));
        Ok(())
    }
}

/// `admin:accounts:enable`
pub struct EnableAccountHandler;

#[async_trait]
impl Handler for EnableAccountHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminEnableAccount(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(ctx, Capability::DisableAccounts, "account enable")?;

        let account = ctx.hub.accounts.enable(&params.account_id)?;
        ctx.reply(&Frame::new(
            event::ADMIN_ACCOUNT_ENABLED,
            json!({ "accountId": account.id }),
        ));
        Ok(())
    }
}

/// `admin:channels:getPermissions`
pub struct GetPermissionsHandler;

#[async_trait]
impl Handler for GetPermissionsHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminGetPermissions(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(
            ctx,
            Capability::ManageChannelPermissions,
            "channel permissions",
        )?;

        let channel = ctx
            .hub
            .channels
            .get(&params.channel_id)
            .ok_or_else(|| HandlerError::NotFound("channel".to_string()))?;
        let permissions = channel.read().permissions.to_view();
        ctx.reply(&Frame::new(
            event::ADMIN_CHANNEL_PERMISSIONS,
            json!({ "channelId": params.channel_id, "permissions": permissions }),
        ));
        Ok(())
    }
}

/// `admin:channels:updatePermissions`
pub struct UpdatePermissionsHandler;

#[async_trait]
impl Handler for UpdatePermissionsHandler {
    async fn handle(&self, ctx: &mut Context<'_>, cmd: Command) -> HandlerResult {
        let Command::AdminUpdatePermissions(params) = cmd else {
            return Err(HandlerError::Internal("wrong command routed".into()));
        };
        require_capability(
            ctx,
            Capability::ManageChannelPermissions,
            "channel permissions",
        )?;

        let channel = ctx
            .hub
            .channels
            .get(&params.channel_id)
            .ok_or_else(|| HandlerError::NotFound("channel".to_string()))?;
        let normalized = Permissions::normalize(&params.permissions, None);
        let view = {
            let mut channel = channel.write();
            channel.permissions = normalized;
            channel.permissions.to_view()
        };
        info!(channel_id = %params.channel_id, "channel permissions updated");

        ctx.reply(&Frame::new(
            event::ADMIN_CHANNEL_PERMISSIONS,
            json!({ "channelId": params.channel_id, "permissions": view }),
        ));
        ctx.hub.broadcast_channels_update();
        Ok(())
    }
}
