//! Inbound command alphabet.
//!
//! A command is a frame whose event name matches one of the names below.
//! Parsing is two-stage: the name selects the variant, then the payload is
//! deserialized into that variant's params. Unknown names and bad payloads
//! are distinct errors so the server can answer with a precise reason.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{PermissionsView, Role};

/// `auth:register` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub profile: Option<ProfileParams>,
}

/// Optional profile block accepted at registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileParams {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// `auth:login` params.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
}

/// `auth:session` params (resume with a bearer token).
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeParams {
    pub token: String,
}

/// `account:update` params. All fields optional; a password change requires
/// `current_password` alongside `new_password`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdateParams {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

/// `admin:accounts:updateRoles` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolesParams {
    pub account_id: String,
    pub roles: Vec<Role>,
}

/// `admin:accounts:disable` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableAccountParams {
    pub account_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `admin:accounts:enable` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableAccountParams {
    pub account_id: String,
}

/// Params carrying just a channel id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdParams {
    pub channel_id: String,
}

/// `admin:channels:updatePermissions` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePermissionsParams {
    pub channel_id: String,
    pub permissions: PermissionsView,
}

/// `channels:create` params.
///
/// Legacy clients send a bare string, which means a text channel with that
/// name; see [`Command::parse`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCreateParams {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub permissions: Option<PermissionsView>,
    /// Legacy: explicit streamer account grants, folded into
    /// `permissions.stream.accounts` during normalization.
    #[serde(default)]
    pub allowed_streamers: Option<Vec<String>>,
}

/// `voice:state` params.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateParams {
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub deafened: bool,
}

/// `voice:signal` / `screenshare:signal` params. `data` is opaque.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalParams {
    pub to: String,
    pub data: Value,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Params targeting another connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetParams {
    pub target_conn_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `voice:timeout` params; duration in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutParams {
    pub target_conn_id: String,
    pub duration: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `chat` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatParams {
    pub text: String,
}

/// `chat:delete` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleteParams {
    pub message_id: String,
    pub channel_id: String,
}

/// `chat:history` params.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `stream:key:request` params: by id or by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKeyParams {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
}

/// Every command a client may issue.
#[derive(Debug, Clone)]
pub enum Command {
    Register(RegisterParams),
    Login(LoginParams),
    Resume(ResumeParams),
    Logout,
    AccountUpdate(AccountUpdateParams),
    AccountGet,
    AdminAccountsList,
    AdminUpdateRoles(UpdateRolesParams),
    AdminDisableAccount(DisableAccountParams),
    AdminEnableAccount(EnableAccountParams),
    AdminGetPermissions(ChannelIdParams),
    AdminUpdatePermissions(UpdatePermissionsParams),
    ChannelCreate(ChannelCreateParams),
    ChannelDelete(ChannelIdParams),
    ChannelList,
    ChannelJoin(ChannelIdParams),
    ChatHistory(HistoryParams),
    VoiceJoin(ChannelIdParams),
    VoiceLeave,
    VoiceState(VoiceStateParams),
    VoiceSignal(SignalParams),
    VoiceKick(TargetParams),
    VoiceTimeout(TimeoutParams),
    UserBan(TargetParams),
    ScreenshareStart(ChannelIdParams),
    ScreenshareStop(ChannelIdParams),
    ScreenshareViewerJoin(ChannelIdParams),
    ScreenshareViewerLeave(ChannelIdParams),
    ScreenshareSignal(SignalParams),
    Chat(ChatParams),
    ChatDelete(ChatDeleteParams),
    StreamKeyRequest(StreamKeyParams),
}

fn payload<T: serde::de::DeserializeOwned>(name: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        command: name.to_string(),
        reason: e.to_string(),
    })
}

impl Command {
    /// Parse a command from a frame's event name and payload.
    pub fn parse(name: &str, data: Value) -> Result<Self, ProtocolError> {
        match name {
            "auth:register" => Ok(Self::Register(payload(name, data)?)),
            "auth:login" => Ok(Self::Login(payload(name, data)?)),
            "auth:session" => Ok(Self::Resume(payload(name, data)?)),
            "auth:logout" => Ok(Self::Logout),
            "account:update" => Ok(Self::AccountUpdate(payload(name, data)?)),
            "account:get" => Ok(Self::AccountGet),
            "admin:accounts:list" => Ok(Self::AdminAccountsList),
            "admin:accounts:updateRoles" => Ok(Self::AdminUpdateRoles(payload(name, data)?)),
            "admin:accounts:disable" => Ok(Self::AdminDisableAccount(payload(name, data)?)),
            "admin:accounts:enable" => Ok(Self::AdminEnableAccount(payload(name, data)?)),
            "admin:channels:getPermissions" => Ok(Self::AdminGetPermissions(payload(name, data)?)),
            "admin:channels:updatePermissions" => {
                Ok(Self::AdminUpdatePermissions(payload(name, data)?))
            }
            "channels:create" => match data {
                // Legacy shorthand: a bare string names a text channel.
                Value::String(channel_name) => Ok(Self::ChannelCreate(ChannelCreateParams {
                    name: channel_name,
                    kind: None,
                    group_id: None,
                    permissions: None,
                    allowed_streamers: None,
                })),
                other => Ok(Self::ChannelCreate(payload(name, other)?)),
            },
            "channels:delete" => Ok(Self::ChannelDelete(payload(name, data)?)),
            "channels:list" => Ok(Self::ChannelList),
            "channel:join" => Ok(Self::ChannelJoin(payload(name, data)?)),
            "chat:history" => Ok(Self::ChatHistory(if data.is_null() {
                HistoryParams::default()
            } else {
                payload(name, data)?
            })),
            "voice:join" => Ok(Self::VoiceJoin(payload(name, data)?)),
            "voice:leave" => Ok(Self::VoiceLeave),
            "voice:state" => Ok(Self::VoiceState(payload(name, data)?)),
            "voice:signal" => Ok(Self::VoiceSignal(payload(name, data)?)),
            "voice:kick" => Ok(Self::VoiceKick(payload(name, data)?)),
            "voice:timeout" => Ok(Self::VoiceTimeout(payload(name, data)?)),
            "user:ban" => Ok(Self::UserBan(payload(name, data)?)),
            "screenshare:start" => Ok(Self::ScreenshareStart(payload(name, data)?)),
            "screenshare:stop" => Ok(Self::ScreenshareStop(payload(name, data)?)),
            "screenshare:viewer:join" => Ok(Self::ScreenshareViewerJoin(payload(name, data)?)),
            "screenshare:viewer:leave" => Ok(Self::ScreenshareViewerLeave(payload(name, data)?)),
            "screenshare:signal" => Ok(Self::ScreenshareSignal(payload(name, data)?)),
            "chat" => Ok(Self::Chat(payload(name, data)?)),
            "chat:delete" => Ok(Self::ChatDelete(payload(name, data)?)),
            "stream:key:request" => Ok(Self::StreamKeyRequest(if data.is_null() {
                StreamKeyParams::default()
            } else {
                payload(name, data)?
            })),
            _ => Err(ProtocolError::UnknownCommand {
                name: name.to_string(),
            }),
        }
    }

    /// The wire name of this command (for logging and metrics labels).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "auth:register",
            Self::Login(_) => "auth:login",
            Self::Resume(_) => "auth:session",
            Self::Logout => "auth:logout",
            Self::AccountUpdate(_) => "account:update",
            Self::AccountGet => "account:get",
            Self::AdminAccountsList => "admin:accounts:list",
            Self::AdminUpdateRoles(_) => "admin:accounts:updateRoles",
            Self::AdminDisableAccount(_) => "admin:accounts:disable",
            Self::AdminEnableAccount(_) => "admin:accounts:enable",
            Self::AdminGetPermissions(_) => "admin:channels:getPermissions",
            Self::AdminUpdatePermissions(_) => "admin:channels:updatePermissions",
            Self::ChannelCreate(_) => "channels:create",
            Self::ChannelDelete(_) => "channels:delete",
            Self::ChannelList => "channels:list",
            Self::ChannelJoin(_) => "channel:join",
            Self::ChatHistory(_) => "chat:history",
            Self::VoiceJoin(_) => "voice:join",
            Self::VoiceLeave => "voice:leave",
            Self::VoiceState(_) => "voice:state",
            Self::VoiceSignal(_) => "voice:signal",
            Self::VoiceKick(_) => "voice:kick",
            Self::VoiceTimeout(_) => "voice:timeout",
            Self::UserBan(_) => "user:ban",
            Self::ScreenshareStart(_) => "screenshare:start",
            Self::ScreenshareStop(_) => "screenshare:stop",
            Self::ScreenshareViewerJoin(_) => "screenshare:viewer:join",
            Self::ScreenshareViewerLeave(_) => "screenshare:viewer:leave",
            Self::ScreenshareSignal(_) => "screenshare:signal",
            Self::Chat(_) => "chat",
            Self::ChatDelete(_) => "chat:delete",
            Self::StreamKeyRequest(_) => "stream:key:request",
        }
    }

    /// Whether this command requires an authenticated connection.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::Register(_) | Self::Login(_) | Self::Resume(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_login() {
        let cmd = Command::parse("auth:login", json!({"username": "a@x.io", "password": "pw"}))
            .unwrap();
        match cmd {
            Command::Login(p) => assert_eq!(p.username, "a@x.io"),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn parse_channels_create_string_shorthand() {
        let cmd = Command::parse("channels:create", json!("dev-talk")).unwrap();
        match cmd {
            Command::ChannelCreate(p) => {
                assert_eq!(p.name, "dev-talk");
                assert!(p.kind.is_none());
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn parse_unknown_command() {
        let err = Command::parse("auth:frobnicate", Value::Null).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand { .. }));
    }

    #[test]
    fn parse_bad_payload() {
        let err = Command::parse("auth:login", json!({"username": 7})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn logout_allows_null_payload() {
        assert!(matches!(
            Command::parse("auth:logout", Value::Null).unwrap(),
            Command::Logout
        ));
    }

    #[test]
    fn auth_gating() {
        let login =
            Command::parse("auth:login", json!({"username": "u", "password": "p"})).unwrap();
        assert!(!login.requires_auth());
        let chat = Command::parse("chat", json!({"text": "hi"})).unwrap();
        assert!(chat.requires_auth());
    }

    #[test]
    fn stream_key_request_accepts_missing_payload() {
        let cmd = Command::parse("stream:key:request", Value::Null).unwrap();
        match cmd {
            Command::StreamKeyRequest(p) => {
                assert!(p.channel_id.is_none() && p.channel_name.is_none())
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }
}
