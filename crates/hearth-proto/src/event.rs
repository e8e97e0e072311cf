//! Outbound event alphabet.
//!
//! Event names are constants; payloads are either the shared views in
//! [`crate::types`] or the small structs here. Handlers build frames with
//! [`crate::Frame::new`].

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::types::{AccountView, ChannelView, GroupView, PeerView, SessionView, UserView};

pub const AUTH_SUCCESS: &str = "auth:success";
pub const AUTH_ERROR: &str = "auth:error";
pub const AUTH_LOGGED_OUT: &str = "auth:loggedOut";

pub const ACCOUNT_UPDATED: &str = "account:updated";
pub const ACCOUNT_DATA: &str = "account:data";
pub const ACCOUNT_ROLES_UPDATED: &str = "account:rolesUpdated";
pub const ACCOUNT_ERROR: &str = "account:error";

pub const ADMIN_ACCOUNTS: &str = "admin:accounts";
pub const ADMIN_ROLES_UPDATED: &str = "admin:rolesUpdated";
pub const ADMIN_ACCOUNT_DISABLED: &str = "admin:accountDisabled";
pub const ADMIN_ACCOUNT_ENABLED: &str = "admin:accountEnabled";
pub const ADMIN_CHANNEL_PERMISSIONS: &str = "admin:channelPermissions";
pub const ADMIN_ERROR: &str = "admin:error";

pub const CHANNELS_UPDATE: &str = "channels:update";
pub const CHANNEL_JOINED: &str = "channel:joined";
pub const CHANNEL_DELETED: &str = "channel:deleted";

pub const PRESENCE: &str = "presence";

pub const CHAT: &str = "chat";
pub const CHAT_HISTORY: &str = "chat:history";
pub const CHAT_MESSAGE_DELETED: &str = "chat:messageDeleted";

pub const VOICE_JOINED: &str = "voice:joined";
pub const VOICE_PEER_JOIN: &str = "voice:peer-join";
pub const VOICE_PEER_LEAVE: &str = "voice:peer-leave";
pub const VOICE_SIGNAL: &str = "voice:signal";
pub const VOICE_STATE: &str = "voice:state";
pub const VOICE_KICKED: &str = "voice:kicked";
pub const VOICE_TIMEOUT: &str = "voice:timeout";

pub const USER_BANNED: &str = "user:banned";

pub const SCREENSHARE_SESSION: &str = "screenshare:session";
pub const SCREENSHARE_VIEWER_PENDING: &str = "screenshare:viewer:pending";
pub const SCREENSHARE_SIGNAL: &str = "screenshare:signal";

pub const STREAM_KEY_RESPONSE: &str = "stream:key:response";
pub const STREAM_KEY_ERROR: &str = "stream:key:error";

pub const SERVER_SHUTDOWN: &str = "server:shutdown";

pub const ERROR: &str = "error";

/// Payload of `auth:success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub user: UserView,
    pub account: AccountView,
    pub session: SessionView,
    pub channels: Vec<ChannelView>,
    pub groups: Vec<GroupView>,
    pub is_new_account: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resumed: bool,
}

/// Payload of `error`, `auth:error`, `admin:error`, and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    pub code: ErrorCode,
}

impl ErrorEvent {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

/// Payload of `channels:update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsUpdate {
    pub channels: Vec<ChannelView>,
    pub groups: Vec<GroupView>,
}

/// Payload of `channel:joined`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelJoined {
    pub channel_id: String,
    pub channel_name: String,
    pub channel_type: crate::types::ChannelKind,
}

/// Payload of `voice:joined`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoined {
    pub channel_id: String,
    pub peers: Vec<PeerView>,
    pub started_at: i64,
    pub session_id: String,
}

/// Payload of `chat:messageDeleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: String,
    pub channel_id: String,
    pub deleted_by: String,
}

/// Payload of `voice:kicked` / `voice:timeout` / `user:banned`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationNotice {
    pub by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of relayed `voice:signal` / `screenshare:signal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRelay {
    pub from: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Payload of `stream:key:response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKeyResponse {
    pub channel_id: String,
    pub channel_name: String,
    /// `{name}+{token}` - the exact string an RTMP publisher uses.
    pub stream_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    #[test]
    fn error_event_frame_shape() {
        let frame = Frame::new(
            ERROR,
            ErrorEvent::new(ErrorCode::PermissionDenied, "not allowed"),
        );
        let json: serde_json::Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["code"], "PermissionDenied");
        assert_eq!(json["data"]["message"], "not allowed");
    }

    #[test]
    fn moderation_notice_omits_empty_fields() {
        let json = serde_json::to_value(ModerationNotice {
            by: "Mod".into(),
            duration: None,
            reason: None,
        })
        .unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
