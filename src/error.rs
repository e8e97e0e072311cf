//! Unified error handling for hearthd.
//!
//! Registries raise typed failures; the session coordinator maps them to the
//! wire error taxonomy and logs with correlation data. Every error surfaces
//! as a single outbound event to the initiating connection - never as a
//! connection close (bans, account disables, and slow-subscriber drops are
//! the only exceptions, and those are not errors).

use hearth_proto::ErrorCode;
use thiserror::Error;

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("authentication required")]
    AuthRequired,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account disabled")]
    AccountDisabled { reason: Option<String> },

    #[error("session expired")]
    SessionExpired,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("rate limited")]
    RateLimited,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("cannot grant or modify a role above your own")]
    PrivilegeEscalation,

    #[error("operation would remove the last active admin")]
    LastAdminProtected,

    #[error("{0} not found")]
    NotFound(String),

    #[error("name already taken: {0}")]
    NameTaken(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("stream key invalid")]
    StreamKeyInvalid,

    #[error("stream already live")]
    StreamAlreadyLive,

    #[error("stream not live")]
    StreamNotLive,

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// The wire error code, also used as a metrics label.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthRequired => ErrorCode::AuthRequired,
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::AccountDisabled { .. } => ErrorCode::AccountDisabled,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::AlreadyAuthenticated => ErrorCode::AlreadyAuthenticated,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::PrivilegeEscalation => ErrorCode::PrivilegeEscalation,
            Self::LastAdminProtected => ErrorCode::LastAdminProtected,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::NameTaken(_) => ErrorCode::NameTaken,
            Self::Validation(_) => ErrorCode::Validation,
            Self::StreamKeyInvalid => ErrorCode::StreamKeyInvalid,
            Self::StreamAlreadyLive => ErrorCode::StreamAlreadyLive,
            Self::StreamNotLive => ErrorCode::StreamNotLive,
            Self::Capacity(_) => ErrorCode::Capacity,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Client-visible message. Internal detail is never leaked.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            Self::AccountDisabled { reason: Some(r) } => format!("account disabled: {r}"),
            other => other.to_string(),
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Account store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("username already registered")]
    UsernameTaken,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account disabled")]
    Disabled { reason: Option<String> },

    #[error("no such account")]
    UnknownAccount,

    #[error("session expired or unknown")]
    SessionExpired,

    #[error("roles cannot be empty")]
    EmptyRoles,

    #[error("operation would remove the last active admin")]
    LastAdmin,

    #[error("{0}")]
    Validation(String),
}

impl From<AccountError> for HandlerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::UsernameTaken => Self::NameTaken("username".to_string()),
            AccountError::InvalidCredentials => Self::InvalidCredentials,
            AccountError::Disabled { reason } => Self::AccountDisabled { reason },
            AccountError::UnknownAccount => Self::NotFound("account".to_string()),
            AccountError::SessionExpired => Self::SessionExpired,
            AccountError::EmptyRoles => Self::Validation("roles cannot be empty".to_string()),
            AccountError::LastAdmin => Self::LastAdminProtected,
            AccountError::Validation(reason) => Self::Validation(reason),
        }
    }
}

/// Channel registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no such channel")]
    NotFound,

    #[error("channel name already taken")]
    NameTaken,

    #[error("{0}")]
    Validation(String),

    #[error("stream already live")]
    StreamAlreadyLive,

    #[error("stream not live")]
    StreamNotLive,

    #[error("screenshare already active")]
    ScreenshareActive,

    #[error("too many channels")]
    TooManyChannels,

    #[error("channel is full")]
    ChannelFull,
}

impl From<ChannelError> for HandlerError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::NotFound => Self::NotFound("channel".to_string()),
            ChannelError::NameTaken => Self::NameTaken("channel".to_string()),
            ChannelError::Validation(reason) => Self::Validation(reason),
            ChannelError::StreamAlreadyLive => Self::StreamAlreadyLive,
            ChannelError::StreamNotLive => Self::StreamNotLive,
            ChannelError::ScreenshareActive => {
                Self::Capacity("screenshare already active".to_string())
            }
            ChannelError::TooManyChannels => Self::Capacity("too many channels".to_string()),
            ChannelError::ChannelFull => Self::Capacity("channel is full".to_string()),
        }
    }
}

/// Snapshot persistence failures. Logged and retried, never surfaced to
/// handlers.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("mirror: {0}")]
    Mirror(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_codes() {
        assert_eq!(HandlerError::AuthRequired.code(), ErrorCode::AuthRequired);
        assert_eq!(
            HandlerError::LastAdminProtected.code(),
            ErrorCode::LastAdminProtected
        );
        assert_eq!(
            HandlerError::Internal("oops".into()).code(),
            ErrorCode::InternalError
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = HandlerError::Internal("lock poisoned at hub.rs:42".into());
        assert_eq!(err.client_message(), "internal error");
    }

    #[test]
    fn account_error_mapping() {
        assert_eq!(
            HandlerError::from(AccountError::LastAdmin).code(),
            ErrorCode::LastAdminProtected
        );
        assert_eq!(
            HandlerError::from(AccountError::UsernameTaken).code(),
            ErrorCode::NameTaken
        );
    }

    #[test]
    fn channel_error_mapping() {
        assert_eq!(
            HandlerError::from(ChannelError::StreamAlreadyLive).code(),
            ErrorCode::StreamAlreadyLive
        );
        assert_eq!(
            HandlerError::from(ChannelError::TooManyChannels).code(),
            ErrorCode::Capacity
        );
    }
}
