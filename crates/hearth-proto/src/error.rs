//! Error taxonomy shared by the message channel and the HTTP surface.
//!
//! Codes, not types: every failure a client can observe is one of these
//! codes, carried in an `error`-family event or an HTTP error body.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding protocol input.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },

    #[error("unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("invalid payload for {command}: {reason}")]
    InvalidPayload { command: String, reason: String },
}

/// Stable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    AuthRequired,
    InvalidCredentials,
    AccountDisabled,
    SessionExpired,
    AlreadyAuthenticated,
    RateLimited,
    PermissionDenied,
    PrivilegeEscalation,
    LastAdminProtected,
    NotFound,
    NameTaken,
    Validation,
    StreamKeyInvalid,
    StreamAlreadyLive,
    StreamNotLive,
    Capacity,
    InternalError,
}

impl ErrorCode {
    /// The wire representation, also used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequired => "AuthRequired",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::AccountDisabled => "AccountDisabled",
            Self::SessionExpired => "SessionExpired",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::RateLimited => "RateLimited",
            Self::PermissionDenied => "PermissionDenied",
            Self::PrivilegeEscalation => "PrivilegeEscalation",
            Self::LastAdminProtected => "LastAdminProtected",
            Self::NotFound => "NotFound",
            Self::NameTaken => "NameTaken",
            Self::Validation => "Validation",
            Self::StreamKeyInvalid => "StreamKeyInvalid",
            Self::StreamAlreadyLive => "StreamAlreadyLive",
            Self::StreamNotLive => "StreamNotLive",
            Self::Capacity => "Capacity",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_serializes_as_bare_string() {
        let json = serde_json::to_string(&ErrorCode::LastAdminProtected).unwrap();
        assert_eq!(json, "\"LastAdminProtected\"");
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ErrorCode::RateLimited.to_string(), "RateLimited");
    }
}
