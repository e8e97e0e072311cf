//! Opaque identifier minting.
//!
//! Every entity id is a v4 UUID string. Session tokens get extra entropy on
//! top so a leaked id can never double as a bearer credential.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Mint an opaque entity id (accounts, channels, messages, connections,
/// voice/stream sessions).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Mint a bearer session token: UUID plus 32 alphanumeric characters.
pub fn new_session_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("{}.{}", uuid::Uuid::new_v4().simple(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn session_tokens_have_two_parts() {
        let token = new_session_token();
        let (head, tail) = token.split_once('.').unwrap();
        assert_eq!(head.len(), 32);
        assert_eq!(tail.len(), 32);
        assert!(tail.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
