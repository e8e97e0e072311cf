//! Stream key tokens.
//!
//! An RTMP publisher authenticates with `{channel}+{token}` as its stream
//! name. Legacy publishers sometimes send the token after `?` instead; both
//! separators are honored. Values arriving over HTTP are URL-decoded before
//! they reach this module, so a `+` is always a literal separator here.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Token length. Alphanumeric only, so a token can never contain `+` or `?`.
const TOKEN_LEN: usize = 32;

/// Mint a per-channel stream key token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Format the publishable stream key for a channel.
pub fn format_stream_key(channel_name: &str, token: &str) -> String {
    format!("{channel_name}+{token}")
}

/// Split a published stream name into `(channel_name, Some(token))`.
///
/// The channel name is everything before the first `+` or `?`; the token is
/// what follows, if anything.
pub fn extract_stream_key_token(stream_name: &str) -> (&str, Option<&str>) {
    match stream_name.find(['+', '?']) {
        Some(idx) => {
            let token = &stream_name[idx + 1..];
            (
                &stream_name[..idx],
                if token.is_empty() { None } else { Some(token) },
            )
        }
        None => (stream_name, None),
    }
}
