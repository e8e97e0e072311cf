//! Input validation for names, credentials, and chat text.

use lazy_static::lazy_static;
use regex::Regex;

/// Maximum username (email) length.
pub const USERNAME_MAX: usize = 254;
/// Display name bounds.
pub const DISPLAY_NAME_MIN: usize = 1;
pub const DISPLAY_NAME_MAX: usize = 50;
/// Channel name bounds.
pub const CHANNEL_NAME_MIN: usize = 2;
pub const CHANNEL_NAME_MAX: usize = 32;
/// Maximum password length (the KDF input cap).
pub const PASSWORD_MAX: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("static regex");
    static ref CHANNEL_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex");
}

/// Validate a username: a lowercase email, at most [`USERNAME_MAX`] chars.
pub fn username(input: &str) -> Result<(), String> {
    if input.len() > USERNAME_MAX {
        return Err(format!("username exceeds {USERNAME_MAX} characters"));
    }
    if input.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("username must be lowercase".to_string());
    }
    if !EMAIL_RE.is_match(input) {
        return Err("username must be an email address".to_string());
    }
    Ok(())
}

/// Validate a password against the configured minimum.
pub fn password(input: &str, min: usize) -> Result<(), String> {
    if input.len() < min {
        return Err(format!("password must be at least {min} characters"));
    }
    if input.len() > PASSWORD_MAX {
        return Err(format!("password exceeds {PASSWORD_MAX} characters"));
    }
    Ok(())
}

/// Validate a display name.
pub fn display_name(input: &str) -> Result<(), String> {
    let len = input.chars().count();
    if !(DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
        return Err(format!(
            "display name must be {DISPLAY_NAME_MIN}-{DISPLAY_NAME_MAX} characters"
        ));
    }
    Ok(())
}

/// Validate a channel name: `[A-Za-z0-9_-]`, bounded length.
pub fn channel_name(input: &str) -> Result<(), String> {
    if !(CHANNEL_NAME_MIN..=CHANNEL_NAME_MAX).contains(&input.len()) {
        return Err(format!(
            "channel name must be {CHANNEL_NAME_MIN}-{CHANNEL_NAME_MAX} characters"
        ));
    }
    if !CHANNEL_NAME_RE.is_match(input) {
        return Err("channel name may only contain letters, digits, _ and -".to_string());
    }
    Ok(())
}

/// Sanitize chat text: trim, strip angle brackets, enforce length.
///
/// Returns the cleaned text or a reason for rejection.
pub fn chat_text(input: &str, max_len: usize) -> Result<String, String> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect();
    if cleaned.is_empty() {
        return Err("message is empty".to_string());
    }
    if cleaned.chars().count() > max_len {
        return Err(format!("message exceeds {max_len} characters"));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(username("alice@x.io").is_ok());
        assert!(username("Alice@x.io").is_err());
        assert!(username("not-an-email").is_err());
        let long = format!("{}@x.io", "a".repeat(260));
        assert!(username(&long).is_err());
    }

    #[test]
    fn channel_name_rules() {
        assert!(channel_name("general").is_ok());
        assert!(channel_name("dev-talk_2").is_ok());
        assert!(channel_name("a").is_err());
        assert!(channel_name("has space").is_err());
        assert!(channel_name("emoji💡").is_err());
    }

    #[test]
    fn chat_text_sanitizes() {
        assert_eq!(chat_text("  hi <b>there</b> ", 100).unwrap(), "hi bthere/b");
        assert!(chat_text("   ", 100).is_err());
        assert!(chat_text(&"x".repeat(101), 100).is_err());
    }

    #[test]
    fn display_name_bounds() {
        assert!(display_name("A").is_ok());
        assert!(display_name("").is_err());
        assert!(display_name(&"x".repeat(51)).is_err());
    }
}
