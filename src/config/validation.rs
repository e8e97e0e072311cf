//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use thiserror::Error;

use super::Config;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("limits.history_depth must be at least 1")]
    ZeroHistoryDepth,
    #[error("limits.outbound_queue_depth must be at least 16, got {0}")]
    QueueTooShallow(usize),
    #[error("auth.session_ttl_secs must be at least 60, got {0}")]
    SessionTtlTooShort(u64),
    #[error("auth.password_min must be between 6 and 128, got {0}")]
    PasswordMinOutOfRange(usize),
    #[error("auth.kdf_memory_kib must be between 8192 and 262144, got {0}")]
    KdfMemoryOutOfRange(u32),
    #[error("auth.kdf_iterations must be between 1 and 10, got {0}")]
    KdfIterationsOutOfRange(u32),
    #[error("persist.data_dir cannot be created: {0}")]
    DataDirUnusable(String),
    #[error("server.listen and server.http_listen must differ")]
    ListenerCollision,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config.server.listen == config.server.http_listen {
        errors.push(ValidationError::ListenerCollision);
    }

    if config.limits.history_depth == 0 {
        errors.push(ValidationError::ZeroHistoryDepth);
    }
    if config.limits.outbound_queue_depth < 16 {
        errors.push(ValidationError::QueueTooShallow(
            config.limits.outbound_queue_depth,
        ));
    }

    if config.auth.session_ttl_secs < 60 {
        errors.push(ValidationError::SessionTtlTooShort(
            config.auth.session_ttl_secs,
        ));
    }
    if !(6..=128).contains(&config.auth.password_min) {
        errors.push(ValidationError::PasswordMinOutOfRange(
            config.auth.password_min,
        ));
    }
    if !(8192..=262_144).contains(&config.auth.kdf_memory_kib) {
        errors.push(ValidationError::KdfMemoryOutOfRange(
            config.auth.kdf_memory_kib,
        ));
    }
    if !(1..=10).contains(&config.auth.kdf_iterations) {
        errors.push(ValidationError::KdfIterationsOutOfRange(
            config.auth.kdf_iterations,
        ));
    }

    if let Err(e) = std::fs::create_dir_all(&config.persist.data_dir) {
        errors.push(ValidationError::DataDirUnusable(format!(
            "{}: {}",
            config.persist.data_dir, e
        )));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(dir: &str) -> Config {
        toml::from_str(&format!(
            r#"
[server]
name = "hearth.test"

[persist]
data_dir = "{dir}"
"#
        ))
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path().to_str().unwrap());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path().to_str().unwrap());
        config.server.name.clear();
        config.limits.history_depth = 0;
        config.auth.session_ttl_secs = 1;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
