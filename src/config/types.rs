//! Configuration type definitions.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use super::defaults::{
    default_data_dir, default_http_listen, default_kdf_iterations, default_kdf_memory_kib,
    default_listen, default_password_min, default_session_ttl_secs, default_snapshot_debounce_ms,
};
use super::limits::LimitsConfig;
use super::security::RateLimitConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub persist: PersistConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Server identity and listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, shown in health responses and logs.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Deployment environment label (`/health` reports it).
    #[serde(default = "default_env")]
    pub env: String,
    /// WebSocket gateway listener.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// HTTP surface listener (health, stats, RTMP hooks).
    #[serde(default = "default_http_listen")]
    pub http_listen: SocketAddr,
    /// Prometheus metrics port. 0 disables the endpoint (used by tests).
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_env() -> String {
    "production".to_string()
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistConfig {
    /// Directory for snapshot files (and the redb mirror).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Debounce window between a mutation and the snapshot write.
    #[serde(default = "default_snapshot_debounce_ms")]
    pub snapshot_debounce_ms: u64,
    /// Mirror accounts/sessions into a redb database alongside snapshots.
    #[serde(default)]
    pub mirror: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_debounce_ms: default_snapshot_debounce_ms(),
            mirror: false,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session time-to-live; refreshed on every touch.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Minimum password length for registration.
    #[serde(default = "default_password_min")]
    pub password_min: usize,
    /// Argon2 memory cost, KiB. Bounded by validation.
    #[serde(default = "default_kdf_memory_kib")]
    pub kdf_memory_kib: u32,
    /// Argon2 iteration count. Bounded by validation.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            password_min: default_password_min(),
            kdf_memory_kib: default_kdf_memory_kib(),
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

/// CORS allow-list for the HTTP surface.
///
/// Desktop and mobile shells are always allowed; see `http::cors_layer` for
/// the fixed scheme prefixes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "hearth.test"
"#,
        )
        .unwrap();
        assert_eq!(config.server.name, "hearth.test");
        assert_eq!(config.auth.session_ttl_secs, 7 * 86400);
        assert_eq!(config.limits.history_depth, 200);
        assert!(!config.persist.mirror);
        assert_eq!(config.server.log_format, LogFormat::Pretty);
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "hearth.test"
listen = "127.0.0.1:5000"
http_listen = "127.0.0.1:5001"
metrics_port = 0
log_format = "json"

[persist]
data_dir = "/tmp/hearth"
mirror = true

[auth]
session_ttl_secs = 3600
password_min = 10

[rate_limits]
register_per_minute = 2

[limits]
max_message_length = 500

[cors]
allowed_origins = ["https://hub.example.com"]
"#,
        )
        .unwrap();
        assert_eq!(config.server.metrics_port, Some(0));
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert!(config.persist.mirror);
        assert_eq!(config.rate_limits.register_per_minute, 2);
        assert_eq!(config.limits.max_message_length, 500);
        assert_eq!(config.cors.allowed_origins.len(), 1);
    }
}
