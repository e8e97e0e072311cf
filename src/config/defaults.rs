//! Default values for optional configuration fields.

pub fn default_listen() -> std::net::SocketAddr {
    "0.0.0.0:4100".parse().expect("static addr")
}

pub fn default_http_listen() -> std::net::SocketAddr {
    "0.0.0.0:4180".parse().expect("static addr")
}

pub fn default_data_dir() -> String {
    "data".to_string()
}

pub fn default_snapshot_debounce_ms() -> u64 {
    1000
}

pub fn default_session_ttl_secs() -> u64 {
    7 * 86400
}

pub fn default_password_min() -> usize {
    8
}

pub fn default_kdf_memory_kib() -> u32 {
    19 * 1024
}

pub fn default_kdf_iterations() -> u32 {
    2
}

pub fn default_register_per_minute() -> u32 {
    5
}

pub fn default_login_per_minute() -> u32 {
    10
}

pub fn default_stream_auth_per_minute() -> u32 {
    30
}

pub fn default_max_channels() -> usize {
    200
}

pub fn default_max_members_per_channel() -> usize {
    500
}

pub fn default_max_message_length() -> usize {
    2000
}

pub fn default_history_depth() -> usize {
    200
}

pub fn default_outbound_queue_depth() -> usize {
    256
}

pub fn default_max_frame_bytes() -> usize {
    64 * 1024
}
