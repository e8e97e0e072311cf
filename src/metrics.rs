//! Prometheus metrics collection for hearthd.
//!
//! Tracks connection churn, chat throughput, broadcast health, auth
//! failures, and stream lifecycle on a scrape endpoint.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total chat messages accepted.
    pub static ref MESSAGES_SENT: IntCounter = IntCounter::new(
        "hearth_messages_sent_total",
        "Total chat messages accepted"
    ).unwrap();

    /// Total frames fanned out by the broadcast fabric.
    pub static ref EVENTS_BROADCAST: IntCounter = IntCounter::new(
        "hearth_events_broadcast_total",
        "Total event frames fanned out"
    ).unwrap();

    /// Connections dropped because their outbound queue filled.
    pub static ref SLOW_DROPS: IntCounter = IntCounter::new(
        "hearth_slow_subscriber_drops_total",
        "Connections dropped for a full outbound queue"
    ).unwrap();

    /// Total rate limit hits.
    pub static ref RATE_LIMITED: IntCounter = IntCounter::new(
        "hearth_rate_limited_total",
        "Rate limit hits"
    ).unwrap();

    /// Command failures by error code.
    pub static ref COMMAND_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("hearth_command_errors_total", "Command failures by code"),
        &["code"]
    ).unwrap();

    /// RTMP publish authorizations denied.
    pub static ref STREAM_AUTH_DENIED: IntCounter = IntCounter::new(
        "hearth_stream_auth_denied_total",
        "RTMP publish authorizations denied"
    ).unwrap();

    /// Currently connected clients.
    pub static ref CONNECTED_CLIENTS: IntGauge = IntGauge::new(
        "hearth_connected_clients",
        "Currently connected clients"
    ).unwrap();

    /// Channels in the registry.
    pub static ref ACTIVE_CHANNELS: IntGauge = IntGauge::new(
        "hearth_active_channels",
        "Channels in the registry"
    ).unwrap();

    /// Streams currently live.
    pub static ref LIVE_STREAMS: IntGauge = IntGauge::new(
        "hearth_live_streams",
        "Streams currently live"
    ).unwrap();

    /// Occupied voice channels.
    pub static ref ACTIVE_VOICE_SESSIONS: IntGauge = IntGauge::new(
        "hearth_active_voice_sessions",
        "Voice channels with at least one participant"
    ).unwrap();
}

/// Register all metrics. Must run once at startup, before the first scrape.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES_SENT.clone())).unwrap();
    REGISTRY
        .register(Box::new(EVENTS_BROADCAST.clone()))
        .unwrap();
    REGISTRY.register(Box::new(SLOW_DROPS.clone())).unwrap();
    REGISTRY.register(Box::new(RATE_LIMITED.clone())).unwrap();
    REGISTRY
        .register(Box::new(COMMAND_ERRORS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STREAM_AUTH_DENIED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CONNECTED_CLIENTS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_CHANNELS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(LIVE_STREAMS.clone())).unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_VOICE_SESSIONS.clone()))
        .unwrap();
}

/// Record a command failure under its wire code.
pub fn record_command_error(code: &str) {
    COMMAND_ERRORS.with_label_values(&[code]).inc();
}

/// Gather all metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
