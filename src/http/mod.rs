//! HTTP surface: health, stats, stream status, and the RTMP hooks.
//!
//! Served separately from the WebSocket gateway. The RTMP endpoints are
//! meant for the external RTMP server only; the deployment isolates them.

pub mod rtmp;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use crate::state::Hub;

/// Origin scheme prefixes always allowed: desktop/mobile shells present
/// these regardless of deployment host.
const ALLOWED_SCHEME_PREFIXES: [&str; 6] = [
    "file://",
    "null",
    "capacitor://",
    "ionic://",
    "electron://",
    "http://localhost",
];

fn origin_allowed(origin: &HeaderValue, allow_list: &[String]) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ALLOWED_SCHEME_PREFIXES
        .iter()
        .any(|prefix| origin.starts_with(prefix))
        || origin.starts_with("https://localhost")
        || allow_list.iter().any(|allowed| allowed == origin)
}

fn cors_layer(hub: &Arc<Hub>) -> CorsLayer {
    let allow_list = hub.config.cors.allowed_origins.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin_allowed(origin, &allow_list)
        }))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/stream/:name/status", get(stream_status))
        .route("/api/stream/auth", post(rtmp::stream_auth))
        .route("/api/stream/end", post(rtmp::stream_end))
        .layer(cors_layer(&hub))
        .with_state(hub)
}

/// Run the HTTP surface until the process exits.
pub async fn run_http_server(hub: Arc<Hub>) {
    let addr = hub.config.server.http_listen;
    let app = router(hub);
    info!(%addr, "http surface listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind http surface");
            return;
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!(error = %e, "http surface error");
    }
}

/// Run the Prometheus metrics endpoint on its own port.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(|| async { crate::metrics::gather_metrics() }));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "metrics listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind metrics endpoint");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "metrics endpoint error");
    }
}

async fn health(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "uptime": hub.stats.uptime_secs(),
        "timestamp": Hub::now_ms(),
        "env": hub.config.server.env,
    }))
}

async fn stats(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let snapshot = hub.stats.snapshot();
    Json(json!({
        "channels": hub.channels.count(),
        "users": snapshot.connected,
        "messages": snapshot.messages_total,
        "uptime": snapshot.uptime_secs,
        "memory": {
            "connectionsTotal": snapshot.connections_total,
            "peakConnections": snapshot.peak_connections,
            "historyRecords": hub.history.total_count(),
        },
        "timestamp": Hub::now_ms(),
    }))
}

/// `GET /api/stream/:name/status`
pub async fn stream_status(
    State(hub): State<Arc<Hub>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(channel_id) = hub.channels.resolve_name(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown channel" })),
        );
    };
    let Some(channel) = hub.channels.get(&channel_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown channel" })),
        );
    };
    let channel = channel.read();
    let mut body = json!({
        "channelName": channel.name,
        "isLive": channel.is_live(),
        "viewerCount": channel.members.len(),
        "timestamp": Hub::now_ms(),
    });
    if let Some(stream) = &channel.active_stream {
        body["startedAt"] = json!(stream.started_at);
    }
    (StatusCode::OK, Json(body))
}
