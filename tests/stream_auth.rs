//! RTMP ingress authorization and the HTTP surface around it.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use common::TestServer;
use serde_json::Value;

use hearthd::http::rtmp::{stream_auth, stream_end};
use hearthd::state::Hub;

fn rtmp_addr() -> SocketAddr {
    "203.0.113.9:51000".parse().unwrap()
}

async fn post_auth(hub: &Arc<Hub>, body: &str) -> (StatusCode, Value) {
    let response = stream_auth(
        State(hub.clone()),
        ConnectInfo(rtmp_addr()),
        Uri::from_static("/api/stream/auth"),
        HeaderMap::new(),
        body.to_string(),
    )
    .await
    .into_response();
    decode(response).await
}

async fn post_end(hub: &Arc<Hub>, body: &str) -> (StatusCode, Value) {
    let response = stream_end(
        State(hub.clone()),
        Uri::from_static("/api/stream/end"),
        HeaderMap::new(),
        body.to_string(),
    )
    .await
    .into_response();
    decode(response).await
}

async fn decode(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn cam1_key(server: &TestServer) -> String {
    let id = server.channel_id("cam1");
    server.hub.channels.stream_key(&id).unwrap().1
}

#[tokio::test]
async fn stream_key_in_args_blob_authorizes_publish() {
    let server = TestServer::start();
    let key = cam1_key(&server);
    let encoded = key.replace('+', "%2B");

    let (status, body) = post_auth(
        &server.hub,
        &format!("args=channel%3D{encoded}%26app%3Dlive"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["channel"], "cam1");
    assert!(body["started_at"].is_i64());

    let channel = server.hub.channels.get(&server.channel_id("cam1")).unwrap();
    assert!(channel.read().is_live());
}

#[tokio::test]
async fn raw_plus_separator_is_accepted_too() {
    let server = TestServer::start();
    let key = cam1_key(&server);
    let (status, body) = post_auth(&server.hub, &format!("channel={key}&app=live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn second_publisher_conflicts_until_release() {
    let server = TestServer::start();
    let key = cam1_key(&server);

    let (status, _) = post_auth(&server.hub, &format!("channel={key}&client_id=one")).await;
    assert_eq!(status, StatusCode::OK);

    // A different client on the same key is a competing principal.
    let (status, body) = post_auth(&server.hub, &format!("channel={key}&client_id=two")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STREAM_ALREADY_LIVE");

    // The same client retrying is idempotent.
    let (status, _) = post_auth(&server.hub, &format!("channel={key}&client_id=one")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_end(&server.hub, &format!("channel={key}&client_id=one")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], true);

    let (status, _) = post_auth(&server.hub, &format!("channel={key}&client_id=two")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_stream_key_is_forbidden() {
    let server = TestServer::start();
    let (status, body) = post_auth(&server.hub, "channel=cam1+totallywrongtoken").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "STREAM_KEY_INVALID");
}

#[tokio::test]
async fn credential_publish_checks_the_permission_matrix() {
    let server = TestServer::start();
    let mut client = server.connect();
    server.register(&mut client, "alice@x.io").await;

    // Default stream permission is wildcard: credentials suffice.
    let (status, body) = post_auth(
        &server.hub,
        "channel=cam1&username=alice@x.io&password=correcthorse",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    post_end(&server.hub, "channel=cam1").await;

    // Wrong password.
    let (status, body) = post_auth(
        &server.hub,
        "channel=cam1&username=alice@x.io&password=wrong",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "STREAM_AUTH_INVALID_CREDENTIALS");

    // Lock the channel down to streamers only; alice is a plain user.
    let cam1 = server.channel_id("cam1");
    let channel = server.hub.channels.get(&cam1).unwrap();
    {
        use hearthd::state::channel::{Action, Grant};
        let mut channel = channel.write();
        let mut grant = Grant::default();
        grant.roles.insert("streamer".to_string());
        channel.permissions.set_grant(Action::Stream, grant);
    }
    let (status, body) = post_auth(
        &server.hub,
        "channel=cam1&username=alice@x.io&password=correcthorse",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "STREAM_AUTH_FORBIDDEN");
}

#[tokio::test]
async fn missing_input_is_a_bad_request() {
    let server = TestServer::start();
    let (status, body) = post_auth(&server.hub, "app=live").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "STREAM_AUTH_INVALID");

    let (status, body) = post_auth(&server.hub, "channel=cam1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "STREAM_AUTH_INVALID");
}

#[tokio::test]
async fn auth_hook_is_rate_limited() {
    let server = TestServer::start_with(
        r#"
[server]
name = "hearth.test"
metrics_port = 0

[auth]
kdf_memory_kib = 8192
kdf_iterations = 1

[rate_limits]
stream_auth_per_minute = 2
"#,
    );
    for _ in 0..2 {
        post_auth(&server.hub, "channel=cam1+badkey").await;
    }
    let (status, body) = post_auth(&server.hub, "channel=cam1+badkey").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "STREAM_AUTH_RATE_LIMITED");
}

#[tokio::test]
async fn end_tolerates_unknown_and_stale_references() {
    let server = TestServer::start();
    let (status, body) = post_end(&server.hub, "channel=nosuchchannel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);

    // Idle channel: released=false, not an error.
    let (status, body) = post_end(&server.hub, "channel=cam1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);

    // Stale client reference still releases (the RTMP server is
    // authoritative) but reports the mismatch.
    let key = cam1_key(&server);
    post_auth(&server.hub, &format!("channel={key}&client_id=one")).await;
    let (status, body) = post_end(&server.hub, "channel=cam1&client_id=stale").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], true);
    assert_eq!(body["reason"], "reference mismatch");
}

#[tokio::test]
async fn status_endpoint_reports_liveness() {
    let server = TestServer::start();

    let (status, body) = status_of(&server.hub, "cam1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLive"], false);

    let key = cam1_key(&server);
    post_auth(&server.hub, &format!("channel={key}")).await;
    let (_, body) = status_of(&server.hub, "cam1").await;
    assert_eq!(body["isLive"], true);
    assert!(body["startedAt"].is_i64());

    let (status, _) = status_of(&server.hub, "ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn status_of(hub: &Arc<Hub>, name: &str) -> (StatusCode, Value) {
    let response = hearthd::http::stream_status(State(hub.clone()), Path(name.to_string()))
        .await
        .into_response();
    decode(response).await
}

#[tokio::test]
async fn going_live_broadcasts_channels_update() {
    let server = TestServer::start();
    let mut client = server.connect();
    server.register(&mut client, "viewer@x.io").await;
    client.drain();

    let key = cam1_key(&server);
    post_auth(&server.hub, &format!("channel={key}")).await;

    let update = client
        .expect("channels:update")
        .expect("liveness change is broadcast");
    let cam1 = update["channels"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "cam1")
        .unwrap();
    assert_eq!(cam1["isLive"], true);
}
