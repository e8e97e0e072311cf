//! Authentication lifecycle: registration, login, resume, logout.

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn first_account_is_granted_admin_and_sees_defaults() {
    let server = TestServer::start();
    let mut client = server.connect();

    server
        .send(
            &mut client,
            "auth:register",
            json!({ "username": "alice@x.io", "password": "correcthorse" }),
        )
        .await;

    let success = client.expect("auth:success").expect("auth:success emitted");
    assert_eq!(success["account"]["roles"], json!(["admin"]));
    assert_eq!(success["isNewAccount"], json!(true));

    let channels: Vec<&str> = success["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    for name in ["general", "random", "lounge", "cam1", "screens"] {
        assert!(channels.contains(&name), "missing default channel {name}");
    }
    assert!(!success["groups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn second_account_is_plain_user() {
    let server = TestServer::start();
    let mut first = server.connect();
    server.register(&mut first, "alice@x.io").await;

    let mut second = server.connect();
    let success = server.register(&mut second, "bob@x.io").await;
    assert_eq!(success["account"]["roles"], json!(["user"]));
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let server = TestServer::start();
    let mut first = server.connect();
    server.register(&mut first, "alice@x.io").await;

    let mut second = server.connect();
    server
        .send(
            &mut second,
            "auth:register",
            json!({ "username": "alice@x.io", "password": "correcthorse" }),
        )
        .await;
    let err = second.expect("auth:error").expect("auth:error emitted");
    assert_eq!(err["code"], "NameTaken");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let server = TestServer::start();
    let mut client = server.connect();
    server.register(&mut client, "alice@x.io").await;
    server.disconnect(&client);

    let mut fresh = server.connect();
    server
        .send(
            &mut fresh,
            "auth:login",
            json!({ "username": "alice@x.io", "password": "wrongwrong" }),
        )
        .await;
    let wrong_pw = fresh.expect("auth:error").unwrap();

    server
        .send(
            &mut fresh,
            "auth:login",
            json!({ "username": "ghost@x.io", "password": "wrongwrong" }),
        )
        .await;
    let unknown = fresh.expect("auth:error").unwrap();

    assert_eq!(wrong_pw["code"], "InvalidCredentials");
    assert_eq!(unknown["code"], wrong_pw["code"]);
    assert_eq!(unknown["message"], wrong_pw["message"]);
}

#[tokio::test]
async fn session_resume_on_a_new_connection() {
    let server = TestServer::start();
    let mut client = server.connect();
    let success = server.register(&mut client, "alice@x.io").await;
    let token = success["session"]["token"].as_str().unwrap().to_string();
    server.disconnect(&client);

    let mut resumed = server.connect();
    server
        .send(&mut resumed, "auth:session", json!({ "token": token }))
        .await;
    let success = resumed.expect("auth:success").expect("resume succeeds");
    assert_eq!(success["resumed"], json!(true));
    assert_eq!(success["account"]["username"], "alice@x.io");
}

#[tokio::test]
async fn resume_with_garbage_token_fails() {
    let server = TestServer::start();
    let mut client = server.connect();
    server
        .send(&mut client, "auth:session", json!({ "token": "nope" }))
        .await;
    let err = client.expect("auth:error").unwrap();
    assert_eq!(err["code"], "SessionExpired");
}

#[tokio::test]
async fn resume_same_account_is_idempotent_but_switching_is_refused() {
    let server = TestServer::start();
    let mut alice = server.connect();
    let alice_token = server.register(&mut alice, "alice@x.io").await["session"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let mut bob = server.connect();
    let bob_token = server.register(&mut bob, "bob@x.io").await["session"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Same account again: fine, flagged as a resume.
    server
        .send(&mut alice, "auth:session", json!({ "token": alice_token }))
        .await;
    assert!(alice.expect("auth:success").is_some());

    // Another account's token on a bound connection: refused.
    server
        .send(&mut alice, "auth:session", json!({ "token": bob_token }))
        .await;
    let err = alice.expect("auth:error").unwrap();
    assert_eq!(err["code"], "AlreadyAuthenticated");
}

#[tokio::test]
async fn commands_require_authentication() {
    let server = TestServer::start();
    let mut client = server.connect();
    server.send(&mut client, "chat", json!({ "text": "hi" })).await;
    let err = client.expect("error").unwrap();
    assert_eq!(err["code"], "AuthRequired");
}

#[tokio::test]
async fn logout_revokes_the_session_and_identity() {
    let server = TestServer::start();
    let mut client = server.connect();
    let token = server.register(&mut client, "alice@x.io").await["session"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    server.send(&mut client, "auth:logout", json!(null)).await;
    assert!(client.expect("auth:loggedOut").is_some());

    // The token died with the logout.
    let mut fresh = server.connect();
    server
        .send(&mut fresh, "auth:session", json!({ "token": token }))
        .await;
    assert_eq!(fresh.expect("auth:error").unwrap()["code"], "SessionExpired");

    // And the connection is unauthenticated again.
    server.send(&mut client, "account:get", json!(null)).await;
    assert_eq!(
        client.expect("account:error").unwrap()["code"],
        "AuthRequired"
    );
}

#[tokio::test]
async fn registration_rate_limit_applies_per_ip() {
    let server = TestServer::start_with(
        r#"
[server]
name = "hearth.test"
metrics_port = 0

[auth]
kdf_memory_kib = 8192
kdf_iterations = 1

[rate_limits]
register_per_minute = 2
"#,
    );
    for i in 0..2 {
        let mut client = server.connect();
        server.register(&mut client, &format!("user{i}@x.io")).await;
    }
    let mut blocked = server.connect();
    server
        .send(
            &mut blocked,
            "auth:register",
            json!({ "username": "late@x.io", "password": "correcthorse" }),
        )
        .await;
    let err = blocked.expect("auth:error").unwrap();
    assert_eq!(err["code"], "RateLimited");
}

#[tokio::test]
async fn account_update_changes_profile_and_password() {
    let server = TestServer::start();
    let mut client = server.connect();
    server.register(&mut client, "alice@x.io").await;
    client.drain();

    server
        .send(
            &mut client,
            "account:update",
            json!({ "displayName": "Alice Prime", "bio": "hi" }),
        )
        .await;
    let updated = client.expect("account:updated").unwrap();
    assert_eq!(updated["account"]["displayName"], "Alice Prime");

    server
        .send(
            &mut client,
            "account:update",
            json!({ "newPassword": "betterhorsebattery", "currentPassword": "correcthorse" }),
        )
        .await;
    let updated = client.expect("account:updated").unwrap();
    // Password change re-issues a session for this connection.
    assert!(updated["session"]["token"].is_string());

    server.disconnect(&client);
    let mut fresh = server.connect();
    server
        .send(
            &mut fresh,
            "auth:login",
            json!({ "username": "alice@x.io", "password": "betterhorsebattery" }),
        )
        .await;
    assert!(fresh.expect("auth:success").is_some());
}

#[tokio::test]
async fn unknown_commands_get_a_validation_error() {
    let server = TestServer::start();
    let mut client = server.connect();
    server
        .send(&mut client, "auth:frobnicate", json!({}))
        .await;
    let err = client.expect("auth:error").unwrap();
    assert_eq!(err["code"], "Validation");
}
