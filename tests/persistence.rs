//! Snapshot persistence across server restarts.

mod common;

use common::TestServer;
use serde_json::json;

use hearthd::state::persistence::SnapshotStore;

#[tokio::test]
async fn accounts_and_sessions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    // First life: register, then flush a snapshot the way the writer does.
    let token = {
        let server = TestServer::start();
        let mut client = server.connect();
        let success = server.register(&mut client, "alice@x.io").await;
        let token = success["session"]["token"].as_str().unwrap().to_string();

        let store = SnapshotStore::open(dir.path(), false).unwrap();
        let (accounts, sessions) = server.hub.accounts.snapshot_data();
        store.save(&accounts, &sessions).unwrap();
        token
    };

    // Second life: rehydrate and resume the old session.
    let server = TestServer::start();
    let store = SnapshotStore::open(dir.path(), false).unwrap();
    let (accounts, sessions) = store.load();
    server.hub.accounts.load(accounts, sessions);

    let mut client = server.connect();
    server
        .send(&mut client, "auth:session", json!({ "token": token }))
        .await;
    let success = client.expect("auth:success").expect("resume after restart");
    assert_eq!(success["account"]["username"], "alice@x.io");
    assert_eq!(success["account"]["roles"], json!(["admin"]));

    // The store is no longer empty, so new registrations are plain users.
    let mut newcomer = server.connect();
    let success = server.register(&mut newcomer, "bob@x.io").await;
    assert_eq!(success["account"]["roles"], json!(["user"]));
}

#[tokio::test]
async fn empty_data_dir_starts_fresh_with_admin_grant() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start();
    let store = SnapshotStore::open(dir.path(), false).unwrap();
    let (accounts, sessions) = store.load();
    assert!(accounts.is_empty() && sessions.is_empty());
    server.hub.accounts.load(accounts, sessions);

    let mut client = server.connect();
    let success = server.register(&mut client, "first@x.io").await;
    assert_eq!(success["account"]["roles"], json!(["admin"]));
}

#[tokio::test]
async fn mirror_backfills_when_snapshots_vanish() {
    let dir = tempfile::tempdir().unwrap();

    {
        let server = TestServer::start();
        let mut client = server.connect();
        server.register(&mut client, "alice@x.io").await;
        let store = SnapshotStore::open(dir.path(), true).unwrap();
        let (accounts, sessions) = server.hub.accounts.snapshot_data();
        store.save(&accounts, &sessions).unwrap();
    }

    std::fs::remove_file(dir.path().join("accounts.json")).unwrap();
    std::fs::remove_file(dir.path().join("sessions.json")).unwrap();

    let store = SnapshotStore::open(dir.path(), true).unwrap();
    let (accounts, _) = store.load();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].username, "alice@x.io");
    // The verifier round-trips, so credentials still work after recovery.
    let server = TestServer::start();
    server.hub.accounts.load(accounts, vec![]);
    let mut client = server.connect();
    server.login(&mut client, "alice@x.io").await;
}
