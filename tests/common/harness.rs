//! In-process test server and clients.

#![allow(dead_code)]

use std::sync::Arc;

use hearth_proto::Frame;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use hearthd::broadcast::OutboundFrame;
use hearthd::config::Config;
use hearthd::handlers::{ConnState, Context, Registry};
use hearthd::state::{Hub, HubParams};

/// A test server instance: a fully wired hub plus the handler registry.
pub struct TestServer {
    pub hub: Arc<Hub>,
    pub registry: Registry,
    counter: std::sync::atomic::AtomicUsize,
}

impl TestServer {
    /// Start with the standard test configuration (fast KDF, generous rate
    /// limits) and the default rooms seeded.
    pub fn start() -> Self {
        Self::start_with(
            r#"
[server]
name = "hearth.test"
metrics_port = 0

[auth]
kdf_memory_kib = 8192
kdf_iterations = 1

[rate_limits]
register_per_minute = 1000
login_per_minute = 1000
stream_auth_per_minute = 1000
"#,
        )
    }

    /// Start with a custom TOML config (for rate-limit and cap tests).
    pub fn start_with(config: &str) -> Self {
        let config: Config = toml::from_str(config).expect("test config parses");
        let (dirty_tx, _dirty_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, mut disconnect_rx) = mpsc::channel(256);
        let hub = Arc::new(Hub::new(HubParams {
            config,
            dirty_tx,
            disconnect_tx,
        }));
        hub.channels.seed_defaults();

        // Disconnect worker, as the orchestrator runs it.
        {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                while let Some((conn_id, reason)) = disconnect_rx.recv().await {
                    hub.teardown_connection(&conn_id, Some(reason));
                }
            });
        }

        Self {
            hub,
            registry: Registry::new(),
            counter: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Attach a new client connection.
    pub fn connect(&self) -> TestClient {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let conn_id = format!("conn-{n}");
        let (tx, rx) = mpsc::channel(self.hub.config.limits.outbound_queue_depth);
        self.hub.fabric.register(&conn_id, tx);
        self.hub
            .presence
            .create(&conn_id, "127.0.0.1".parse().unwrap(), Hub::now_ms());
        self.hub.stats.client_connected();
        TestClient {
            conn_id,
            state: ConnState::default(),
            rx,
        }
    }

    /// Dispatch one command frame as `client`.
    pub async fn send(&self, client: &mut TestClient, event: &str, data: Value) {
        let raw = Frame::new(event, data).encode();
        let mut ctx = Context {
            conn_id: &client.conn_id,
            remote_ip: "127.0.0.1".parse().unwrap(),
            hub: &self.hub,
            state: &mut client.state,
        };
        self.registry.dispatch(&mut ctx, &raw).await;
    }

    /// Register an account and leave the client authenticated. Returns the
    /// `auth:success` payload.
    pub async fn register(&self, client: &mut TestClient, username: &str) -> Value {
        self.send(
            client,
            "auth:register",
            json!({ "username": username, "password": "correcthorse" }),
        )
        .await;
        client
            .expect("auth:success")
            .unwrap_or_else(|| panic!("registration failed for {username}"))
    }

    /// Log an existing account in on this client.
    pub async fn login(&self, client: &mut TestClient, username: &str) -> Value {
        self.send(
            client,
            "auth:login",
            json!({ "username": username, "password": "correcthorse" }),
        )
        .await;
        client
            .expect("auth:success")
            .unwrap_or_else(|| panic!("login failed for {username}"))
    }

    /// Close a client the way the connection task would.
    pub fn disconnect(&self, client: &TestClient) {
        self.hub.teardown_connection(&client.conn_id, None);
    }

    pub fn channel_id(&self, name: &str) -> String {
        self.hub
            .channels
            .resolve_name(name)
            .unwrap_or_else(|| panic!("channel {name} not found"))
    }
}

/// A fake client: its outbound queue stands in for the WebSocket.
pub struct TestClient {
    pub conn_id: String,
    pub state: ConnState,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl TestClient {
    /// Pop every queued event, in order.
    pub fn events(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(raw) = self.rx.try_recv() {
            out.push(Frame::decode(&raw).expect("server emits valid frames"));
        }
        out
    }

    /// Drain until the first event with this name; returns its payload.
    pub fn expect(&mut self, event: &str) -> Option<Value> {
        while let Ok(raw) = self.rx.try_recv() {
            let frame = Frame::decode(&raw).expect("server emits valid frames");
            if frame.event == event {
                return Some(frame.data);
            }
        }
        None
    }

    /// Assert no queued event carries this name, draining the queue.
    pub fn expect_none(&mut self, event: &str) {
        let seen: Vec<String> = self.events().into_iter().map(|f| f.event).collect();
        assert!(
            !seen.iter().any(|name| name == event),
            "unexpected {event} (saw {seen:?})"
        );
    }

    /// Discard everything queued so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
