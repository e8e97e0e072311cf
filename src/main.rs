//! hearthd - Hearth Communication Hub daemon.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hearth_proto::{Frame, event};
use tracing::{error, info};

use hearthd::config::Config;
use hearthd::handlers::Registry;
use hearthd::http;
use hearthd::metrics;
use hearthd::network::Gateway;
use hearthd::state::persistence::{SnapshotStore, run_snapshot_writer};
use hearthd::state::{Hub, HubParams};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (before tracing, so we can use log_format)
    let config_path = resolve_config_path();
    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.server.log_format {
        hearthd::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        hearthd::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = hearthd::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(server = %config.server.name, env = %config.server.env, "Starting hearthd");

    // Disconnect worker queue: registries and the fabric can request
    // disconnects without blocking. Bounded to survive disconnect storms.
    const DISCONNECT_CHANNEL_SIZE: usize = 1024;
    let (disconnect_tx, mut disconnect_rx) =
        tokio::sync::mpsc::channel(DISCONNECT_CHANNEL_SIZE);
    let (dirty_tx, dirty_rx) = tokio::sync::mpsc::unbounded_channel();

    let data_dir = config.persist.data_dir.clone();
    let mirror = config.persist.mirror;
    let debounce = Duration::from_millis(config.persist.snapshot_debounce_ms);
    let metrics_port = config.server.metrics_port.unwrap_or(9090);

    let hub = Arc::new(Hub::new(HubParams {
        config,
        dirty_tx,
        disconnect_tx,
    }));
    info!("Hub initialized");

    // Rehydrate the account store, then materialize default rooms.
    let store = SnapshotStore::open(&data_dir, mirror)
        .map_err(|e| anyhow::anyhow!("failed to open snapshot store: {e}"))?;
    let (accounts, sessions) = store.load();
    hub.accounts.load(accounts, sessions);
    hub.channels.seed_defaults();
    info!(channels = hub.channels.count(), "Defaults seeded");

    // Graceful shutdown on SIGINT/SIGTERM: tell every client, then signal
    // all tasks (the snapshot writer flushes on this signal).
    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
                _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
            }

            hub.fabric.emit_all(&Frame::new(
                event::SERVER_SHUTDOWN,
                serde_json::json!({ "reason": "server shutting down" }),
            ));
            hub.lifecycle.signal_shutdown();
        });
    }

    // Snapshot writer (debounced, retrying, flushes on shutdown).
    {
        let accounts = hub.accounts.clone();
        let shutdown_rx = hub.lifecycle.subscribe_shutdown();
        tokio::spawn(run_snapshot_writer(
            accounts,
            store,
            debounce,
            dirty_rx,
            shutdown_rx,
        ));
    }
    info!("Snapshot writer started");

    // Disconnect worker: performs teardown outside whatever context asked
    // for it. Dropping the fabric sender ends the connection task itself.
    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            while let Some((conn_id, reason)) = disconnect_rx.recv().await {
                hub.teardown_connection(&conn_id, Some(reason));
            }
        });
    }

    // Maintenance sweep: expired bans, expired sessions, rate limiter
    // storage (every 60 s).
    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut shutdown_rx = hub.lifecycle.subscribe_shutdown();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let bans = hub.presence.sweep_expired_bans(Hub::now_ms());
                        let sessions = hub.accounts.sweep_expired_sessions();
                        hub.security.rate_limiter.cleanup();
                        if bans > 0 || sessions > 0 {
                            info!(bans, sessions, "maintenance sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }
    info!("Maintenance sweep started");

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the endpoint (used by tests).
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(http::run_metrics_server(metrics_port));
        info!(port = metrics_port, "Metrics endpoint started");
    }

    // HTTP surface (health, stats, RTMP hooks).
    tokio::spawn(http::run_http_server(Arc::clone(&hub)));

    // Client gateway.
    let registry = Arc::new(Registry::new());
    let gateway = Gateway::bind(Arc::clone(&hub), registry).await?;
    gateway.run().await?;

    info!("Gateway stopped, waiting for tasks to finish...");
    // Give connection tasks and the snapshot flush a moment to complete.
    tokio::time::sleep(Duration::from_millis(500)).await;

    Ok(())
}
