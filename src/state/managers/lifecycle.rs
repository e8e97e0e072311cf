//! Lifecycle management: shutdown signaling and forced disconnects.
//!
//! Registries and the broadcast fabric must never await a connection task.
//! When they need one gone (ban, account disable, slow subscriber) they
//! enqueue a request here; a dedicated worker performs the teardown.

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Why a connection is being force-closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Banned,
    AccountDisabled,
    SlowSubscriber,
    ServerShutdown,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banned => "banned",
            Self::AccountDisabled => "account_disabled",
            Self::SlowSubscriber => "slow_subscriber",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

/// Lifecycle management state.
pub struct LifecycleManager {
    /// Broadcast to every long-running task on shutdown.
    pub shutdown_tx: broadcast::Sender<()>,
    disconnect_tx: mpsc::Sender<(String, DropReason)>,
}

impl LifecycleManager {
    pub fn new(disconnect_tx: mpsc::Sender<(String, DropReason)>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            disconnect_tx,
        }
    }

    /// Request that a connection be torn down.
    ///
    /// Non-blocking: uses `try_send` so it is safe from inside any lock or
    /// emit path. A full queue drops the request; the periodic sweep or the
    /// next emit failure will retry.
    pub fn request_disconnect(&self, conn_id: &str, reason: DropReason) {
        if let Err(e) = self
            .disconnect_tx
            .try_send((conn_id.to_string(), reason))
        {
            warn!(conn_id, reason = reason.as_str(), error = %e, "disconnect queue full, dropping request");
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnect_request_is_delivered() {
        let (tx, mut rx) = mpsc::channel(4);
        let lifecycle = LifecycleManager::new(tx);
        lifecycle.request_disconnect("k1", DropReason::Banned);
        let (conn, reason) = rx.recv().await.unwrap();
        assert_eq!(conn, "k1");
        assert_eq!(reason, DropReason::Banned);
    }

    #[tokio::test]
    async fn full_queue_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let lifecycle = LifecycleManager::new(tx);
        lifecycle.request_disconnect("k1", DropReason::SlowSubscriber);
        // Queue is full now; this must return immediately without panicking.
        lifecycle.request_disconnect("k2", DropReason::SlowSubscriber);
    }
}
