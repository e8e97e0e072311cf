//! Runtime statistics manager.
//!
//! Atomic counters backing `GET /api/stats`. Relaxed ordering throughout;
//! exact consistency is not required for statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Manages server runtime statistics.
#[derive(Debug)]
pub struct StatsManager {
    connected: AtomicUsize,
    connections_total: AtomicUsize,
    peak_connections: AtomicUsize,
    channels: AtomicUsize,
    messages_total: AtomicUsize,
    started_at: Instant,
}

/// Snapshot for the stats endpoint.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub connected: usize,
    pub connections_total: usize,
    pub peak_connections: usize,
    pub channels: usize,
    pub messages_total: usize,
    pub uptime_secs: u64,
}

impl StatsManager {
    pub fn new() -> Self {
        Self {
            connected: AtomicUsize::new(0),
            connections_total: AtomicUsize::new(0),
            peak_connections: AtomicUsize::new(0),
            channels: AtomicUsize::new(0),
            messages_total: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a connection. Returns the new live count.
    pub fn client_connected(&self) -> usize {
        let new = self.connected.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        let mut peak = self.peak_connections.load(Ordering::Relaxed);
        while new > peak {
            match self.peak_connections.compare_exchange_weak(
                peak,
                new,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        new
    }

    pub fn client_disconnected(&self) {
        self.connected.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn channel_created(&self) {
        self.channels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_destroyed(&self) {
        self.channels.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_accepted(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
            channels: self.channels.load(Ordering::Relaxed),
            messages_total: self.messages_total.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for StatsManager {
    fn default() -> Self {
        Self::new()
    }
}
