//! Broadcast fabric - room-indexed fan-out to per-connection queues.
//!
//! Frames are serialized once and shared as `Arc<str>` across subscribers.
//! Enqueueing never blocks: a full outbound queue marks the connection slow
//! and requests its disconnect through the lifecycle queue.
//!
//! Ordering: each room holds a mutex across the enqueue loop, so all
//! subscribers of one room observe that room's events in the same order. A
//! connection's queue preserves server enqueue order. Nothing is guaranteed
//! across rooms or across connections.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use hearth_proto::Frame;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::state::managers::lifecycle::DropReason;

/// A pre-serialized outbound frame.
pub type OutboundFrame = Arc<str>;

/// Room membership and per-connection outbound senders.
pub struct Fabric {
    senders: DashMap<String, mpsc::Sender<OutboundFrame>>,
    rooms: DashMap<String, Mutex<HashSet<String>>>,
    disconnect_tx: mpsc::Sender<(String, DropReason)>,
}

impl Fabric {
    pub fn new(disconnect_tx: mpsc::Sender<(String, DropReason)>) -> Self {
        Self {
            senders: DashMap::new(),
            rooms: DashMap::new(),
            disconnect_tx,
        }
    }

    /// Register a connection's outbound queue.
    pub fn register(&self, conn_id: &str, sender: mpsc::Sender<OutboundFrame>) {
        self.senders.insert(conn_id.to_string(), sender);
    }

    /// Remove a connection from the fabric and every room.
    pub fn unregister(&self, conn_id: &str) {
        self.senders.remove(conn_id);
        for room in self.rooms.iter() {
            room.value().lock().remove(conn_id);
        }
    }

    /// Subscribe a connection to a room. Returns `false` when the
    /// connection has no registered sender (it is already gone).
    pub fn subscribe(&self, room: &str, conn_id: &str) -> bool {
        if !self.senders.contains_key(conn_id) {
            return false;
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .lock()
            .insert(conn_id.to_string());
        true
    }

    pub fn unsubscribe(&self, room: &str, conn_id: &str) {
        if let Some(entry) = self.rooms.get(room) {
            entry.value().lock().remove(conn_id);
        }
    }

    /// Drop a room entirely (channel deletion).
    pub fn drop_room(&self, room: &str) {
        self.rooms.remove(room);
    }

    pub fn room_members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|entry| entry.value().lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    fn serialize(frame: &Frame) -> OutboundFrame {
        Arc::from(frame.encode().as_str())
    }

    fn enqueue(&self, conn_id: &str, payload: OutboundFrame) {
        let Some(sender) = self.senders.get(conn_id) else {
            return;
        };
        if sender.try_send(payload).is_err() {
            debug!(conn_id, "outbound queue full, dropping slow subscriber");
            crate::metrics::SLOW_DROPS.inc();
            let _ = self
                .disconnect_tx
                .try_send((conn_id.to_string(), DropReason::SlowSubscriber));
        }
    }

    /// Emit to every subscriber of a room.
    pub fn emit_room(&self, room: &str, frame: &Frame) {
        let Some(entry) = self.rooms.get(room) else {
            return;
        };
        let payload = Self::serialize(frame);
        crate::metrics::EVENTS_BROADCAST.inc();
        trace!(room, event = %frame.event, "room broadcast");
        // Hold the room lock across the enqueue loop so concurrent emitters
        // cannot interleave differently for different subscribers.
        let members = entry.value().lock();
        for conn_id in members.iter() {
            self.enqueue(conn_id, payload.clone());
        }
    }

    /// Emit to every subscriber of a room except one connection.
    pub fn emit_room_except(&self, room: &str, except: &str, frame: &Frame) {
        let Some(entry) = self.rooms.get(room) else {
            return;
        };
        let payload = Self::serialize(frame);
        crate::metrics::EVENTS_BROADCAST.inc();
        let members = entry.value().lock();
        for conn_id in members.iter().filter(|id| id.as_str() != except) {
            self.enqueue(conn_id, payload.clone());
        }
    }

    /// Emit to a single connection.
    pub fn emit_conn(&self, conn_id: &str, frame: &Frame) {
        self.enqueue(conn_id, Self::serialize(frame));
    }

    /// Emit to every registered connection (presence, channel snapshots,
    /// shutdown).
    pub fn emit_all(&self, frame: &Frame) {
        let payload = Self::serialize(frame);
        crate::metrics::EVENTS_BROADCAST.inc();
        for entry in self.senders.iter() {
            self.enqueue(entry.key(), payload.clone());
        }
    }

    /// Emit to every connection of a given set (e.g. all connections of one
    /// account).
    pub fn emit_many(&self, conn_ids: &[String], frame: &Frame) {
        let payload = Self::serialize(frame);
        for conn_id in conn_ids {
            self.enqueue(conn_id, payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fabric() -> (Fabric, mpsc::Receiver<(String, DropReason)>) {
        let (tx, rx) = mpsc::channel(16);
        (Fabric::new(tx), rx)
    }

    fn connect(fabric: &Fabric, conn_id: &str, depth: usize) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(depth);
        fabric.register(conn_id, tx);
        rx
    }

    #[tokio::test]
    async fn room_fanout_reaches_all_subscribers() {
        let (fabric, _drops) = fabric();
        let mut rx_a = connect(&fabric, "ka", 8);
        let mut rx_b = connect(&fabric, "kb", 8);
        let _rx_c = connect(&fabric, "kc", 8);
        assert!(fabric.subscribe("room1", "ka"));
        assert!(fabric.subscribe("room1", "kb"));

        fabric.emit_room("room1", &Frame::new("chat", json!({"text": "hi"})));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn emit_room_except_skips_sender() {
        let (fabric, _drops) = fabric();
        let mut rx_a = connect(&fabric, "ka", 8);
        let mut rx_b = connect(&fabric, "kb", 8);
        fabric.subscribe("room1", "ka");
        fabric.subscribe("room1", "kb");

        fabric.emit_room_except("room1", "ka", &Frame::bare("voice:peer-leave"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn per_connection_order_is_preserved() {
        let (fabric, _drops) = fabric();
        let mut rx = connect(&fabric, "ka", 8);
        fabric.subscribe("room1", "ka");
        for i in 0..3 {
            fabric.emit_room("room1", &Frame::new("chat", json!({"seq": i})));
        }
        for i in 0..3 {
            let raw = rx.try_recv().unwrap();
            let frame = Frame::decode(&raw).unwrap();
            assert_eq!(frame.data["seq"], i);
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_reported() {
        let (fabric, mut drops) = fabric();
        let _rx = connect(&fabric, "ka", 1);
        fabric.subscribe("room1", "ka");
        fabric.emit_room("room1", &Frame::bare("one"));
        fabric.emit_room("room1", &Frame::bare("two")); // queue full now
        let (conn, reason) = drops.recv().await.unwrap();
        assert_eq!(conn, "ka");
        assert_eq!(reason, DropReason::SlowSubscriber);
    }

    #[tokio::test]
    async fn unregister_removes_from_rooms() {
        let (fabric, _drops) = fabric();
        let _rx = connect(&fabric, "ka", 8);
        fabric.subscribe("room1", "ka");
        fabric.unregister("ka");
        assert!(fabric.room_members("room1").is_empty());
        // Subscribing without a sender fails.
        assert!(!fabric.subscribe("room1", "ka"));
    }
}
