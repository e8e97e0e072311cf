//! Message log - per-channel bounded rings of chat records.
//!
//! Append is O(1) amortized; overflow past the configured depth drops the
//! oldest record outright (no soft-delete for evictions). Deletion by a
//! moderator soft-deletes in place so the record's id stays stable until
//! eviction.

use std::collections::VecDeque;

use dashmap::DashMap;
use hearth_proto::types::ChatMessageView;
use parking_lot::RwLock;

use crate::state::message::ChatMessage;

/// Per-channel chat rings.
pub struct HistoryManager {
    rings: DashMap<String, RwLock<VecDeque<ChatMessage>>>,
    depth: usize,
}

impl HistoryManager {
    pub fn new(depth: usize) -> Self {
        Self {
            rings: DashMap::new(),
            depth,
        }
    }

    /// Append a record, evicting the oldest past the ring depth.
    pub fn append(&self, msg: ChatMessage) {
        let ring = self
            .rings
            .entry(msg.channel_id.clone())
            .or_insert_with(|| RwLock::new(VecDeque::with_capacity(self.depth.min(64))));
        let mut ring = ring.write();
        if ring.len() == self.depth {
            ring.pop_front();
        }
        ring.push_back(msg);
    }

    /// Newest-last history, optionally limited to the last `limit` records.
    pub fn history(&self, channel_id: &str, limit: Option<usize>) -> Vec<ChatMessageView> {
        let Some(ring) = self.rings.get(channel_id) else {
            return Vec::new();
        };
        let ring = ring.read();
        let take = limit.unwrap_or(self.depth).min(ring.len());
        ring.iter()
            .skip(ring.len() - take)
            .map(ChatMessage::to_view)
            .collect()
    }

    /// Soft-delete a record. Returns `false` when the id is unknown (already
    /// evicted or never existed).
    pub fn delete(&self, channel_id: &str, msg_id: &str, actor: &str, now: i64) -> bool {
        let Some(ring) = self.rings.get(channel_id) else {
            return false;
        };
        let mut ring = ring.write();
        match ring.iter_mut().find(|m| m.id == msg_id) {
            Some(msg) => {
                msg.deleted = true;
                msg.deleted_by = Some(actor.to_string());
                msg.deleted_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Case-insensitive substring search over live records, newest-last.
    pub fn search(&self, channel_id: &str, query: &str) -> Vec<ChatMessageView> {
        let needle = query.to_lowercase();
        let Some(ring) = self.rings.get(channel_id) else {
            return Vec::new();
        };
        ring.read()
            .iter()
            .filter(|m| !m.deleted && m.text.to_lowercase().contains(&needle))
            .map(ChatMessage::to_view)
            .collect()
    }

    /// Count of live (non-deleted) records in one channel.
    pub fn live_count(&self, channel_id: &str) -> usize {
        self.rings
            .get(channel_id)
            .map(|ring| ring.read().iter().filter(|m| !m.deleted).count())
            .unwrap_or(0)
    }

    /// Total records across all rings (for stats).
    pub fn total_count(&self) -> usize {
        self.rings.iter().map(|ring| ring.read().len()).sum()
    }

    /// Drop a channel's ring entirely (channel deletion).
    pub fn drop_channel(&self, channel_id: &str) {
        self.rings.remove(channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn msg(id: &str, channel: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            channel_id: channel.into(),
            from_conn_id: "k1".into(),
            from_name: "A".into(),
            text: text.into(),
            ts: 0,
            roles: BTreeSet::new(),
            is_superuser: false,
            edited: false,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
        }
    }

    #[test]
    fn ring_bounds_and_eviction_order() {
        let log = HistoryManager::new(3);
        for i in 0..5 {
            log.append(msg(&format!("m{i}"), "c1", "hi"));
        }
        let history = log.history("c1", None);
        assert_eq!(history.len(), 3);
        // Oldest dropped; ids of kept records untouched.
        let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m3", "m4"]);
    }

    #[test]
    fn history_limit_returns_newest() {
        let log = HistoryManager::new(10);
        for i in 0..6 {
            log.append(msg(&format!("m{i}"), "c1", "hi"));
        }
        let history = log.history("c1", Some(2));
        let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m4", "m5"]);
    }

    #[test]
    fn soft_delete_keeps_record() {
        let log = HistoryManager::new(10);
        log.append(msg("m1", "c1", "offensive"));
        assert!(log.delete("c1", "m1", "Mod", 42));
        let history = log.history("c1", None);
        assert_eq!(history.len(), 1);
        assert!(history[0].deleted);
        assert!(history[0].text.is_empty());
        assert_eq!(log.live_count("c1"), 0);
        // Unknown id reports false.
        assert!(!log.delete("c1", "m9", "Mod", 42));
    }

    #[test]
    fn search_skips_deleted() {
        let log = HistoryManager::new(10);
        log.append(msg("m1", "c1", "Hello World"));
        log.append(msg("m2", "c1", "hello again"));
        log.delete("c1", "m1", "Mod", 0);
        let hits = log.search("c1", "HELLO");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m2");
    }

    #[test]
    fn channels_are_isolated() {
        let log = HistoryManager::new(10);
        log.append(msg("m1", "c1", "one"));
        log.append(msg("m2", "c2", "two"));
        assert_eq!(log.history("c1", None).len(), 1);
        log.drop_channel("c1");
        assert!(log.history("c1", None).is_empty());
        assert_eq!(log.history("c2", None).len(), 1);
    }
}
