//! Chat message entity.

use std::collections::BTreeSet;

use hearth_proto::Role;
use hearth_proto::types::ChatMessageView;

/// A chat record in a channel's ring.
///
/// Soft-deleted records stay in the ring (with their text withheld from
/// views) until eviction; overflow past the ring depth drops records
/// outright.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub from_conn_id: String,
    pub from_name: String,
    pub text: String,
    pub ts: i64,
    /// Sender's roles at send time.
    pub roles: BTreeSet<Role>,
    pub is_superuser: bool,
    pub edited: bool,
    pub deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<i64>,
}

impl ChatMessage {
    /// Wire view; deleted records carry empty text.
    pub fn to_view(&self) -> ChatMessageView {
        ChatMessageView {
            id: self.id.clone(),
            channel_id: self.channel_id.clone(),
            from: self.from_conn_id.clone(),
            from_name: self.from_name.clone(),
            text: if self.deleted {
                String::new()
            } else {
                self.text.clone()
            },
            ts: self.ts,
            roles: self.roles.iter().copied().collect(),
            is_superuser: self.is_superuser,
            deleted: self.deleted,
            deleted_by: self.deleted_by.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_view_withholds_text() {
        let msg = ChatMessage {
            id: "m1".into(),
            channel_id: "c1".into(),
            from_conn_id: "k1".into(),
            from_name: "A".into(),
            text: "secret".into(),
            ts: 1,
            roles: BTreeSet::new(),
            is_superuser: false,
            edited: false,
            deleted: true,
            deleted_by: Some("Mod".into()),
            deleted_at: Some(2),
        };
        let view = msg.to_view();
        assert!(view.text.is_empty());
        assert!(view.deleted);
        assert_eq!(view.deleted_by.as_deref(), Some("Mod"));
    }
}
