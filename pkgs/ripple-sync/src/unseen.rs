//! Chat list with per-conversation unseen counts.
//!
//! One outer subscription follows every conversation the user is a member
//! of; each outer snapshot rebuilds a generation of nested per-conversation
//! message subscriptions. Counts are recomputed from full snapshots, never
//! incremented, so replays and re-deliveries cannot drift them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ripple_store::{
    CollectionPath, CollectionSnapshot, DocPath, DocumentStore, SnapshotEvent, StoreError,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{ChatMeta, Profile};
use crate::timeline::decode_messages;
use crate::watch::{Watcher, WatcherSet};

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatListEntry {
    pub chat_id: String,
    pub partner: Profile,
    pub unseen: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Events from a chat-list subscription.
#[derive(Debug, Clone)]
pub enum ChatListEvent {
    List(Vec<ChatListEntry>),
    /// Terminal failure of the membership stream; no further events follow.
    Error(StoreError),
}

/// Messages from the partner the local user has not acknowledged.
fn count_unseen(snapshot: &CollectionSnapshot, uid: &str) -> u64 {
    decode_messages(snapshot)
        .iter()
        .filter(|message| message.sender_id != uid && !message.read_by_user(uid))
        .count() as u64
}

struct ChatRow {
    partner: Profile,
    unseen: u64,
    updated_at: Option<DateTime<Utc>>,
}

fn render(rows: &HashMap<String, ChatRow>) -> Vec<ChatListEntry> {
    let mut entries: Vec<ChatListEntry> = rows
        .iter()
        .map(|(chat_id, row)| ChatListEntry {
            chat_id: chat_id.clone(),
            partner: row.partner.clone(),
            unseen: row.unseen,
            updated_at: row.updated_at,
        })
        .collect();
    // Most recently active first; id as a stable tiebreak.
    entries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.chat_id.cmp(&b.chat_id))
    });
    entries
}

/// Watch every conversation `uid` belongs to and keep a live chat list with
/// unseen counts.
pub(crate) fn spawn_chat_list_watcher(
    store: Arc<dyn DocumentStore>,
    uid: String,
) -> (Watcher, mpsc::UnboundedReceiver<ChatListEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut chats_sub =
        store.subscribe_where(&CollectionPath::chats(), "members", uid.clone().into());
    let handles = vec![chats_sub.handle.clone()];

    let task = tokio::spawn(async move {
        let mut rows: HashMap<String, ChatRow> = HashMap::new();
        let mut nested = WatcherSet::default();
        let (counts_tx, mut counts_rx) =
            mpsc::unbounded_channel::<(String, SnapshotEvent<CollectionSnapshot>)>();

        loop {
            tokio::select! {
                event = chats_sub.events.recv() => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        let metas: Vec<ChatMeta> = snapshot
                            .docs
                            .iter()
                            .map(|(id, doc)| ChatMeta::from_document(id, doc))
                            .collect();

                        // The old generation goes down before the new one
                        // comes up so no conversation is counted twice.
                        nested.cancel_all();

                        let mut next: HashMap<String, ChatRow> = HashMap::new();
                        for meta in metas {
                            let Some(partner_id) = meta.partner(&uid).map(str::to_string) else {
                                debug!(chat_id = meta.id, "skipping chat without a partner");
                                continue;
                            };
                            let partner = match store.get(&DocPath::user(&partner_id)).await {
                                Ok(Some(doc)) => Profile::from_document(&partner_id, &doc),
                                Ok(None) => Profile::missing(&partner_id),
                                Err(err) => {
                                    warn!(partner_id, %err, "partner profile fetch failed");
                                    Profile::missing(&partner_id)
                                }
                            };
                            let unseen = rows.get(&meta.id).map(|row| row.unseen).unwrap_or(0);
                            next.insert(
                                meta.id.clone(),
                                ChatRow {
                                    partner,
                                    unseen,
                                    updated_at: meta.updated_at,
                                },
                            );

                            let mut sub =
                                store.subscribe_collection(&CollectionPath::messages(&meta.id));
                            let handle = sub.handle.clone();
                            let forward = counts_tx.clone();
                            let chat_id = meta.id.clone();
                            let forwarder = tokio::spawn(async move {
                                while let Some(event) = sub.events.recv().await {
                                    if forward.send((chat_id.clone(), event)).is_err() {
                                        break;
                                    }
                                }
                            });
                            nested.push(Watcher::new(vec![handle], forwarder));
                        }
                        rows = next;

                        if tx.send(ChatListEvent::List(render(&rows))).is_err() {
                            break;
                        }
                    }
                    Some(SnapshotEvent::Error(err)) => {
                        warn!(uid, %err, "chat membership stream failed");
                        nested.cancel_all();
                        let _ = tx.send(ChatListEvent::Error(err));
                        break;
                    }
                    None => {
                        nested.cancel_all();
                        break;
                    }
                },
                Some((chat_id, event)) = counts_rx.recv() => {
                    // Events from a cancelled generation may still be queued;
                    // unknown chats are simply ignored.
                    let Some(row) = rows.get_mut(&chat_id) else {
                        continue;
                    };
                    match event {
                        SnapshotEvent::Snapshot(snapshot) => {
                            let unseen = count_unseen(&snapshot, &uid);
                            if unseen != row.unseen {
                                row.unseen = unseen;
                                if tx.send(ChatListEvent::List(render(&rows))).is_err() {
                                    break;
                                }
                            }
                        }
                        SnapshotEvent::Error(err) => {
                            // The count freezes at its last value; the next
                            // membership snapshot rebuilds the subscription.
                            warn!(chat_id, %err, "unseen count stream failed");
                        }
                    }
                }
            }
        }
    });

    (Watcher::new(handles, task), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(docs: Vec<(&str, serde_json::Value)>) -> CollectionSnapshot {
        CollectionSnapshot {
            docs: docs
                .into_iter()
                .map(|(id, value)| (id.to_string(), value.as_object().cloned().unwrap()))
                .collect(),
        }
    }

    #[test]
    fn unseen_counts_unacknowledged_partner_messages_only() {
        let snap = snapshot(vec![
            (
                "m1",
                json!({ "senderId": "b", "text": "hi", "timestamp": 1_000, "readBy": ["b"] }),
            ),
            (
                "m2",
                json!({ "senderId": "b", "text": "again", "timestamp": 2_000, "readBy": ["b", "a"] }),
            ),
            (
                "m3",
                json!({ "senderId": "a", "text": "mine", "timestamp": 3_000, "readBy": ["a"] }),
            ),
            (
                "m4",
                json!({ "senderId": "a", "text": "seen", "timestamp": 4_000, "readBy": ["a", "b"] }),
            ),
        ]);
        // For "a": m1 is unread, m2 acknowledged, m3/m4 are own messages.
        assert_eq!(count_unseen(&snap, "a"), 1);
        // For "b": m3 is unread, m4 acknowledged, m1/m2 are own messages.
        assert_eq!(count_unseen(&snap, "b"), 1);
    }
}
