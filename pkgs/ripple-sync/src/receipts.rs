//! Read receipts.

use ripple_store::{DocPath, DocumentStore, Fields};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Message;

/// Mark every message from the other participant that the local user has not
/// acknowledged yet. All updates go out as one atomic batch; each one is a
/// set-union append, so concurrent acknowledgements from both devices of a
/// user converge instead of clobbering each other.
///
/// Failures are logged and swallowed: the messages stay unacknowledged and
/// the next snapshot retries. Returns the number of messages acknowledged.
pub async fn acknowledge_unread(
    store: &dyn DocumentStore,
    chat_id: &str,
    uid: &str,
    messages: &[Message],
) -> usize {
    let writes: Vec<_> = messages
        .iter()
        .filter(|message| message.sender_id != uid && !message.read_by_user(uid))
        .map(|message| {
            (
                DocPath::message(chat_id, &message.id),
                Fields::new().array_union("readBy", vec![Value::from(uid)]),
            )
        })
        .collect();

    if writes.is_empty() {
        return 0;
    }
    let count = writes.len();
    match store.update_batch(writes).await {
        Ok(()) => {
            debug!(chat_id, count, "acknowledged incoming messages");
            count
        }
        Err(err) => {
            warn!(chat_id, %err, "read receipt batch failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ripple_store::{CollectionPath, MemoryStore};
    use serde_json::json;

    use super::*;

    async fn seed_message(store: &MemoryStore, chat_id: &str, sender: &str, text: &str) -> String {
        store
            .add(
                &CollectionPath::messages(chat_id),
                Fields::new()
                    .value("senderId", sender)
                    .value("text", text)
                    .server_timestamp("timestamp")
                    .array_union("readBy", vec![json!(sender)]),
            )
            .await
            .unwrap()
    }

    async fn load_messages(store: &MemoryStore, chat_id: &str) -> Vec<Message> {
        let mut sub = store.subscribe_collection(&CollectionPath::messages(chat_id));
        let snapshot = match sub.events.recv().await.unwrap() {
            ripple_store::SnapshotEvent::Snapshot(s) => s,
            other => panic!("unexpected event: {other:?}"),
        };
        snapshot
            .docs
            .iter()
            .map(|(id, doc)| Message::from_document(id, doc).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn acknowledges_only_unread_incoming_messages() {
        let store = Arc::new(MemoryStore::new());
        seed_message(&store, "a-b", "b", "from partner").await;
        seed_message(&store, "a-b", "a", "own message").await;

        let messages = load_messages(&store, "a-b").await;
        let acked = acknowledge_unread(store.as_ref(), "a-b", "a", &messages).await;
        assert_eq!(acked, 1);

        let after = load_messages(&store, "a-b").await;
        for message in &after {
            assert!(message.read_by_user("a"));
        }
        // Own messages never gain the sender twice or get re-written.
        let own = after.iter().find(|m| m.sender_id == "a").unwrap();
        assert_eq!(own.read_by, vec!["a"]);

        let again = acknowledge_unread(store.as_ref(), "a-b", "a", &after).await;
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn batch_failure_is_swallowed_and_retried_next_time() {
        let store = Arc::new(MemoryStore::new());
        seed_message(&store, "a-b", "b", "hello").await;

        let messages = load_messages(&store, "a-b").await;
        store.fail_next_batch();
        let acked = acknowledge_unread(store.as_ref(), "a-b", "a", &messages).await;
        assert_eq!(acked, 0);

        let still_unread = load_messages(&store, "a-b").await;
        assert!(!still_unread[0].read_by_user("a"));

        let retried = acknowledge_unread(store.as_ref(), "a-b", "a", &still_unread).await;
        assert_eq!(retried, 1);
    }
}
