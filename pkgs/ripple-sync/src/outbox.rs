//! Outbound mutations: sending and editing messages, plus the denormalized
//! conversation metadata they maintain.

use ripple_store::{CollectionPath, DocPath, DocumentStore, Fields};
use serde_json::Value;
use tracing::debug;

use crate::chat_id::partner_of;
use crate::error::SyncError;
use crate::model::Message;
use crate::presence::touch_last_seen;

/// The last-message summary keeps at most this many characters of the text.
pub const LAST_MESSAGE_PREVIEW_LEN: usize = 200;

fn preview(text: &str) -> String {
    text.chars().take(LAST_MESSAGE_PREVIEW_LEN).collect()
}

/// Merge-write the conversation metadata document: membership, activity
/// timestamp and the last-message summary. Safe to run on every mutation;
/// merge semantics keep fields other writers own intact.
async fn upsert_chat_meta(
    store: &dyn DocumentStore,
    chat_id: &str,
    uid: &str,
    text: &str,
) -> Result<(), SyncError> {
    let mut members = vec![Value::from(uid)];
    if let Some(partner) = partner_of(chat_id, uid) {
        members.push(Value::from(partner));
    }
    store
        .set_merge(
            &DocPath::chat(chat_id),
            Fields::new()
                .value("members", Value::Array(members))
                .server_timestamp("updatedAt")
                .map(
                    "lastMessage",
                    Fields::new()
                        .value("text", preview(text))
                        .value("senderId", uid)
                        .server_timestamp("timestamp"),
                ),
        )
        .await?;
    Ok(())
}

/// Sender identity attached to outgoing messages.
#[derive(Debug, Clone)]
pub struct Sender<'a> {
    pub uid: &'a str,
    pub display_name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
}

/// Append a message to the conversation. Blank text is a silent no-op. The
/// sender starts in the acknowledgement set so their own message never counts
/// as unseen. Returns the new message id, or `None` for a no-op.
pub(crate) async fn send_message(
    store: &dyn DocumentStore,
    chat_id: &str,
    sender: Sender<'_>,
    text: &str,
) -> Result<Option<String>, SyncError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    upsert_chat_meta(store, chat_id, sender.uid, text).await?;

    let mut fields = Fields::new()
        .value("senderId", sender.uid)
        .value("text", text)
        .server_timestamp("timestamp")
        .value("readBy", Value::Array(vec![Value::from(sender.uid)]));
    if let Some(name) = sender.display_name {
        fields = fields.value("senderName", name);
    }
    if let Some(avatar) = sender.avatar_url {
        fields = fields.value("avatar", avatar);
    }

    let id = store.add(&CollectionPath::messages(chat_id), fields).await?;
    debug!(chat_id, message_id = id, "message sent");

    touch_last_seen(store, sender.uid).await;
    Ok(Some(id))
}

/// Replace the text of an existing message the user sent.
///
/// The record keeps its creation timestamp and so its ordering position;
/// only `text`, the `edited` flag and `updatedAt` change. Ownership is
/// re-validated against the stored record, not the caller's belief.
pub(crate) async fn edit_message(
    store: &dyn DocumentStore,
    chat_id: &str,
    uid: &str,
    message_id: &str,
    text: &str,
) -> Result<(), SyncError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::EmptyMessage);
    }

    let path = DocPath::message(chat_id, message_id);
    let doc = store
        .get(&path)
        .await?
        .ok_or_else(|| SyncError::MessageNotFound(message_id.to_string()))?;
    let stored = Message::from_document(message_id, &doc)
        .map_err(|_| SyncError::MessageNotFound(message_id.to_string()))?;
    if stored.sender_id != uid {
        return Err(SyncError::NotMessageSender);
    }

    upsert_chat_meta(store, chat_id, uid, text).await?;
    store
        .update(
            &path,
            Fields::new()
                .value("text", text)
                .value("edited", true)
                .server_timestamp("updatedAt"),
        )
        .await?;
    debug!(chat_id, message_id, "message edited");

    touch_last_seen(store, uid).await;
    Ok(())
}
