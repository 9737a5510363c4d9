//! Typing indicators and last-seen presence.
//!
//! The local side publishes typing state with an inactivity debounce; the
//! remote side is observed by merging the partner's typing document and
//! profile document into one view stream. All presence writes are
//! best-effort: a failed write is logged and dropped, never surfaced.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ripple_store::{DocPath, DocumentStore, Fields, SnapshotEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::model::{Profile, TypingState};
use crate::watch::Watcher;

/// Inactivity gap after the last keystroke before typing is retracted.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(1500);

/// What the local user sees of the partner's presence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresenceView {
    pub is_typing: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Best-effort bump of the user's own `lastSeen` marker.
pub(crate) async fn touch_last_seen(store: &dyn DocumentStore, uid: &str) {
    let write = store
        .set_merge(&DocPath::user(uid), Fields::new().server_timestamp("lastSeen"))
        .await;
    if let Err(err) = write {
        warn!(uid, %err, "last-seen update failed");
    }
}

/// Write the local typing flag for one conversation. Every typing write
/// also bumps the writer's own last-seen marker, both transitions.
pub(crate) async fn publish_typing(store: &dyn DocumentStore, chat_id: &str, uid: &str, typing: bool) {
    let write = store
        .set_merge(
            &DocPath::typing(chat_id, uid),
            Fields::new()
                .value("isTyping", typing)
                .server_timestamp("updatedAt"),
        )
        .await;
    if let Err(err) = write {
        warn!(chat_id, typing, %err, "typing update failed");
    }
    touch_last_seen(store, uid).await;
}

struct PublisherInner {
    store: Arc<dyn DocumentStore>,
    chat_id: String,
    uid: String,
    is_typing: Mutex<bool>,
}

impl PublisherInner {
    /// Publish a typing transition. Deduplicates: re-asserting the current
    /// state writes nothing.
    async fn publish(&self, typing: bool) {
        {
            let mut current = self.is_typing.lock();
            if *current == typing {
                return;
            }
            *current = typing;
        }
        publish_typing(self.store.as_ref(), &self.chat_id, &self.uid, typing).await;
    }
}

/// Publishes the local user's typing state for one conversation.
///
/// Feed it every input change; it asserts typing on the first non-blank
/// keystroke and retracts it after [`TYPING_DEBOUNCE`] of inactivity, when
/// the input empties, or on an explicit stop. Each keystroke resets the
/// debounce timer.
pub struct TypingPublisher {
    inner: Arc<PublisherInner>,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

impl TypingPublisher {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, chat_id: String, uid: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                store,
                chat_id,
                uid,
                is_typing: Mutex::new(false),
            }),
            debounce: Mutex::new(None),
        }
    }

    /// React to the input field changing to `text`.
    pub async fn input_changed(&self, text: &str) {
        let typing = !text.trim().is_empty();
        self.inner.publish(typing).await;

        let mut slot = self.debounce.lock();
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        if typing {
            let inner = Arc::clone(&self.inner);
            *slot = Some(tokio::spawn(async move {
                tokio::time::sleep(TYPING_DEBOUNCE).await;
                inner.publish(false).await;
            }));
        }
    }

    /// Retract typing immediately (message sent, focus lost, view closed).
    pub async fn stop(&self) {
        if let Some(pending) = self.debounce.lock().take() {
            pending.abort();
        }
        self.inner.publish(false).await;
    }
}

impl Drop for TypingPublisher {
    fn drop(&mut self) {
        if let Some(pending) = self.debounce.lock().take() {
            pending.abort();
        }
    }
}

/// Observe the partner's typing flag and last-seen marker as one merged
/// stream. The channel closes once both underlying streams terminate.
pub(crate) fn spawn_presence_watcher(
    store: Arc<dyn DocumentStore>,
    chat_id: String,
    partner_id: String,
) -> (Watcher, mpsc::UnboundedReceiver<PresenceView>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut typing_sub = store.subscribe_document(&DocPath::typing(&chat_id, &partner_id));
    let mut profile_sub = store.subscribe_document(&DocPath::user(&partner_id));
    let handles = vec![typing_sub.handle.clone(), profile_sub.handle.clone()];

    let task = tokio::spawn(async move {
        let mut view = PresenceView::default();
        let mut typing_open = true;
        let mut profile_open = true;

        while typing_open || profile_open {
            tokio::select! {
                event = typing_sub.events.recv(), if typing_open => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        view.is_typing =
                            TypingState::from_document(snapshot.doc.as_ref()).is_typing;
                        if tx.send(view.clone()).is_err() {
                            return;
                        }
                    }
                    Some(SnapshotEvent::Error(err)) => {
                        // Read as idle rather than stuck-on.
                        warn!(chat_id, %err, "typing stream failed");
                        view.is_typing = false;
                        let _ = tx.send(view.clone());
                        typing_open = false;
                    }
                    None => typing_open = false,
                },
                event = profile_sub.events.recv(), if profile_open => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        view.last_seen = snapshot
                            .doc
                            .as_ref()
                            .map(|doc| Profile::from_document(&partner_id, doc).last_seen)
                            .unwrap_or(None);
                        if tx.send(view.clone()).is_err() {
                            return;
                        }
                    }
                    Some(SnapshotEvent::Error(err)) => {
                        warn!(partner_id, %err, "presence profile stream failed");
                        profile_open = false;
                    }
                    None => profile_open = false,
                },
            }
        }
    });

    (Watcher::new(handles, task), rx)
}
