//! The client facade: one object per signed-in user tying identity,
//! subscriptions and mutations together.

use std::sync::Arc;

use parking_lot::Mutex;
use ripple_store::{DocPath, DocumentStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chat_id::conversation_id;
use crate::error::SyncError;
use crate::model::{Message, Profile};
use crate::outbox::{self, Sender};
use crate::presence::{self, PresenceView, TypingPublisher};
use crate::timeline::{self, ConversationEvent};
use crate::unseen::{self, ChatListEvent};
use crate::watch::Watcher;
use crate::{system_clock, EngineClock};

/// The signed-in user's identity as stamped onto outgoing messages.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Session {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// An edit in progress: which message of which conversation the next
/// submission replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub chat_id: String,
    pub message_id: String,
}

/// Synchronization client for one signed-in user.
///
/// All subscriptions hand back a [`Watcher`] that cancels them; dropping the
/// watcher has the same effect.
pub struct ChatClient {
    store: Arc<dyn DocumentStore>,
    session: Session,
    clock: EngineClock,
    edit: Mutex<Option<EditDraft>>,
}

impl ChatClient {
    pub fn new(store: Arc<dyn DocumentStore>, session: Session) -> Self {
        Self::with_clock(store, session, system_clock())
    }

    /// Like [`ChatClient::new`] with an injected time source for the rolling
    /// visibility window.
    pub fn with_clock(store: Arc<dyn DocumentStore>, session: Session, clock: EngineClock) -> Self {
        Self {
            store,
            session,
            clock,
            edit: Mutex::new(None),
        }
    }

    pub fn uid(&self) -> &str {
        &self.session.uid
    }

    /// Canonical id of the conversation between this user and `partner_uid`.
    pub fn chat_id_with(&self, partner_uid: &str) -> String {
        conversation_id(&self.session.uid, partner_uid)
    }

    fn sender(&self) -> Sender<'_> {
        Sender {
            uid: &self.session.uid,
            display_name: self.session.display_name.as_deref(),
            avatar_url: self.session.avatar_url.as_deref(),
        }
    }

    /// Open the conversation with `partner_uid`: an initial loading event,
    /// then a reconciled view after every message change, with the rolling
    /// visibility window applied per the user's stored preference.
    pub async fn subscribe_conversation(
        &self,
        partner_uid: &str,
    ) -> (Watcher, mpsc::UnboundedReceiver<ConversationEvent>) {
        let chat_id = self.chat_id_with(partner_uid);
        let show_old = match self.store.get(&DocPath::user(&self.session.uid)).await {
            Ok(Some(doc)) => Profile::from_document(&self.session.uid, &doc).show_old_chats,
            Ok(None) => false,
            Err(err) => {
                warn!(uid = self.session.uid, %err, "profile prefetch failed");
                false
            }
        };
        debug!(chat_id, show_old, "opening conversation");
        timeline::spawn_conversation_watcher(
            Arc::clone(&self.store),
            self.session.uid.clone(),
            chat_id,
            show_old,
            Arc::clone(&self.clock),
        )
    }

    /// Live chat list with per-conversation unseen counts.
    pub fn subscribe_chat_list(&self) -> (Watcher, mpsc::UnboundedReceiver<ChatListEvent>) {
        unseen::spawn_chat_list_watcher(Arc::clone(&self.store), self.session.uid.clone())
    }

    /// Partner presence for one conversation: typing flag and last-seen.
    pub fn subscribe_presence(
        &self,
        partner_uid: &str,
    ) -> (Watcher, mpsc::UnboundedReceiver<PresenceView>) {
        let chat_id = self.chat_id_with(partner_uid);
        presence::spawn_presence_watcher(
            Arc::clone(&self.store),
            chat_id,
            partner_uid.to_string(),
        )
    }

    /// Typing publisher for the conversation with `partner_uid`.
    pub fn typing_publisher(&self, partner_uid: &str) -> TypingPublisher {
        TypingPublisher::new(
            Arc::clone(&self.store),
            self.chat_id_with(partner_uid),
            self.session.uid.clone(),
        )
    }

    /// Write the typing flag for the conversation with `partner_uid`
    /// directly, bypassing the debounce. Best-effort; bumps the local
    /// user's last-seen marker like any other typing write.
    pub async fn set_typing(&self, partner_uid: &str, typing: bool) {
        let chat_id = self.chat_id_with(partner_uid);
        presence::publish_typing(self.store.as_ref(), &chat_id, &self.session.uid, typing).await;
    }

    /// Send `text` to `partner_uid`. Blank text is a silent no-op. Returns
    /// the new message id, or `None` for a no-op.
    pub async fn send_message(
        &self,
        partner_uid: &str,
        text: &str,
    ) -> Result<Option<String>, SyncError> {
        let chat_id = self.chat_id_with(partner_uid);
        outbox::send_message(self.store.as_ref(), &chat_id, self.sender(), text).await
    }

    /// Rewrite the text of a message this user sent.
    pub async fn edit_message(
        &self,
        partner_uid: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), SyncError> {
        let chat_id = self.chat_id_with(partner_uid);
        outbox::edit_message(
            self.store.as_ref(),
            &chat_id,
            &self.session.uid,
            message_id,
            text,
        )
        .await
    }

    /// Start editing `message` in the conversation with `partner_uid`.
    /// Replaces any previous draft. Only the sender may edit.
    pub fn begin_edit(&self, partner_uid: &str, message: &Message) -> Result<(), SyncError> {
        if message.sender_id != self.session.uid {
            return Err(SyncError::NotMessageSender);
        }
        *self.edit.lock() = Some(EditDraft {
            chat_id: self.chat_id_with(partner_uid),
            message_id: message.id.clone(),
        });
        Ok(())
    }

    pub fn current_edit(&self) -> Option<EditDraft> {
        self.edit.lock().clone()
    }

    pub fn cancel_edit(&self) {
        *self.edit.lock() = None;
    }

    /// Submit the composer: if an edit draft targets this conversation the
    /// draft message is rewritten and the draft cleared, otherwise a new
    /// message is sent. The draft survives a failed edit so the user can
    /// retry.
    pub async fn submit(&self, partner_uid: &str, text: &str) -> Result<(), SyncError> {
        let chat_id = self.chat_id_with(partner_uid);
        let draft = {
            let guard = self.edit.lock();
            guard.clone().filter(|draft| draft.chat_id == chat_id)
        };
        match draft {
            Some(draft) => {
                self.edit_message(partner_uid, &draft.message_id, text).await?;
                let mut guard = self.edit.lock();
                if guard.as_ref() == Some(&draft) {
                    *guard = None;
                }
                Ok(())
            }
            None => self.send_message(partner_uid, text).await.map(|_| ()),
        }
    }
}
