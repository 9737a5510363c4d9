//! Client-side conversation synchronization engine.
//!
//! Sits between a real-time document store ([`ripple_store`]) and a
//! presentation layer, and keeps per-user chat state converged:
//!
//! - [`chat_id`]: canonical conversation identifiers for participant pairs
//! - [`model`]: domain records decoded from untrusted remote documents
//! - [`timeline`]: ordered message streams, the rolling visibility window
//!   and calendar-day grouping
//! - [`receipts`]: idempotent read acknowledgements
//! - [`presence`]: typing indicators with debounce, last-seen markers
//! - [`unseen`]: the chat list with live unseen counts
//! - [`outbox`]: message send and edit mutations
//! - [`client`]: the per-user facade tying it together
//!
//! # Architecture
//!
//! Every subscription is a spawned task multiplexing store snapshot streams
//! with `tokio::select!`, owned by a [`watch::Watcher`] whose cancel (or
//! drop) tears the store subscriptions down with it. Views are recomputed
//! from full snapshots rather than patched incrementally, so replays and
//! re-deliveries cannot drift state.

pub mod chat_id;
pub mod client;
pub mod error;
pub mod model;
pub mod outbox;
pub mod presence;
pub mod receipts;
pub mod timeline;
pub mod unseen;
pub mod watch;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use chat_id::{conversation_id, partner_of};
pub use client::{ChatClient, EditDraft, Session};
pub use error::SyncError;
pub use model::{ChatMeta, DecodeError, LastMessage, Message, Profile, TypingState};
pub use outbox::{Sender, LAST_MESSAGE_PREVIEW_LEN};
pub use presence::{PresenceView, TypingPublisher, TYPING_DEBOUNCE};
pub use receipts::acknowledge_unread;
pub use timeline::{
    apply_window, date_label, group_by_day, visibility_window, ConversationEvent,
    ConversationView, DayBucket, REAPER_PERIOD,
};
pub use unseen::{ChatListEntry, ChatListEvent};
pub use watch::Watcher;

/// Time source for the rolling visibility window. Injectable so window
/// behavior is testable without waiting out wall-clock time.
pub type EngineClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The default wall-clock time source.
pub fn system_clock() -> EngineClock {
    Arc::new(Utc::now)
}
