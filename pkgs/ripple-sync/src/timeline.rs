//! Message stream reconciliation: ordering, the rolling visibility window
//! and calendar-day grouping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ripple_store::{
    CollectionPath, CollectionSnapshot, DocPath, DocumentStore, SnapshotEvent, StoreError,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::model::{Message, Profile};
use crate::receipts;
use crate::watch::Watcher;
use crate::EngineClock;

/// Messages older than this are hidden when the rolling window is active.
pub fn visibility_window() -> chrono::Duration {
    chrono::Duration::hours(24)
}

/// Period of the timer that re-applies the rolling window so messages age
/// out of view even without a new store event.
pub const REAPER_PERIOD: Duration = Duration::from_secs(60);

/// Snapshot of one conversation as delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationView {
    pub loading: bool,
    pub messages: Vec<Message>,
}

/// Events from a conversation subscription.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    View(ConversationView),
    /// Terminal subscription failure; no further events follow.
    Error(StoreError),
}

/// Project a raw snapshot into an ordered message list. Malformed records
/// are skipped; ordering never trusts the store's delivery order.
pub(crate) fn decode_messages(snapshot: &CollectionSnapshot) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .docs
        .iter()
        .filter_map(|(id, doc)| match Message::from_document(id, doc) {
            Ok(message) => Some(message),
            Err(reason) => {
                debug!(%id, %reason, "skipping malformed message record");
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    messages
}

/// Apply the visibility preference: everything under "show all", otherwise
/// only messages newer than `now` minus the rolling window.
pub fn apply_window(messages: &[Message], show_old: bool, now: DateTime<Utc>) -> Vec<Message> {
    if show_old {
        return messages.to_vec();
    }
    let cutoff = now - visibility_window();
    messages
        .iter()
        .filter(|message| message.timestamp > cutoff)
        .cloned()
        .collect()
}

/// "Today", "Yesterday", or a formatted calendar date such as
/// "August 18, 2025".
pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%B %-d, %Y").to_string()
    }
}

/// Messages of one calendar day, labelled for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub label: String,
    pub messages: Vec<Message>,
}

/// Bucket an ordered message list by calendar day in `tz`, oldest bucket
/// first. Pure; derived entirely from the reconciled list.
pub fn group_by_day<Tz: TimeZone>(
    messages: &[Message],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = Vec::new();
    for message in messages {
        let date = message.timestamp.with_timezone(tz).date_naive();
        match buckets.last_mut() {
            Some(bucket) if bucket.date == date => bucket.messages.push(message.clone()),
            _ => buckets.push(DayBucket {
                date,
                label: date_label(date, today),
                messages: vec![message.clone()],
            }),
        }
    }
    buckets
}

/// Drive one conversation: reconcile every message snapshot, acknowledge
/// incoming messages, follow the local visibility preference live, and age
/// messages out of the window on a fixed timer.
pub(crate) fn spawn_conversation_watcher(
    store: Arc<dyn DocumentStore>,
    uid: String,
    chat_id: String,
    show_old_initial: bool,
    clock: EngineClock,
) -> (Watcher, mpsc::UnboundedReceiver<ConversationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(ConversationEvent::View(ConversationView {
        loading: true,
        messages: Vec::new(),
    }));

    let mut messages_sub = store.subscribe_collection(&CollectionPath::messages(&chat_id));
    let mut profile_sub = store.subscribe_document(&DocPath::user(&uid));
    let handles = vec![messages_sub.handle.clone(), profile_sub.handle.clone()];

    let task = tokio::spawn(async move {
        let mut show_old = show_old_initial;
        let mut all: Vec<Message> = Vec::new();
        let mut visible: Vec<Message> = Vec::new();
        let mut loaded = false;
        let mut profile_open = true;
        let mut reaper =
            tokio::time::interval_at(tokio::time::Instant::now() + REAPER_PERIOD, REAPER_PERIOD);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let view = |messages: &[Message]| {
            ConversationEvent::View(ConversationView {
                loading: false,
                messages: messages.to_vec(),
            })
        };

        loop {
            tokio::select! {
                event = messages_sub.events.recv() => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        all = decode_messages(&snapshot);
                        // Receipts run on the unfiltered list so messages
                        // hidden by the window still get acknowledged.
                        receipts::acknowledge_unread(store.as_ref(), &chat_id, &uid, &all).await;
                        visible = apply_window(&all, show_old, (clock)());
                        loaded = true;
                        if tx.send(view(&visible)).is_err() {
                            break;
                        }
                    }
                    Some(SnapshotEvent::Error(err)) => {
                        warn!(chat_id, %err, "message stream failed");
                        let _ = tx.send(ConversationEvent::Error(err));
                        break;
                    }
                    None => break,
                },
                event = profile_sub.events.recv(), if profile_open => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        let prefer = snapshot
                            .doc
                            .as_ref()
                            .map(|doc| Profile::from_document(&uid, doc).show_old_chats)
                            .unwrap_or(false);
                        if prefer != show_old {
                            show_old = prefer;
                            if loaded {
                                visible = apply_window(&all, show_old, (clock)());
                                if tx.send(view(&visible)).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(SnapshotEvent::Error(err)) => {
                        // The preference freezes at its last known value.
                        warn!(uid, %err, "profile stream failed");
                        profile_open = false;
                    }
                    None => profile_open = false,
                },
                _ = reaper.tick() => {
                    if loaded && !show_old {
                        let next = apply_window(&all, false, (clock)());
                        if next.len() != visible.len() {
                            visible = next;
                            if tx.send(view(&visible)).is_err() {
                                break;
                            }
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

    fn message(id: &str, ts_ms: i64) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "u1".to_string(),
            text: "hi".to_string(),
            timestamp: Utc.timestamp_millis_opt(ts_ms).unwrap(),
            sender_name: None,
            avatar: None,
            read_by: vec!["u1".to_string()],
            edited: false,
            updated_at: None,
        }
    }

    #[test]
    fn decode_sorts_by_timestamp_and_skips_malformed() {
        let mut late = ripple_store::Document::new();
        late.insert("senderId".into(), json!("u1"));
        late.insert("text".into(), json!("late"));
        late.insert("timestamp".into(), json!(2_000));

        let mut early = ripple_store::Document::new();
        early.insert("senderId".into(), json!("u1"));
        early.insert("text".into(), json!("early"));
        early.insert("timestamp".into(), json!(1_000));

        let mut malformed = ripple_store::Document::new();
        malformed.insert("senderId".into(), json!("u1"));
        malformed.insert("text".into(), json!(77));
        malformed.insert("timestamp".into(), json!(1_500));

        let snapshot = CollectionSnapshot {
            docs: vec![
                ("b".into(), late),
                ("c".into(), malformed),
                ("a".into(), early),
            ],
        };
        let messages = decode_messages(&snapshot);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "early");
        assert_eq!(messages[1].text, "late");
    }

    #[test]
    fn rolling_window_hides_day_old_messages() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let fresh = message("fresh", (now - chrono::Duration::hours(1)).timestamp_millis());
        let stale = message("stale", (now - chrono::Duration::hours(25)).timestamp_millis());
        let all = vec![stale.clone(), fresh.clone()];

        let windowed = apply_window(&all, false, now);
        assert_eq!(windowed, vec![fresh]);

        let everything = apply_window(&all, true, now);
        assert_eq!(everything.len(), 2);
        assert_eq!(everything[0].id, "stale");
    }

    #[test]
    fn labels_follow_the_calendar() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        assert_eq!(date_label(today, today), "Today");
        assert_eq!(
            date_label(NaiveDate::from_ymd_opt(2025, 8, 19).unwrap(), today),
            "Yesterday"
        );
        assert_eq!(
            date_label(NaiveDate::from_ymd_opt(2025, 8, 18).unwrap(), today),
            "August 18, 2025"
        );
    }

    #[test]
    fn grouping_buckets_consecutive_days() {
        let d1 = Utc.with_ymd_and_hms(2025, 8, 19, 23, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2025, 8, 20, 1, 0, 0).unwrap();
        let messages = vec![
            message("a", d1.timestamp_millis()),
            message("b", (d1 + chrono::Duration::minutes(5)).timestamp_millis()),
            message("c", d2.timestamp_millis()),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();

        let buckets = group_by_day(&messages, &Utc, today);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "Yesterday");
        assert_eq!(buckets[0].messages.len(), 2);
        assert_eq!(buckets[1].label, "Today");
        assert_eq!(buckets[1].messages.len(), 1);
    }
}
