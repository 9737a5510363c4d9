//! Domain records decoded from raw remote documents.
//!
//! Remote records are untrusted field maps. Each domain type projects out of
//! one with explicit type checks: required fields with a wrong or missing
//! type reject the whole record, optional fields fall back to defaults.

use chrono::{DateTime, TimeZone, Utc};
use ripple_store::Document;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Reason a raw record was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),
}

fn required_str(doc: &Document, field: &'static str) -> Result<String, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::WrongType(field)),
    }
}

fn required_millis(doc: &Document, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => value
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or(DecodeError::WrongType(field)),
    }
}

fn optional_str(doc: &Document, field: &str) -> Option<String> {
    doc.get(field).and_then(Value::as_str).map(str::to_string)
}

fn optional_millis(doc: &Document, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field)
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn optional_bool(doc: &Document, field: &str) -> bool {
    doc.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn str_array(doc: &Document, field: &str) -> Vec<String> {
    doc.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// One chat message.
///
/// The creation `timestamp` is immutable; edits touch `text`, `edited` and
/// `updated_at` only, so an edited message keeps its ordering position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: Option<String>,
    pub avatar: Option<String>,
    pub read_by: Vec<String>,
    pub edited: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Project a raw record into a message. `senderId`, `text` and
    /// `timestamp` are required; everything else degrades to defaults.
    pub fn from_document(id: &str, doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            id: id.to_string(),
            sender_id: required_str(doc, "senderId")?,
            text: required_str(doc, "text")?,
            timestamp: required_millis(doc, "timestamp")?,
            sender_name: optional_str(doc, "senderName"),
            avatar: optional_str(doc, "avatar"),
            read_by: str_array(doc, "readBy"),
            edited: optional_bool(doc, "edited"),
            updated_at: optional_millis(doc, "updatedAt"),
        })
    }

    /// Whether `uid` has acknowledged this message.
    pub fn read_by_user(&self, uid: &str) -> bool {
        self.read_by.iter().any(|reader| reader == uid)
    }
}

/// A user profile. Decoding never fails; a sparse document degrades to the
/// same defaults an absent one does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub email: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub show_old_chats: bool,
}

impl Profile {
    pub fn from_document(id: &str, doc: &Document) -> Self {
        let email = optional_str(doc, "email");
        let name = optional_str(doc, "name")
            .or_else(|| email.clone())
            .unwrap_or_else(|| "User".to_string());
        Self {
            id: id.to_string(),
            name,
            avatar: optional_str(doc, "avatar"),
            email,
            last_seen: optional_millis(doc, "lastSeen"),
            show_old_chats: optional_bool(doc, "showOldChats"),
        }
    }

    /// Stand-in for a profile document that does not exist (yet).
    pub fn missing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "User".to_string(),
            avatar: None,
            email: None,
            last_seen: None,
            show_old_chats: false,
        }
    }
}

/// Conversation metadata: the member pair plus a denormalized last-message
/// summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMeta {
    pub id: String,
    pub members: Vec<String>,
    pub last_message: Option<LastMessage>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMeta {
    pub fn from_document(id: &str, doc: &Document) -> Self {
        let last_message = doc
            .get("lastMessage")
            .and_then(Value::as_object)
            .map(|summary| LastMessage {
                text: optional_str(summary, "text").unwrap_or_default(),
                sender_id: optional_str(summary, "senderId").unwrap_or_default(),
                timestamp: optional_millis(summary, "timestamp"),
            });
        Self {
            id: id.to_string(),
            members: str_array(doc, "members"),
            last_message,
            updated_at: optional_millis(doc, "updatedAt"),
        }
    }

    /// The member that is not `local_uid`, if any.
    pub fn partner(&self, local_uid: &str) -> Option<&str> {
        self.members
            .iter()
            .map(String::as_str)
            .find(|member| *member != local_uid)
    }
}

/// Ephemeral typing state for one participant of one conversation. An
/// absent document reads as "not typing".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingState {
    pub is_typing: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TypingState {
    pub fn from_document(doc: Option<&Document>) -> Self {
        match doc {
            Some(doc) => Self {
                is_typing: optional_bool(doc, "isTyping"),
                updated_at: optional_millis(doc, "updatedAt"),
            },
            None => Self {
                is_typing: false,
                updated_at: None,
            },
        }
    }
}
