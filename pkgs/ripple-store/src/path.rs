//! Logical addressing for remote documents and collections.

use std::fmt;

/// Path to a collection of documents, e.g. `chats/u1-u2/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The top-level `users` collection.
    pub fn users() -> Self {
        Self::new("users")
    }

    /// The top-level `chats` collection.
    pub fn chats() -> Self {
        Self::new("chats")
    }

    /// The message collection of one conversation.
    pub fn messages(chat_id: &str) -> Self {
        Self::new(format!("chats/{chat_id}/messages"))
    }

    /// The typing-presence collection of one conversation.
    pub fn typing(chat_id: &str) -> Self {
        Self::new(format!("chats/{chat_id}/typing"))
    }

    /// Path to the document `id` inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a single document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    /// `users/{uid}`
    pub fn user(uid: &str) -> Self {
        CollectionPath::users().doc(uid)
    }

    /// `chats/{chatId}`
    pub fn chat(chat_id: &str) -> Self {
        CollectionPath::chats().doc(chat_id)
    }

    /// `chats/{chatId}/messages/{messageId}`
    pub fn message(chat_id: &str, message_id: &str) -> Self {
        CollectionPath::messages(chat_id).doc(message_id)
    }

    /// `chats/{chatId}/typing/{uid}`
    pub fn typing(chat_id: &str, uid: &str) -> Self {
        CollectionPath::typing(chat_id).doc(uid)
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_render_fully_qualified() {
        let path = DocPath::message("u1-u2", "m7");
        assert_eq!(path.collection().as_str(), "chats/u1-u2/messages");
        assert_eq!(path.id(), "m7");
        assert_eq!(path.to_string(), "chats/u1-u2/messages/m7");
        assert_eq!(DocPath::typing("u1-u2", "u1").to_string(), "chats/u1-u2/typing/u1");
    }
}
