//! Canonical conversation identifiers.

/// Derive the conversation id for a participant pair: the two ids sorted
/// lexicographically and joined with `-`. Pure and order-independent, so any
/// two clients computing it for the same pair agree.
///
/// Identical ids (a self-conversation) are not a supported scenario; the
/// function returns the plain joined result without special-casing.
pub fn conversation_id(a: &str, b: &str) -> String {
    let mut ids = [a, b];
    ids.sort_unstable();
    ids.join("-")
}

/// The participant of `chat_id` that is not `local_uid`, if any.
pub fn partner_of<'a>(chat_id: &'a str, local_uid: &str) -> Option<&'a str> {
    chat_id.split('-').find(|id| *id != local_uid)
}
