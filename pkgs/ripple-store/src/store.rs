//! The document-store trait remote backends implement.

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{Document, Fields};
use crate::error::StoreError;
use crate::path::{CollectionPath, DocPath};
use crate::subscription::Subscription;

/// Current state of one subscribed document. `doc` is `None` while the
/// document does not exist.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub id: String,
    pub doc: Option<Document>,
}

/// Current state of a subscribed collection or filtered query: document ids
/// plus raw fields, in no guaranteed order.
#[derive(Debug, Clone, Default)]
pub struct CollectionSnapshot {
    pub docs: Vec<(String, Document)>,
}

/// A remote real-time document store.
///
/// Writes follow merge/update/append/batch semantics; subscriptions push a
/// full snapshot at registration and after every committed write touching
/// the subscribed resource. Events for one subscription arrive in commit
/// order; different subscriptions carry no relative ordering guarantee.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document once. Absence is `Ok(None)`, not an error.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Create-or-merge write: only the named fields are affected.
    async fn set_merge(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Field-level update of an existing document.
    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Append a new document with a store-assigned id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError>;

    /// Atomic multi-document field update: every write commits or none do.
    async fn update_batch(&self, writes: Vec<(DocPath, Fields)>) -> Result<(), StoreError>;

    /// Live subscription to one document.
    fn subscribe_document(&self, path: &DocPath) -> Subscription<DocumentSnapshot>;

    /// Live subscription to a whole collection.
    fn subscribe_collection(&self, path: &CollectionPath) -> Subscription<CollectionSnapshot>;

    /// Live subscription to the documents of `collection` whose `field` is
    /// an array containing `value`.
    fn subscribe_where(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: Value,
    ) -> Subscription<CollectionSnapshot>;
}
