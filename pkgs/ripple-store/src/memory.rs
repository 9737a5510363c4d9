//! In-process document store backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::document::{apply_field, Document, Fields};
use crate::error::StoreError;
use crate::path::{CollectionPath, DocPath};
use crate::store::{CollectionSnapshot, DocumentSnapshot, DocumentStore};
use crate::subscription::{SnapshotEvent, Subscription, SubscriptionHandle};

/// Source of server-assigned timestamps, epoch milliseconds.
pub type ServerClock = Arc<dyn Fn() -> i64 + Send + Sync>;

struct CollectionSub {
    id: u64,
    collection: String,
    filter: Option<(String, Value)>,
    tx: mpsc::UnboundedSender<SnapshotEvent<CollectionSnapshot>>,
}

struct DocumentSub {
    id: u64,
    collection: String,
    doc_id: String,
    tx: mpsc::UnboundedSender<SnapshotEvent<DocumentSnapshot>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    collection_subs: Vec<CollectionSub>,
    document_subs: Vec<DocumentSub>,
    next_sub_id: u64,
    write_ops: u64,
    batch_writes: u64,
    fail_next_batch: bool,
}

impl Inner {
    fn matches(doc: &Document, filter: &Option<(String, Value)>) -> bool {
        match filter {
            None => true,
            Some((field, value)) => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
        }
    }

    fn collection_snapshot(
        &self,
        collection: &str,
        filter: &Option<(String, Value)>,
    ) -> CollectionSnapshot {
        let docs = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| Self::matches(doc, filter))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        CollectionSnapshot { docs }
    }

    fn document_snapshot(&self, collection: &str, doc_id: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            id: doc_id.to_string(),
            doc: self
                .collections
                .get(collection)
                .and_then(|docs| docs.get(doc_id))
                .cloned(),
        }
    }

    /// Push fresh snapshots to every subscriber watching a touched resource.
    /// Subscribers whose receiver is gone are dropped from the registry.
    fn notify(&mut self, touched: &[(String, String)]) {
        let mut closed_collections = Vec::new();
        let mut closed_documents = Vec::new();

        for sub in &self.collection_subs {
            if touched.iter().any(|(collection, _)| *collection == sub.collection) {
                let snap = self.collection_snapshot(&sub.collection, &sub.filter);
                if sub.tx.send(SnapshotEvent::Snapshot(snap)).is_err() {
                    closed_collections.push(sub.id);
                }
            }
        }
        for sub in &self.document_subs {
            let hit = touched
                .iter()
                .any(|(collection, doc_id)| *collection == sub.collection && *doc_id == sub.doc_id);
            if hit {
                let snap = self.document_snapshot(&sub.collection, &sub.doc_id);
                if sub.tx.send(SnapshotEvent::Snapshot(snap)).is_err() {
                    closed_documents.push(sub.id);
                }
            }
        }

        if !closed_collections.is_empty() {
            self.collection_subs.retain(|sub| !closed_collections.contains(&sub.id));
        }
        if !closed_documents.is_empty() {
            self.document_subs.retain(|sub| !closed_documents.contains(&sub.id));
        }
    }
}

/// In-memory [`DocumentStore`] with synchronous snapshot fan-out.
///
/// Backs the sync engine's tests and embedders that do not need a remote
/// backend. All state lives behind one mutex; subscribers are notified in
/// commit order while the write lock is held, so a single subscription never
/// observes writes out of order.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    clock: ServerClock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Utc::now().timestamp_millis()))
    }

    /// Use an explicit clock for server-assigned timestamps.
    pub fn with_clock(clock: ServerClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Number of committed write operations. Each batch member counts once.
    pub fn write_ops(&self) -> u64 {
        self.inner.lock().write_ops
    }

    /// Number of committed batch updates.
    pub fn batch_writes(&self) -> u64 {
        self.inner.lock().batch_writes
    }

    /// Make the next `update_batch` fail with [`StoreError::Unavailable`].
    pub fn fail_next_batch(&self) {
        self.inner.lock().fail_next_batch = true;
    }

    /// Push a terminal error to every live subscription on `collection` and
    /// drop those subscribers. No further events reach them.
    pub fn fail_subscriptions(&self, collection: &CollectionPath) {
        let mut inner = self.inner.lock();
        let err = StoreError::Unavailable(format!("stream closed: {collection}"));
        inner.collection_subs.retain(|sub| {
            if sub.collection == collection.as_str() {
                let _ = sub.tx.send(SnapshotEvent::Error(err.clone()));
                false
            } else {
                true
            }
        });
        inner.document_subs.retain(|sub| {
            if sub.collection == collection.as_str() {
                let _ = sub.tx.send(SnapshotEvent::Error(err.clone()));
                false
            } else {
                true
            }
        });
    }

    fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    fn unregister_collection_sub(inner: &Arc<Mutex<Inner>>, id: u64) -> impl Fn() + Send + Sync {
        let weak = Arc::downgrade(inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().collection_subs.retain(|sub| sub.id != id);
            }
        }
    }

    fn unregister_document_sub(inner: &Arc<Mutex<Inner>>, id: u64) -> impl Fn() + Send + Sync {
        let weak = Arc::downgrade(inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().document_subs.retain(|sub| sub.id != id);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(path.collection().as_str())
            .and_then(|docs| docs.get(path.id()))
            .cloned())
    }

    async fn set_merge(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let doc = inner
            .collections
            .entry(path.collection().as_str().to_string())
            .or_default()
            .entry(path.id().to_string())
            .or_default();
        for (key, field) in fields.iter() {
            apply_field(doc, key, field, now);
        }
        inner.write_ops += 1;
        debug!(path = %path, "merge write");
        inner.notify(&[(path.collection().as_str().to_string(), path.id().to_string())]);
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let doc = inner
            .collections
            .get_mut(path.collection().as_str())
            .and_then(|docs| docs.get_mut(path.id()))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        for (key, field) in fields.iter() {
            apply_field(doc, key, field, now);
        }
        inner.write_ops += 1;
        debug!(path = %path, "field update");
        inner.notify(&[(path.collection().as_str().to_string(), path.id().to_string())]);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        let now = self.now_ms();
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.lock();
        let mut doc = Document::new();
        for (key, field) in fields.iter() {
            apply_field(&mut doc, key, field, now);
        }
        inner
            .collections
            .entry(collection.as_str().to_string())
            .or_default()
            .insert(id.clone(), doc);
        inner.write_ops += 1;
        debug!(collection = %collection, doc_id = %id, "append");
        inner.notify(&[(collection.as_str().to_string(), id.clone())]);
        Ok(id)
    }

    async fn update_batch(&self, writes: Vec<(DocPath, Fields)>) -> Result<(), StoreError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        if inner.fail_next_batch {
            inner.fail_next_batch = false;
            return Err(StoreError::Unavailable("injected batch failure".into()));
        }
        // Validate every target before mutating anything.
        for (path, _) in &writes {
            let exists = inner
                .collections
                .get(path.collection().as_str())
                .map(|docs| docs.contains_key(path.id()))
                .unwrap_or(false);
            if !exists {
                return Err(StoreError::NotFound(path.to_string()));
            }
        }
        let mut touched = Vec::with_capacity(writes.len());
        for (path, fields) in &writes {
            if let Some(doc) = inner
                .collections
                .get_mut(path.collection().as_str())
                .and_then(|docs| docs.get_mut(path.id()))
            {
                for (key, field) in fields.iter() {
                    apply_field(doc, key, field, now);
                }
            }
            touched.push((path.collection().as_str().to_string(), path.id().to_string()));
        }
        inner.write_ops += writes.len() as u64;
        inner.batch_writes += 1;
        debug!(writes = writes.len(), "batch update");
        inner.notify(&touched);
        Ok(())
    }

    fn subscribe_document(&self, path: &DocPath) -> Subscription<DocumentSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        let snap = inner.document_snapshot(path.collection().as_str(), path.id());
        let _ = tx.send(SnapshotEvent::Snapshot(snap));
        inner.document_subs.push(DocumentSub {
            id,
            collection: path.collection().as_str().to_string(),
            doc_id: path.id().to_string(),
            tx,
        });
        Subscription {
            events: rx,
            handle: SubscriptionHandle::new(Self::unregister_document_sub(&self.inner, id)),
        }
    }

    fn subscribe_collection(&self, path: &CollectionPath) -> Subscription<CollectionSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        let snap = inner.collection_snapshot(path.as_str(), &None);
        let _ = tx.send(SnapshotEvent::Snapshot(snap));
        inner.collection_subs.push(CollectionSub {
            id,
            collection: path.as_str().to_string(),
            filter: None,
            tx,
        });
        Subscription {
            events: rx,
            handle: SubscriptionHandle::new(Self::unregister_collection_sub(&self.inner, id)),
        }
    }

    fn subscribe_where(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: Value,
    ) -> Subscription<CollectionSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let filter = Some((field.to_string(), value));
        let mut inner = self.inner.lock();
        let id = inner.next_sub_id;
        inner.next_sub_id += 1;
        let snap = inner.collection_snapshot(collection.as_str(), &filter);
        let _ = tx.send(SnapshotEvent::Snapshot(snap));
        inner.collection_subs.push(CollectionSub {
            id,
            collection: collection.as_str().to_string(),
            filter,
            tx,
        });
        Subscription {
            events: rx,
            handle: SubscriptionHandle::new(Self::unregister_collection_sub(&self.inner, id)),
        }
    }
}
