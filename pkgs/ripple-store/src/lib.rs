//! Ripple Store - the remote real-time document store boundary
//!
//! This crate models the document surface the sync engine talks to: logical
//! paths, loosely-typed documents, write semantics with server-assigned
//! timestamps, and cancellable snapshot subscriptions.
//!
//! # Architecture
//!
//! - **path**: logical addressing (`users/{uid}`, `chats/{chatId}`,
//!   `chats/{chatId}/messages/{messageId}`, `chats/{chatId}/typing/{uid}`)
//! - **document**: raw field maps and write descriptors (plain values,
//!   server timestamps, idempotent array unions, nested merges)
//! - **store**: the [`DocumentStore`] trait remote backends implement
//! - **subscription**: snapshot streams with idempotent cancel handles
//! - **memory**: an in-process backend with synchronous snapshot fan-out
//!
//! # Write semantics
//!
//! - `set_merge` creates or merges a document; only named fields change
//! - `update` is a field-level update of an existing document
//! - `add` appends a new document with a store-assigned id
//! - `update_batch` updates several documents atomically
//!
//! Subscriptions deliver a full snapshot immediately on registration and
//! again after every committed write touching the subscribed resource.
//! Events for one subscription arrive in commit order; there is no ordering
//! guarantee across subscriptions.

pub mod document;
pub mod error;
pub mod memory;
pub mod path;
pub mod store;
pub mod subscription;

pub use document::{Document, Fields, WriteField};
pub use error::StoreError;
pub use memory::{MemoryStore, ServerClock};
pub use path::{CollectionPath, DocPath};
pub use store::{CollectionSnapshot, DocumentSnapshot, DocumentStore};
pub use subscription::{SnapshotEvent, Subscription, SubscriptionHandle};
