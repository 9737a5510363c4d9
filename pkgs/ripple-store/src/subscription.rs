//! Cancellable snapshot subscriptions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::StoreError;

/// One event on a subscription stream.
#[derive(Debug, Clone)]
pub enum SnapshotEvent<T> {
    /// Full current state of the subscribed resource.
    Snapshot(T),
    /// Terminal stream failure; no further events follow.
    Error(StoreError),
}

/// Idempotent cancellation handle for one live subscription.
///
/// `cancel` stops all future event delivery; calling it more than once is
/// safe and does nothing after the first call.
#[derive(Clone)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(cancel),
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.cancel)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A live subscription: the event stream plus its cancellation handle.
pub struct Subscription<T> {
    pub events: mpsc::UnboundedReceiver<SnapshotEvent<T>>,
    pub handle: SubscriptionHandle,
}
