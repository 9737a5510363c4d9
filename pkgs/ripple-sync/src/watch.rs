//! Lifecycle handles for engine-side subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ripple_store::SubscriptionHandle;
use tokio::task::JoinHandle;

/// Owns the store subscriptions and the driver task behind one engine
/// subscription.
///
/// `cancel` stops all future event delivery and releases every store
/// subscription the watcher opened; it is idempotent. Dropping a watcher
/// cancels it, so a leaked handle can never keep listeners alive.
pub struct Watcher {
    cancelled: Arc<AtomicBool>,
    handles: Vec<SubscriptionHandle>,
    task: JoinHandle<()>,
}

impl Watcher {
    pub(crate) fn new(handles: Vec<SubscriptionHandle>, task: JoinHandle<()>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            handles,
            task,
        }
    }

    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in &self.handles {
            handle.cancel();
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One generation of nested watchers.
///
/// The owner must drain the old generation with `cancel_all` before pushing
/// the next one; two live generations would deliver events twice.
#[derive(Default)]
pub(crate) struct WatcherSet {
    watchers: Vec<Watcher>,
}

impl WatcherSet {
    pub fn push(&mut self, watcher: Watcher) {
        self.watchers.push(watcher);
    }

    pub fn cancel_all(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.cancel();
        }
    }
}
