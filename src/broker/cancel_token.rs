use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::broker::lock::lock;
use crate::broker::message_queue::MessageQueue;

/// Cooperative cancellation shared between a session and whoever may tear it down.
///
/// Tokens form a tree: the broker owns the root, every session gets a
/// [`child`](Self::child). Canceling a token cancels its whole subtree and
/// wakes any thread parked on a queue through
/// [`MessageQueue::dequeue_blocking`].
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    /// Queues a holder of this token is currently waiting on.
    parked_on: Mutex<Vec<Arc<MessageQueue>>>,
    children: Mutex<Vec<Weak<CancelInner>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is canceled together with `self` (but not the other way around).
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut children = lock(&self.inner.children);
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // A concurrent cancel may have drained `children` before the push.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Register `queue` as the place the caller is about to wait on.
    ///
    /// The registration lasts as long as the returned guard.
    pub(crate) fn park(&self, queue: &Arc<MessageQueue>) -> ParkGuard<'_> {
        lock(&self.inner.parked_on).push(Arc::clone(queue));
        ParkGuard {
            token: self,
            queue: Arc::clone(queue),
        }
    }
}

impl CancelInner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let parked: Vec<Arc<MessageQueue>> = lock(&self.parked_on).clone();
        for queue in parked {
            queue.wake_all();
        }

        let children: Vec<Arc<CancelInner>> = lock(&self.children)
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();
        for child in children {
            child.cancel();
        }
    }
}

/// RAII registration created by [`CancelToken::park`]; unregisters on drop.
pub(crate) struct ParkGuard<'a> {
    token: &'a CancelToken,
    queue: Arc<MessageQueue>,
}

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        let mut parked = lock(&self.token.inner.parked_on);
        if let Some(pos) = parked.iter().position(|q| Arc::ptr_eq(q, &self.queue)) {
            parked.swap_remove(pos);
        }
    }
}
