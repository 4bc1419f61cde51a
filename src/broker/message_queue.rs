use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;

use crate::broker::cancel_token::CancelToken;
use crate::broker::lock::lock;
use crate::broker::registry_event::RegistryEvent;
use crate::protocol::QueueName;

/// Outcome of [`MessageQueue::dequeue_blocking`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    Message(Bytes),
    /// The caller's token fired while it was waiting. Not an error.
    Canceled,
}

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub name: QueueName,
    pub depth: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub requeued: u64,
    pub waiting_consumers: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Bytes>,
    enqueued: u64,
    dequeued: u64,
    requeued: u64,
    waiting: usize,
}

/// Unbounded FIFO of messages with a blocking, cancellable pop.
///
/// Every mutation happens under this queue's own mutex; `available` is
/// signaled under the same mutex, so a waiter can never miss a wakeup.
pub struct MessageQueue {
    name: QueueName,
    state: Mutex<QueueState>,
    available: Condvar,
    events: Option<Sender<RegistryEvent>>,
}

impl MessageQueue {
    pub(crate) fn new(name: QueueName, events: Option<Sender<RegistryEvent>>) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            events,
        }
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Append to the tail and wake one waiting consumer. Never blocks on other consumers.
    pub fn enqueue(&self, message: Bytes) {
        let mut state = lock(&self.state);
        state.messages.push_back(message);
        state.enqueued += 1;
        let depth = state.messages.len();
        self.available.notify_one();
        self.emit(RegistryEvent::Enqueued {
            queue: self.name.clone(),
            depth,
        });
    }

    /// Put back a message whose delivery failed, ahead of everything else.
    pub fn requeue_front(&self, message: Bytes) {
        let mut state = lock(&self.state);
        state.messages.push_front(message);
        state.requeued += 1;
        let depth = state.messages.len();
        self.available.notify_one();
        self.emit(RegistryEvent::Requeued {
            queue: self.name.clone(),
            depth,
        });
    }

    /// Pop the head without waiting.
    pub fn try_dequeue(&self) -> Option<Bytes> {
        let mut state = lock(&self.state);
        self.pop(&mut state)
    }

    /// Pop the head, waiting for a message if the queue is empty.
    ///
    /// Returns [`Dequeue::Canceled`] as soon as `cancel` fires, whether it was
    /// already canceled on entry or fires while waiting.
    pub fn dequeue_blocking(self: &Arc<Self>, cancel: &CancelToken) -> Dequeue {
        match self.dequeue_until(cancel, None) {
            Some(outcome) => outcome,
            None => Dequeue::Canceled, // unreachable without a deadline
        }
    }

    /// Like [`dequeue_blocking`](Self::dequeue_blocking) but gives up after
    /// `timeout`, returning `None`.
    #[cfg(test)]
    pub(crate) fn dequeue_timeout(
        self: &Arc<Self>,
        cancel: &CancelToken,
        timeout: std::time::Duration,
    ) -> Option<Dequeue> {
        self.dequeue_until(cancel, Some(Instant::now() + timeout))
    }

    fn dequeue_until(self: &Arc<Self>, cancel: &CancelToken, deadline: Option<Instant>) -> Option<Dequeue> {
        let _park = cancel.park(self);
        let mut state = lock(&self.state);

        loop {
            if cancel.is_cancelled() {
                // We may have absorbed a notify_one meant for a message; hand it on.
                if !state.messages.is_empty() {
                    self.available.notify_one();
                }
                return Some(Dequeue::Canceled);
            }

            if let Some(message) = self.pop(&mut state) {
                return Some(Dequeue::Message(message));
            }

            state.waiting += 1;
            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiting -= 1;
                        return None;
                    }
                    match self.available.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
            };
            state.waiting -= 1;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.state).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let state = lock(&self.state);
        QueueStats {
            name: self.name.clone(),
            depth: state.messages.len(),
            enqueued: state.enqueued,
            dequeued: state.dequeued,
            requeued: state.requeued,
            waiting_consumers: state.waiting,
        }
    }

    /// Wake every waiter so it re-checks its cancel token.
    pub(crate) fn wake_all(&self) {
        let _state = lock(&self.state);
        self.available.notify_all();
    }

    fn pop(&self, state: &mut QueueState) -> Option<Bytes> {
        let message = state.messages.pop_front()?;
        state.dequeued += 1;
        self.emit(RegistryEvent::Dequeued {
            queue: self.name.clone(),
            depth: state.messages.len(),
        });
        Some(message)
    }

    fn emit(&self, event: RegistryEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
