use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::broker::lock::lock;
use crate::broker::message_queue::{MessageQueue, QueueStats};
use crate::broker::registry_event::RegistryEvent;
use crate::protocol::QueueName;

/// Owns every named queue of one broker instance.
///
/// The map lock is only taken to look up or create a queue; enqueue and
/// dequeue traffic runs on the per-queue lock inside [`MessageQueue`], so
/// queues with different names never contend with each other.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<QueueName, Arc<MessageQueue>>>,
    events: Option<Sender<RegistryEvent>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that reports queue activity on `events`.
    pub fn with_observer(events: Sender<RegistryEvent>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            events: Some(events),
        }
    }

    /// Return the queue called `name`, creating it empty on first reference.
    ///
    /// Concurrent callers with the same name always get the same queue.
    pub fn get_or_create_queue(&self, name: &QueueName) -> Arc<MessageQueue> {
        let mut queues = lock(&self.queues);
        if let Some(queue) = queues.get(name) {
            return Arc::clone(queue);
        }

        let queue = Arc::new(MessageQueue::new(name.clone(), self.events.clone()));
        queues.insert(name.clone(), Arc::clone(&queue));
        if let Some(tx) = &self.events {
            let _ = tx.send(RegistryEvent::QueueCreated { queue: name.clone() });
        }
        queue
    }

    pub fn get(&self, name: &str) -> Option<Arc<MessageQueue>> {
        lock(&self.queues).get(name).cloned()
    }

    /// Names of all queues created so far, sorted.
    pub fn queue_names(&self) -> Vec<QueueName> {
        let mut names: Vec<QueueName> = lock(&self.queues).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self, name: &str) -> Option<QueueStats> {
        self.get(name).map(|q| q.stats())
    }

    /// Stats of every queue, sorted by name.
    pub fn snapshot(&self) -> Vec<QueueStats> {
        let queues: Vec<Arc<MessageQueue>> = lock(&self.queues).values().cloned().collect();
        let mut stats: Vec<QueueStats> = queues.iter().map(|q| q.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        lock(&self.queues).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use bytes::Bytes;
    use std::sync::{Barrier, mpsc};
    use std::thread;

    fn name(s: &str) -> QueueName {
        QueueName::new(s).unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = QueueRegistry::new();
        let a = registry.get_or_create_queue(&name("orders"));
        let b = registry.get_or_create_queue(&name("orders"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_creation_yields_one_queue() {
        let registry = Arc::new(QueueRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_create_queue(&name("hot"))
                })
            })
            .collect();

        let queues: Vec<Arc<MessageQueue>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(queues.iter().all(|q| Arc::ptr_eq(q, &queues[0])));
        assert_eq!(registry.queue_names(), vec![name("hot")]);
    }

    #[test]
    fn queues_are_isolated_by_name() {
        let registry = QueueRegistry::new();
        registry
            .get_or_create_queue(&name("A"))
            .enqueue(Bytes::from_static(b"for A"));

        let b = registry.get_or_create_queue(&name("B"));
        assert_eq!(b.try_dequeue(), None);
        assert_eq!(registry.stats("A").map(|s| s.depth), Some(1));
        assert_eq!(registry.stats("B").map(|s| s.depth), Some(0));
        assert!(registry.stats("C").is_none());
    }

    #[test]
    fn observer_sees_creation_once() {
        let (tx, rx) = mpsc::channel();
        let registry = QueueRegistry::with_observer(tx);

        let q = registry.get_or_create_queue(&name("orders"));
        let _ = registry.get_or_create_queue(&name("orders"));
        q.enqueue(Bytes::from_static(b"m"));

        let events: Vec<RegistryEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                RegistryEvent::QueueCreated { queue: name("orders") },
                RegistryEvent::Enqueued { queue: name("orders"), depth: 1 },
            ]
        );
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let registry = QueueRegistry::new();
        for n in ["zeta", "alpha", "mid"] {
            registry.get_or_create_queue(&name(n));
        }
        let names: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
