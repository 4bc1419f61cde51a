use crate::protocol::QueueName;

/// Observable queue activity, published to an optional observer channel.
///
/// Events for one queue are sent while that queue's lock is held, so they
/// arrive in the order the operations were linearized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    QueueCreated { queue: QueueName },
    Enqueued { queue: QueueName, depth: usize },
    Dequeued { queue: QueueName, depth: usize },
    /// A delivery failed and the message went back to the head.
    Requeued { queue: QueueName, depth: usize },
}
