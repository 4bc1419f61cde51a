//! The broker: accept loop, per-connection sessions and the named queues they share.

pub mod broker_config;
pub mod broker_error;
pub mod broker_listener;
pub mod cancel_token;
pub mod live_sessions;
mod lock;
pub mod message_queue;
pub mod queue_registry;
pub mod registry_event;
pub mod session;
pub mod types;

pub use broker_config::BrokerConfig;
pub use broker_error::BrokerError;
pub use broker_listener::Broker;
pub use cancel_token::CancelToken;
pub use message_queue::{Dequeue, MessageQueue, QueueStats};
pub use queue_registry::QueueRegistry;
pub use registry_event::RegistryEvent;
pub use session::{CloseReason, SessionState};
pub use types::SessionId;
