//! RustyMQ is a minimal in-memory message broker.
//!
//! Producers push binary messages into named queues over TCP; consumers pull
//! them from the same queues over their own connections. It provides one binary:
//! - `rustymq_broker`: runs a broker on a configurable port.
//!
//! The crate is structured into several modules, each responsible for one
//! layer of the broker and its clients.

/// Broker listener, connection sessions and the named queues.
pub mod broker;
/// Blocking producer and consumer handles.
pub mod client;
/// Handles configuration loading and management.
pub mod config;
/// Logging utilities for the broker and its clients.
pub mod log;
/// Length-prefixed framing and the role/queue handshake.
pub mod protocol;
