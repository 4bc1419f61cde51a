//! Blocking client handles for producing to and consuming from a broker queue.

pub mod client_error;
mod connection;
pub mod consumer;
pub mod producer;

pub use client_error::ClientError;
pub use consumer::Consumer;
pub use producer::Producer;
