use std::sync::Arc;

use crate::client::client_error::ClientError;
use crate::client::connection::Connection;
use crate::log::LogSink;
use crate::protocol::{QueueName, Role, write_frame};
use crate::sink_info;

/// Pushes messages into one named queue.
///
/// ```no_run
/// use rustymq::client::Producer;
///
/// let mut producer = Producer::connect("orders", "127.0.0.1", 18273)?;
/// producer.send(b"\x01\x02\x03")?;
/// producer.close()?;
/// # Ok::<(), rustymq::client::ClientError>(())
/// ```
pub struct Producer {
    conn: Connection,
}

impl Producer {
    /// Connect to the broker at `host:port` and announce this handle as a producer of `queue`.
    ///
    /// # Errors
    /// `Frame` for an invalid queue name, `Io` if the broker is unreachable.
    pub fn connect(queue: &str, host: &str, port: u16) -> Result<Self, ClientError> {
        let conn = Connection::open(Role::Producer, queue, host, port)?;
        Ok(Self { conn })
    }

    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        sink_info!(log, "producer for {} connected to {}", self.conn.queue(), self.conn.peer());
        self.conn.log = log;
        self
    }

    /// Send one message. Messages longer than 65535 bytes are rejected before
    /// anything is written, so the connection stays usable.
    pub fn send(&mut self, message: &[u8]) -> Result<(), ClientError> {
        self.conn.ensure_open()?;
        write_frame(&mut self.conn.stream, message)?;
        Ok(())
    }

    pub fn queue(&self) -> &QueueName {
        self.conn.queue()
    }

    /// Send the close sentinel and release the socket.
    pub fn close(&mut self) -> Result<(), ClientError> {
        self.conn.close()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if !self.conn.is_closed() {
            let _ = self.conn.close();
        }
    }
}
