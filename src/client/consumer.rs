use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::client::client_error::ClientError;
use crate::client::connection::Connection;
use crate::log::LogSink;
use crate::protocol::{Frame, FrameError, QueueName, Role, read_frame};
use crate::{sink_debug, sink_info};

/// `set_read_timeout` rejects a zero duration.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Pulls messages from one named queue.
///
/// Several consumers of the same queue compete: each message goes to exactly one of them.
pub struct Consumer {
    conn: Connection,
    /// The broker sent the close sentinel; nothing more will arrive.
    canceled: bool,
}

impl Consumer {
    pub fn connect(queue: &str, host: &str, port: u16) -> Result<Self, ClientError> {
        let conn = Connection::open(Role::Consumer, queue, host, port)?;
        Ok(Self {
            conn,
            canceled: false,
        })
    }

    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        sink_info!(log, "consumer for {} connected to {}", self.conn.queue(), self.conn.peer());
        self.conn.log = log;
        self
    }

    /// Block until the next message arrives.
    ///
    /// # Errors
    /// - [`ClientError::Canceled`] once the broker has sent the close sentinel
    ///   (and on every call after that).
    /// - [`ClientError::ConnectionClosed`] if the broker vanished.
    pub fn receive(&mut self) -> Result<Bytes, ClientError> {
        self.conn.ensure_open()?;
        if self.canceled {
            return Err(ClientError::Canceled);
        }

        match read_frame(&mut self.conn.stream)? {
            Frame::Data(message) => Ok(message),
            Frame::Close => {
                self.canceled = true;
                sink_debug!(self.conn.log, "broker closed queue {}", self.conn.queue());
                Err(ClientError::Canceled)
            }
        }
    }

    /// Wait at most `timeout` for a message to start arriving.
    ///
    /// Only the wait for the first byte is bounded; once a frame has started it
    /// is read to the end, so a timeout never leaves half a frame behind.
    pub fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>, ClientError> {
        self.conn.ensure_open()?;
        if self.canceled {
            return Err(ClientError::Canceled);
        }

        let stream = &self.conn.stream;
        stream.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        let mut peek_buf = [0u8; 1];
        let ready = stream.peek(&mut peek_buf);
        stream.set_read_timeout(None)?;

        match ready {
            Ok(0) => Err(ClientError::ConnectionClosed),
            Ok(_) => self.receive().map(Some),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(FrameError::from(e).into()),
        }
    }

    pub fn queue(&self) -> &QueueName {
        self.conn.queue()
    }

    /// Tell the broker this consumer is leaving and release the socket.
    ///
    /// The broker pushes messages as soon as they are available, so frames
    /// already sent to this consumer but not yet taken with `receive` are
    /// discarded with the socket. Only messages still in the broker's queue
    /// go to the remaining consumers.
    pub fn close(&mut self) -> Result<(), ClientError> {
        self.conn.close()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if !self.conn.is_closed() {
            let _ = self.conn.close();
        }
    }
}
