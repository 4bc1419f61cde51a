use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use crate::client::client_error::ClientError;
use crate::log::{LogSink, NoopLogSink};
use crate::protocol::{QueueName, Role, write_close, write_handshake};
use crate::sink_info;

/// Handshaken TCP connection shared by both client handles.
pub(crate) struct Connection {
    pub(crate) stream: TcpStream,
    peer: SocketAddr,
    role: Role,
    queue: QueueName,
    pub(crate) log: Arc<dyn LogSink>,
    closed: bool,
}

impl Connection {
    pub(crate) fn open(role: Role, queue: &str, host: &str, port: u16) -> Result<Self, ClientError> {
        let queue = QueueName::new(queue)?;
        let mut stream = TcpStream::connect((host, port))?;
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr()?;
        write_handshake(&mut stream, role, &queue)?;

        Ok(Self {
            stream,
            peer,
            role,
            queue,
            log: Arc::new(NoopLogSink),
            closed: false,
        })
    }

    pub(crate) fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::AlreadyClosed);
        }
        Ok(())
    }

    /// Send the close sentinel and shut the socket. The broker having gone already is fine.
    pub(crate) fn close(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.closed = true;

        let sent = write_close(&mut self.stream);
        let _ = self.stream.shutdown(Shutdown::Both);
        sink_info!(
            self.log,
            "{} on queue {} closed connection to {}",
            self.role,
            self.queue,
            self.peer
        );

        match sent.map_err(ClientError::from) {
            Err(ClientError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
