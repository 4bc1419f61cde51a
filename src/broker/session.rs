use std::fmt;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::broker::cancel_token::CancelToken;
use crate::broker::message_queue::{Dequeue, MessageQueue};
use crate::broker::queue_registry::QueueRegistry;
use crate::broker::types::SessionId;
use crate::log::LogSink;
use crate::protocol::{
    Frame, FrameError, QueueName, Role, read_frame, read_queue_name, read_role, write_close,
    write_frame,
};
use crate::{sink_debug, sink_info, sink_warn};

/// Where a session is in its lifetime.
pub enum SessionState {
    AwaitingRole,
    AwaitingQueueName { role: Role },
    ProducerLoop { queue: Arc<MessageQueue> },
    ConsumerLoop { queue: Arc<MessageQueue> },
    Closed(CloseReason),
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer sent the close sentinel.
    PeerClosed,
    /// The peer went away without a sentinel.
    ConnectionClosed,
    /// The broker is stopping.
    Canceled,
    /// Protocol violation or transport failure.
    Failed(FrameError),
}

impl CloseReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, CloseReason::Failed(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ConnectionClosed => write!(f, "connection closed"),
            CloseReason::Canceled => write!(f, "canceled by broker stop"),
            CloseReason::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// One accepted connection, driven through [`SessionState`] by [`run`](Self::run).
pub(crate) struct Session {
    id: SessionId,
    peer: SocketAddr,
    reader: Option<BufReader<TcpStream>>,
    writer: TcpStream,
    registry: Arc<QueueRegistry>,
    /// The broker's root token; fired by `stop()`.
    shutdown: CancelToken,
    /// This session's own token, a child of `shutdown`.
    cancel: CancelToken,
    log: Arc<dyn LogSink>,
    role: Option<Role>,
    queue_name: Option<QueueName>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        stream: TcpStream,
        registry: Arc<QueueRegistry>,
        shutdown: &CancelToken,
        log: Arc<dyn LogSink>,
    ) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            id,
            peer,
            reader: Some(reader),
            writer: stream,
            registry,
            shutdown: shutdown.clone(),
            cancel: shutdown.child(),
            log,
            role: None,
            queue_name: None,
        })
    }

    /// Drive the session to completion.
    pub(crate) fn run(mut self) -> CloseReason {
        let mut state = SessionState::AwaitingRole;
        loop {
            state = match state {
                SessionState::AwaitingRole => self.await_role(),
                SessionState::AwaitingQueueName { role } => self.await_queue_name(role),
                SessionState::ProducerLoop { queue } => self.producer_loop(&queue),
                SessionState::ConsumerLoop { queue } => self.consumer_loop(&queue),
                SessionState::Closed(reason) => {
                    self.close(&reason);
                    return reason;
                }
            };
        }
    }

    fn await_role(&mut self) -> SessionState {
        let Some(reader) = self.reader.as_mut() else {
            return SessionState::Closed(CloseReason::ConnectionClosed);
        };
        match read_role(reader) {
            Ok(role) => {
                self.role = Some(role);
                SessionState::AwaitingQueueName { role }
            }
            Err(e) => SessionState::Closed(classify(e, &self.shutdown)),
        }
    }

    fn await_queue_name(&mut self, role: Role) -> SessionState {
        let Some(reader) = self.reader.as_mut() else {
            return SessionState::Closed(CloseReason::ConnectionClosed);
        };
        let name = match read_queue_name(reader) {
            Ok(name) => name,
            Err(e) => return SessionState::Closed(classify(e, &self.shutdown)),
        };

        let queue = self.registry.get_or_create_queue(&name);
        sink_info!(
            self.log,
            "session {} from {} is a {} on queue {}",
            self.id,
            self.peer,
            role,
            name
        );
        self.queue_name = Some(name);

        match role {
            Role::Producer => SessionState::ProducerLoop { queue },
            Role::Consumer => SessionState::ConsumerLoop { queue },
        }
    }

    fn producer_loop(&mut self, queue: &Arc<MessageQueue>) -> SessionState {
        let Some(reader) = self.reader.as_mut() else {
            return SessionState::Closed(CloseReason::ConnectionClosed);
        };
        loop {
            match read_frame(reader) {
                Ok(Frame::Data(message)) => queue.enqueue(message),
                Ok(Frame::Close) => return SessionState::Closed(CloseReason::PeerClosed),
                Err(e) => return SessionState::Closed(classify(e, &self.shutdown)),
            }
        }
    }

    /// Push messages to the consumer until either side ends the session.
    ///
    /// A watcher thread owns the read half: the consumer may only send the
    /// close sentinel, so whatever it reads ends the session and fires
    /// `self.cancel`, which releases `dequeue_blocking`.
    ///
    /// Messages are written as soon as they are dequeued. Whatever sits in the
    /// socket when the consumer hangs up is gone; only a failed write puts a
    /// message back.
    fn consumer_loop(&mut self, queue: &Arc<MessageQueue>) -> SessionState {
        let Some(reader) = self.reader.take() else {
            return SessionState::Closed(CloseReason::ConnectionClosed);
        };

        let cancel = self.cancel.clone();
        let watcher = match thread::Builder::new()
            .name(format!("session-{}-watch", self.id))
            .spawn(move || {
                let verdict = watch_consumer(reader);
                cancel.cancel();
                verdict
            }) {
            Ok(handle) => handle,
            Err(e) => return SessionState::Closed(CloseReason::Failed(FrameError::Io(e))),
        };

        let mut send_failure = None;
        loop {
            let message = match queue.dequeue_blocking(&self.cancel) {
                Dequeue::Message(message) => message,
                Dequeue::Canceled => break,
            };
            // The consumer may have hung up while we were waiting.
            if self.cancel.is_cancelled() {
                queue.requeue_front(message);
                break;
            }
            if let Err(e) = write_frame(&mut self.writer, &message) {
                queue.requeue_front(message);
                send_failure = Some(e);
                break;
            }
        }

        self.cancel.cancel();
        let _ = self.writer.shutdown(Shutdown::Read);
        let verdict = watcher.join().unwrap_or(CloseReason::ConnectionClosed);

        if self.shutdown.is_cancelled() {
            let _ = write_close(&mut self.writer);
            return SessionState::Closed(CloseReason::Canceled);
        }
        match send_failure {
            Some(e) => SessionState::Closed(classify(e, &self.shutdown)),
            None => SessionState::Closed(verdict),
        }
    }

    fn close(&mut self, reason: &CloseReason) {
        let role = self.role.map_or("-", |r| r.as_str());
        let queue = self.queue_name.as_ref().map_or("-", |q| q.as_str());

        if reason.is_failure() {
            sink_warn!(
                self.log,
                "session {} closed (peer={}, role={}, queue={}): {}",
                self.id,
                self.peer,
                role,
                queue,
                reason
            );
        } else {
            sink_debug!(
                self.log,
                "session {} closed (peer={}, role={}, queue={}): {}",
                self.id,
                self.peer,
                role,
                queue,
                reason
            );
        }

        self.cancel.cancel();
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Map a read/write error to a close reason; disconnects during `stop()` count as canceled.
fn classify(err: FrameError, shutdown: &CancelToken) -> CloseReason {
    if shutdown.is_cancelled() && matches!(err, FrameError::ConnectionClosed | FrameError::Io(_)) {
        return CloseReason::Canceled;
    }
    if err.is_disconnect() {
        return CloseReason::ConnectionClosed;
    }
    CloseReason::Failed(err)
}

fn watch_consumer(mut reader: BufReader<TcpStream>) -> CloseReason {
    match read_frame(&mut reader) {
        Ok(Frame::Close) => CloseReason::PeerClosed,
        Ok(Frame::Data(_)) => {
            CloseReason::Failed(FrameError::MalformedFrame("consumer sent a data frame"))
        }
        Err(e) if e.is_disconnect() => CloseReason::ConnectionClosed,
        Err(e) => CloseReason::Failed(e),
    }
}
