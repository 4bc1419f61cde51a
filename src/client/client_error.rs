use std::{fmt, io};

use crate::protocol::FrameError;

/// Errors surfaced by [`Producer`](super::Producer) and [`Consumer`](super::Consumer).
#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    /// Local validation or protocol failure (oversized message, bad queue name, bad frame).
    Frame(FrameError),
    /// The broker went away without sending the close sentinel.
    ConnectionClosed,
    /// The broker sent the close sentinel, normally because it is stopping.
    Canceled,
    /// The handle was already closed with `close()`.
    AlreadyClosed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {e}"),
            ClientError::Frame(e) => write!(f, "{e}"),
            ClientError::ConnectionClosed => write!(f, "connection closed by broker"),
            ClientError::Canceled => write!(f, "broker closed the queue"),
            ClientError::AlreadyClosed => write!(f, "handle already closed"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::ConnectionClosed => ClientError::ConnectionClosed,
            FrameError::Io(io) => ClientError::Io(io),
            other => ClientError::Frame(other),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        FrameError::from(e).into()
    }
}
