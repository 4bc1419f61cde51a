use std::{fmt, io};

/// Errors produced while reading or writing frames.
#[derive(Debug)]
pub enum FrameError {
    /// Transport failure other than a peer disconnect.
    Io(io::Error),
    /// The stream ended (or was reset) before a full frame was read.
    ConnectionClosed,
    /// Payload longer than `MAX_FRAME_LEN`.
    FrameTooLarge { len: usize },
    /// Length prefix outside the defined domain, or an empty/sentinel handshake field.
    MalformedFrame(&'static str),
    /// First handshake field is neither `"producer"` nor `"consumer"`.
    UnknownRole(String),
    /// Queue name longer than `MAX_QUEUE_NAME_LEN` bytes.
    QueueNameTooLong { len: usize },
    /// Queue name bytes are not valid UTF-8.
    InvalidUtf8,
}

impl FrameError {
    /// True for disconnects, which are a normal way for a session to end.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "IO error: {e}"),
            FrameError::ConnectionClosed => write!(f, "connection closed by peer"),
            FrameError::FrameTooLarge { len } => {
                write!(f, "frame too large: {len} bytes (max {})", super::MAX_FRAME_LEN)
            }
            FrameError::MalformedFrame(why) => write!(f, "malformed frame: {why}"),
            FrameError::UnknownRole(role) => write!(f, "unknown role {role:?}"),
            FrameError::QueueNameTooLong { len } => write!(
                f,
                "queue name too long: {len} bytes (max {})",
                super::MAX_QUEUE_NAME_LEN
            ),
            FrameError::InvalidUtf8 => write!(f, "queue name is not valid UTF-8"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => FrameError::ConnectionClosed,
            _ => FrameError::Io(e),
        }
    }
}
