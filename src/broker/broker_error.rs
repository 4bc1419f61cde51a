use std::{fmt, io};

/// Errors that stop a broker from running. Session-level failures never surface here.
#[derive(Debug)]
pub enum BrokerError {
    /// The listening socket could not be bound.
    Bind { addr: String, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Bind { addr, source } => write!(f, "cannot bind {addr}: {source}"),
            BrokerError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Bind { source, .. } => Some(source),
            BrokerError::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for BrokerError {
    fn from(e: io::Error) -> Self {
        BrokerError::Io(e)
    }
}
