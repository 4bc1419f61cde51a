use std::borrow::Borrow;
use std::fmt;

use super::{FrameError, MAX_QUEUE_NAME_LEN};

/// Validated queue name: non-empty UTF-8, at most `MAX_QUEUE_NAME_LEN` bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self, FrameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FrameError::MalformedFrame("empty queue name"));
        }
        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(FrameError::QueueNameTooLong { len: name.len() });
        }
        Ok(Self(name))
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, FrameError> {
        let name = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for QueueName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
