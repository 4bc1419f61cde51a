use std::fmt;

use super::{CONSUMER_ROLE, FrameError, PRODUCER_ROLE};

/// What a connection does for its whole lifetime, fixed by the first handshake frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    pub fn from_wire(bytes: &[u8]) -> Result<Role, FrameError> {
        match bytes {
            b if b == PRODUCER_ROLE.as_bytes() => Ok(Role::Producer),
            b if b == CONSUMER_ROLE.as_bytes() => Ok(Role::Consumer),
            other => Err(FrameError::UnknownRole(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Producer => PRODUCER_ROLE,
            Role::Consumer => CONSUMER_ROLE,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
