/// Identifier the listener assigns to every accepted connection.
pub type SessionId = u64;
