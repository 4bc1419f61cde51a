use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::broker::lock::lock;
use crate::broker::types::SessionId;

/// Sockets of the sessions that are still running, keyed by session id.
///
/// The listener keeps a clone of every accepted stream here so `stop()` can
/// shut them down from outside the session threads.
#[derive(Default)]
pub struct LiveSessions {
    streams: Mutex<HashMap<SessionId, TcpStream>>,
    drained: Condvar,
}

impl LiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: SessionId, stream: TcpStream) {
        lock(&self.streams).insert(id, stream);
    }

    /// Drop the session's socket clone; wakes `wait_empty` once the last one is gone.
    pub(crate) fn remove(&self, id: SessionId) {
        let mut streams = lock(&self.streams);
        streams.remove(&id);
        if streams.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Shut down `how` on every live socket. Errors (already closed) are ignored.
    pub(crate) fn shutdown_all(&self, how: Shutdown) -> usize {
        let streams = lock(&self.streams);
        for stream in streams.values() {
            let _ = stream.shutdown(how);
        }
        streams.len()
    }

    /// Block until no session is live or `timeout` elapses. Returns true if drained.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut streams = lock(&self.streams);
        while !streams.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            streams = match self.drained.wait_timeout(streams, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.streams).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the live sessions, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = lock(&self.streams).keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
