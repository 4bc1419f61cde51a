use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `m`, recovering the data if a previous holder panicked.
///
/// Queue state stays consistent across a panic (every mutation is a single
/// `VecDeque` call), so a poisoned lock must not wedge the other sessions.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
