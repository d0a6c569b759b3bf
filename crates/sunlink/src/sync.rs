use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering from poisoning. Everything behind our mutexes is plain
/// data that stays consistent even if a callback panicked mid-delivery.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
