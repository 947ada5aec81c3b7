//! Poison-tolerant locking.
//!
//! A panic in an event handler must not brick the shared tables for every
//! other thread, so all internal locks recover the guard from a poisoned
//! mutex instead of propagating the panic.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
