//! One-shot rendezvous between the dispatch thread and a blocked caller.
//!
//! [`promise`] returns the two halves of a single-value slot. The dispatch
//! thread settles the [`Promise`]; the caller blocks on the [`Waiter`]. A
//! promise settles at most once. Settling after the waiter has given up (or
//! been dropped) stores the value into a slot nobody reads, which is how a
//! late driver response is discarded without racing the timed-out caller.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::sync::lock;

enum State<T> {
    Pending,
    Settled(T),
    Taken,
}

struct Inner<T> {
    slot: Mutex<State<T>>,
    cv: Condvar,
}

/// Write half: settles the slot exactly once.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

/// Read half: blocks until the slot is settled.
pub struct Waiter<T> {
    inner: Arc<Inner<T>>,
}

/// Creates a fresh slot and hands back both halves.
pub fn promise<T>() -> (Promise<T>, Waiter<T>) {
    let inner = Arc::new(Inner {
        slot: Mutex::new(State::Pending),
        cv: Condvar::new(),
    });
    (
        Promise {
            inner: Arc::clone(&inner),
        },
        Waiter { inner },
    )
}

impl<T> Promise<T> {
    /// Stores the value and wakes the waiter. Returns false when the slot
    /// was already settled; the new value is dropped in that case.
    pub fn settle(&self, value: T) -> bool {
        let mut state = lock(&self.inner.slot);
        match *state {
            State::Pending => {
                *state = State::Settled(value);
                self.inner.cv.notify_all();
                true
            }
            _ => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*lock(&self.inner.slot), State::Pending)
    }
}

impl<T> Waiter<T> {
    /// Blocks until the promise settles.
    ///
    /// A promise dropped without settling leaves this blocked forever; the
    /// connection guarantees every pending call is settled on teardown.
    pub fn wait(self) -> T {
        let mut state = lock(&self.inner.slot);
        loop {
            match std::mem::replace(&mut *state, State::Taken) {
                State::Settled(value) => return value,
                other => *state = other,
            }
            state = self
                .inner
                .cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the promise settles or the timeout elapses. On expiry
    /// the waiter is handed back so the caller can keep waiting or drop it.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, Waiter<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.inner.slot);
        loop {
            match std::mem::replace(&mut *state, State::Taken) {
                State::Settled(value) => return Ok(value),
                other => *state = other,
            }
            let now = Instant::now();
            if now >= deadline {
                drop(state);
                return Err(self);
            }
            let (guard, _) = self
                .inner
                .cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}
