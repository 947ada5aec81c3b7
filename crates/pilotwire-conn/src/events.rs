//! Per-object event subscriptions.
//!
//! Handlers are keyed by the [`ListenerId`] returned at registration, so
//! removal never has to compare closures. Handlers run on the thread that
//! emits, which for driver events is the connection's dispatch thread:
//! a handler that blocks there stalls all further dispatch, so long work
//! belongs on another thread and calls issued from handlers should use the
//! non-blocking [`Channel::start_call`](crate::channel::Channel::start_call).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::sync::lock;

/// Registration handle; pass it back to [`EventEmitter::off`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    once: bool,
    handler: Arc<dyn Fn(&serde_json::Value) + Send + Sync>,
}

/// Dispatches named events to subscribed handlers in subscription order.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        EventEmitter::default()
    }

    /// Subscribes `handler` to `event` until removed with [`off`](Self::off).
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.subscribe(event.into(), Arc::new(handler), false)
    }

    /// Subscribes `handler` for a single delivery; it unregisters itself
    /// before it runs, so a re-entrant emit cannot fire it twice.
    pub fn once(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.subscribe(event.into(), Arc::new(handler), true)
    }

    fn subscribe(
        &self,
        event: String,
        handler: Arc<dyn Fn(&serde_json::Value) + Send + Sync>,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners)
            .entry(event)
            .or_default()
            .push(Listener { id, once, handler });
        id
    }

    /// Removes one subscription. Returns false when the id is not (or no
    /// longer) registered for `event`, which makes double-removal harmless.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|listener| listener.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).get(event).map_or(0, Vec::len)
    }

    /// Invokes every handler subscribed to `event`, in subscription order.
    ///
    /// The live table is snapshotted and the lock released before any handler
    /// runs, so handlers may freely subscribe and unsubscribe. Removals made
    /// by a handler take effect from the next emit.
    pub fn emit(&self, event: &str, params: &serde_json::Value) {
        let snapshot: Vec<Arc<dyn Fn(&serde_json::Value) + Send + Sync>> = {
            let mut listeners = lock(&self.listeners);
            let Some(entries) = listeners.get_mut(event) else {
                return;
            };
            let handlers = entries
                .iter()
                .map(|listener| Arc::clone(&listener.handler))
                .collect();
            entries.retain(|listener| !listener.once);
            if entries.is_empty() {
                listeners.remove(event);
            }
            handlers
        };
        for handler in snapshot {
            handler(params);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = lock(&self.listeners);
        let total: usize = listeners.values().map(Vec::len).sum();
        f.debug_struct("EventEmitter")
            .field("events", &listeners.len())
            .field("listeners", &total)
            .finish()
    }
}
