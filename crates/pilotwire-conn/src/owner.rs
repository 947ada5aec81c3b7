//! Remote object proxies.
//!
//! Every driver-side object is mirrored locally by a value implementing
//! [`RemoteObject`]. Concrete proxy types embed an [`ObjectCore`], which
//! carries the identity, lifetime state and wiring shared by all proxies:
//! guid, initializer, parent/child links, the outbound [`Channel`] and the
//! event subscriptions. Types nobody registered fall back to
//! [`GenericObject`], which is the core and nothing else.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::events::{EventEmitter, ListenerId};
use crate::sync::lock;

/// Shared state of one remote object proxy.
pub struct ObjectCore {
    guid: String,
    type_name: String,
    initializer: serde_json::Value,
    parent_guid: Option<String>,
    children: Mutex<BTreeSet<String>>,
    channel: Channel,
    events: EventEmitter,
    disposed: Arc<AtomicBool>,
}

impl ObjectCore {
    pub(crate) fn new(
        guid: String,
        type_name: String,
        initializer: serde_json::Value,
        parent_guid: Option<String>,
        channel: Channel,
    ) -> Self {
        // Core and channel observe disposal through the same flag.
        let disposed = channel.disposed_handle();
        ObjectCore {
            guid,
            type_name,
            initializer,
            parent_guid,
            children: Mutex::new(BTreeSet::new()),
            channel,
            events: EventEmitter::new(),
            disposed,
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Wire-level type name from the creation notification.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Initializer payload from the creation notification, verbatim.
    pub fn initializer(&self) -> &serde_json::Value {
        &self.initializer
    }

    /// Guid of the parent proxy; `None` only for the connection root.
    pub fn parent_guid(&self) -> Option<&str> {
        self.parent_guid.as_deref()
    }

    /// Guids of the direct children, in lexicographic order.
    pub fn children(&self) -> Vec<String> {
        lock(&self.children).iter().cloned().collect()
    }

    /// Outbound channel for calls targeting this object.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.on(event, handler)
    }

    pub fn once(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.once(event, handler)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    /// True once the driver has disposed this object (directly or through
    /// an ancestor). Disposed objects refuse new calls.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub(crate) fn add_child(&self, guid: &str) {
        lock(&self.children).insert(guid.to_owned());
    }

    pub(crate) fn remove_child(&self, guid: &str) {
        lock(&self.children).remove(guid);
    }
}

impl std::fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCore")
            .field("guid", &self.guid)
            .field("type", &self.type_name)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// A local proxy for one driver-side object.
///
/// Implementations embed an [`ObjectCore`] and return it from [`core`]
/// (see [`GenericObject`] for the minimal case); everything the connection
/// needs goes through that core. The trait is object-safe so proxies of
/// different concrete types can share the registry.
///
/// [`core`]: RemoteObject::core
pub trait RemoteObject: Send + Sync {
    fn core(&self) -> &ObjectCore;
}

impl std::fmt::Debug for dyn RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.core(), f)
    }
}

/// Fallback proxy used when no constructor is registered for a wire type.
///
/// Exposes the full core surface (channel, events, initializer) so unknown
/// objects remain fully usable, just without a typed API.
#[derive(Debug)]
pub struct GenericObject {
    core: ObjectCore,
}

impl GenericObject {
    pub fn new(core: ObjectCore) -> Self {
        GenericObject { core }
    }
}

impl RemoteObject for GenericObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }
}
