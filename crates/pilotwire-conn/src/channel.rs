//! Outbound call surface of one remote object.
//!
//! A [`Channel`] pairs an object guid with a weak reference to the
//! connection internals. Weak, because objects must not keep a dropped
//! connection alive; a call through a channel whose connection is gone
//! fails with [`ConnError::ConnectionClosed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::connection::{CallWaiter, ConnState};
use crate::error::{ConnError, Result};
use crate::message::CallMetadata;

#[derive(Clone)]
pub struct Channel {
    guid: String,
    conn: Weak<ConnState>,
    disposed: Arc<AtomicBool>,
}

impl Channel {
    pub(crate) fn new(guid: String, conn: Weak<ConnState>) -> Self {
        Channel {
            guid,
            conn,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A channel with no connection behind it, for assembling cores in
    /// tests without a driver.
    #[cfg(test)]
    pub(crate) fn detached(guid: &str) -> Self {
        Channel::new(guid.to_owned(), Weak::new())
    }

    /// Disposal flag shared with the owning object core.
    pub(crate) fn disposed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.disposed)
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Issues a call without blocking on the response. This is the safe
    /// form inside event handlers, which run on the dispatch thread and
    /// must not wait for a result only that thread can deliver.
    pub fn start_call(&self, method: &str, params: serde_json::Value) -> Result<CallWaiter> {
        self.start_call_with_metadata(method, params, None)
    }

    pub fn start_call_with_metadata(
        &self,
        method: &str,
        params: serde_json::Value,
        metadata: Option<CallMetadata>,
    ) -> Result<CallWaiter> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ConnError::TargetDisposed {
                guid: self.guid.clone(),
            });
        }
        let Some(state) = self.conn.upgrade() else {
            return Err(ConnError::closed("connection dropped"));
        };
        state.send_call(&self.guid, method, params, metadata)
    }

    /// Issues a call and blocks until the driver answers, subject to the
    /// connection's default call timeout.
    pub fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.start_call(method, params)?.wait()
    }

    /// As [`call`](Self::call), with an explicit timeout for this call only.
    pub fn call_with_timeout(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.start_call(method, params)?.wait_timeout(timeout)
    }

    pub fn call_with_metadata(
        &self,
        method: &str,
        params: serde_json::Value,
        metadata: CallMetadata,
    ) -> Result<serde_json::Value> {
        self.start_call_with_metadata(method, params, Some(metadata))?
            .wait()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("guid", &self.guid)
            .field("connected", &(self.conn.strong_count() > 0))
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}
