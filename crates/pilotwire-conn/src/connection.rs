//! Connection lifecycle and frame dispatch.
//!
//! [`Connection::start`] takes ownership of the driver's byte streams and
//! spawns one dispatch thread. That thread is the only reader and the only
//! mutator of the object registry: it decodes each inbound frame, classifies
//! it and either settles a pending call, builds or disposes proxies, or
//! emits an event. Callers run on their own threads, write frames under the
//! writer lock and block on a [`CallWaiter`] until the dispatch thread
//! settles it.
//!
//! Lifecycle is strictly forward: `Idle → Running → Closing → Closed`.
//! Closing begins when the caller asks for it, when a write fails, or when
//! the inbound stream ends or turns malformed. Closed is reached once every
//! pending call has been failed and the registry disposed.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pilotwire_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD};
use pilotwire_transport::{DriverConfig, DriverProcess};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::error::{ConnError, Result};
use crate::message::{CallFrame, CallMetadata, Incoming, RawFrame, RemoteError};
use crate::owner::{GenericObject, ObjectCore, RemoteObject};
use crate::registry::{Registry, TypeRegistry};
use crate::sync::lock;
use crate::waiter::{promise, Promise, Waiter};

/// Guid of the local root object. It exists before the first frame and is
/// the parent of every top-level object the driver creates.
pub const ROOT_GUID: &str = "";

/// Applied to blocking waits when the config does not override it.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning for one connection.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Timeout applied by [`CallWaiter::wait`]; `None` waits forever.
    pub default_call_timeout: Option<Duration>,
    /// Upper bound for a single frame payload, both directions.
    pub max_frame_size: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        ConnConfig {
            default_call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_frame_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Where the connection is in its life. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnPhase {
    Idle,
    Running,
    Closing,
    Closed,
}

struct PendingCall {
    guid: String,
    method: String,
    promise: Promise<Result<serde_json::Value>>,
}

/// Outstanding call handed back by [`Connection::send_call`].
///
/// Dropping it abandons the call locally; a late result still settles the
/// table entry and is then discarded.
pub struct CallWaiter {
    id: u64,
    waiter: Waiter<Result<serde_json::Value>>,
    default_timeout: Option<Duration>,
}

impl CallWaiter {
    /// Wire id of the call, unique per connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the driver answers, honoring the connection's default
    /// call timeout.
    pub fn wait(self) -> Result<serde_json::Value> {
        match self.default_timeout {
            None => self.waiter.wait(),
            Some(timeout) => match self.waiter.wait_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(_) => Err(ConnError::Timeout(timeout)),
            },
        }
    }

    /// Blocks with an explicit timeout for this call only.
    pub fn wait_timeout(self, timeout: Duration) -> Result<serde_json::Value> {
        match self.waiter.wait_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnError::Timeout(timeout)),
        }
    }

    /// Blocks until the driver answers or the connection dies, regardless
    /// of any configured default timeout.
    pub fn wait_forever(self) -> Result<serde_json::Value> {
        self.waiter.wait()
    }
}

impl std::fmt::Debug for CallWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallWaiter").field("id", &self.id).finish()
    }
}

pub(crate) struct ConnState {
    config: ConnConfig,
    types: TypeRegistry,
    weak_self: Weak<ConnState>,
    root: Arc<dyn RemoteObject>,
    writer: Mutex<Option<FrameWriter<Box<dyn Write + Send>>>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    registry: Mutex<Registry>,
    object_waiters: Mutex<HashMap<String, Vec<Promise<Result<Arc<dyn RemoteObject>>>>>>,
    next_id: AtomicU64,
    phase: Mutex<ConnPhase>,
}

/// A live connection to a driver process.
pub struct Connection {
    state: Arc<ConnState>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connects over an established byte stream pair and starts the
    /// dispatch thread. `reader` carries driver-to-client frames, `writer`
    /// client-to-driver.
    pub fn start<R, W>(reader: R, writer: W, types: TypeRegistry, config: ConnConfig) -> Arc<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let frame_config = FrameConfig {
            max_payload_size: config.max_frame_size,
        };
        let frame_writer = FrameWriter::with_config(
            Box::new(writer) as Box<dyn Write + Send>,
            frame_config.clone(),
        );
        let frame_reader = FrameReader::with_config(reader, frame_config);

        let state = Arc::new_cyclic(|weak: &Weak<ConnState>| {
            let root_channel = Channel::new(ROOT_GUID.to_owned(), weak.clone());
            let root_core = ObjectCore::new(
                ROOT_GUID.to_owned(),
                "Root".to_owned(),
                serde_json::Value::Null,
                None,
                root_channel,
            );
            ConnState {
                config,
                types,
                weak_self: weak.clone(),
                root: Arc::new(GenericObject::new(root_core)),
                writer: Mutex::new(Some(frame_writer)),
                pending: Mutex::new(HashMap::new()),
                registry: Mutex::new(Registry::new()),
                object_waiters: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                phase: Mutex::new(ConnPhase::Idle),
            }
        });
        lock(&state.registry).insert(Arc::clone(&state.root));
        state.advance_phase(ConnPhase::Running);
        info!("connection running");

        let dispatch_state = Arc::clone(&state);
        let spawned = thread::Builder::new()
            .name("pilotwire-dispatch".into())
            .spawn(move || run_dispatch(dispatch_state, frame_reader));
        let dispatch = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn dispatch thread");
                state.finalize("dispatch thread could not be spawned");
                None
            }
        };

        Arc::new(Connection {
            state,
            dispatch: Mutex::new(dispatch),
        })
    }

    /// Spawns the driver process and connects over its stdio pipes.
    ///
    /// The process is returned alongside the connection so the caller
    /// decides its lifetime; the usual order is [`close`](Self::close),
    /// then [`DriverProcess::shutdown`].
    pub fn launch(
        driver: DriverConfig,
        types: TypeRegistry,
        config: ConnConfig,
    ) -> Result<(Arc<Self>, DriverProcess)> {
        let mut process = DriverProcess::spawn(driver)?;
        let (stdin, stdout) = process.take_pipes()?;
        let connection = Connection::start(stdout, stdin, types, config);
        Ok((connection, process))
    }

    /// Issues a call against an object guid without blocking.
    pub fn send_call(
        &self,
        guid: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<CallWaiter> {
        self.state.send_call(guid, method, params, None)
    }

    /// Looks up a live proxy by guid.
    pub fn object(&self, guid: &str) -> Option<Arc<dyn RemoteObject>> {
        lock(&self.state.registry).get(guid)
    }

    /// The local root object; always available, disposed once the
    /// connection closes.
    pub fn root(&self) -> Arc<dyn RemoteObject> {
        Arc::clone(&self.state.root)
    }

    /// Blocks until the driver has announced the object with `guid`, or
    /// until `timeout` expires. Returns immediately when it already exists.
    pub fn wait_for_object(
        &self,
        guid: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn RemoteObject>> {
        self.state.wait_for_object(guid, timeout)
    }

    pub fn phase(&self) -> ConnPhase {
        self.state.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.state.phase() == ConnPhase::Closed
    }

    /// Starts a graceful shutdown: fails all pending calls, refuses new
    /// ones and closes the outbound stream, which a well-behaved driver
    /// takes as the request to exit. The dispatch thread finishes when the
    /// inbound stream ends; see [`wait_until_closed`](Self::wait_until_closed).
    pub fn close(&self) {
        self.state.begin_close("closed by caller");
    }

    /// Blocks until the dispatch thread has drained and the connection
    /// reached `Closed`. Returns immediately if it already has.
    pub fn wait_until_closed(&self) {
        if let Some(handle) = lock(&self.dispatch).take() {
            if handle.join().is_err() {
                error!("dispatch thread panicked");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.state.begin_close("connection dropped");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("phase", &self.state.phase())
            .field("pending", &lock(&self.state.pending).len())
            .field("objects", &lock(&self.state.registry).len())
            .finish()
    }
}

impl ConnState {
    fn phase(&self) -> ConnPhase {
        *lock(&self.phase)
    }

    /// Moves the phase forward; backwards transitions are ignored.
    /// Returns true when the phase actually changed.
    fn advance_phase(&self, next: ConnPhase) -> bool {
        let mut phase = lock(&self.phase);
        if next > *phase {
            *phase = next;
            true
        } else {
            false
        }
    }

    pub(crate) fn send_call(
        &self,
        guid: &str,
        method: &str,
        params: serde_json::Value,
        metadata: Option<CallMetadata>,
    ) -> Result<CallWaiter> {
        if self.phase() >= ConnPhase::Closing {
            return Err(ConnError::closed("connection is shutting down"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = CallFrame {
            id,
            guid: guid.to_owned(),
            method: method.to_owned(),
            params,
            metadata,
        };
        let payload = serde_json::to_vec(&frame)?;

        // Insert before writing: the response may race back on the
        // dispatch thread before this thread resumes.
        let (promise, waiter) = promise();
        lock(&self.pending).insert(
            id,
            PendingCall {
                guid: guid.to_owned(),
                method: method.to_owned(),
                promise,
            },
        );
        debug!(id, guid, method, "sending call");
        if let Err(e) = self.write_frame(&payload) {
            lock(&self.pending).remove(&id);
            self.finalize("write failed");
            return Err(e);
        }
        Ok(CallWaiter {
            id,
            waiter,
            default_timeout: self.config.default_call_timeout,
        })
    }

    fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        let Some(writer) = writer.as_mut() else {
            return Err(ConnError::closed("outbound stream already shut down"));
        };
        writer.send(payload)?;
        Ok(())
    }

    fn wait_for_object(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn RemoteObject>> {
        let waiter = {
            // Holding the waiters lock across the registry check closes the
            // race with a creation landing in between: the dispatch thread
            // inserts into the registry first and drains waiters second.
            let mut object_waiters = lock(&self.object_waiters);
            if let Some(object) = lock(&self.registry).get(guid) {
                return Ok(object);
            }
            if self.phase() >= ConnPhase::Closing {
                return Err(ConnError::closed("connection is shutting down"));
            }
            let (promise, waiter) = promise();
            object_waiters
                .entry(guid.to_owned())
                .or_default()
                .push(promise);
            waiter
        };
        debug!(guid, ?timeout, "waiting for object creation");
        match waiter.wait_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnError::Timeout(timeout)),
        }
    }

    fn dispatch(&self, incoming: Incoming) {
        match incoming {
            Incoming::Result { id, result, error } => self.handle_result(id, result, error),
            Incoming::Create {
                guid,
                object_type,
                initializer,
                parent_guid,
            } => self.handle_create(guid, object_type, initializer, parent_guid),
            Incoming::Event {
                guid,
                method,
                params,
            } => self.handle_event(&guid, &method, params),
            Incoming::Dispose { guid } => self.handle_dispose(&guid),
        }
    }

    fn handle_result(
        &self,
        id: u64,
        result: Option<serde_json::Value>,
        error: Option<RemoteError>,
    ) {
        let Some(call) = lock(&self.pending).remove(&id) else {
            // Not fatal: the caller may have given up and the entry been
            // failed at disposal, or the driver double-answered.
            warn!(id, "result for unknown call id, ignoring");
            return;
        };
        let outcome = match error {
            Some(remote) => Err(ConnError::Remote(remote)),
            None => Ok(result.unwrap_or(serde_json::Value::Null)),
        };
        debug!(
            id,
            guid = call.guid,
            method = call.method,
            ok = outcome.is_ok(),
            "call settled"
        );
        call.promise.settle(outcome);
    }

    fn handle_create(
        &self,
        guid: String,
        object_type: String,
        initializer: serde_json::Value,
        parent_guid: String,
    ) {
        debug!(guid, object_type, parent_guid, "creating remote object");
        let channel = Channel::new(guid.clone(), self.weak_self.clone());
        let core = ObjectCore::new(
            guid.clone(),
            object_type.clone(),
            initializer,
            Some(parent_guid),
            channel,
        );
        let object = self.types.construct(&object_type, core);
        if !lock(&self.registry).insert(Arc::clone(&object)) {
            return;
        }
        let waiters = lock(&self.object_waiters).remove(&guid);
        if let Some(waiters) = waiters {
            for promise in waiters {
                promise.settle(Ok(Arc::clone(&object)));
            }
        }
    }

    fn handle_event(&self, guid: &str, method: &str, params: serde_json::Value) {
        // Take the proxy out of the lock before emitting: handlers run on
        // this thread and may touch the registry themselves.
        let object = lock(&self.registry).get(guid);
        match object {
            Some(object) => {
                debug!(guid, method, "dispatching event");
                object.core().events().emit(method, &params);
            }
            None => debug!(guid, method, "event for unknown object, dropping"),
        }
    }

    fn handle_dispose(&self, guid: &str) {
        let removed = lock(&self.registry).remove_subtree(guid);
        if removed.is_empty() {
            debug!(guid, "disposal for unknown object, ignoring");
            return;
        }
        for object in &removed {
            object.core().mark_disposed();
        }
        let disposed: HashSet<&str> = removed.iter().map(|o| o.core().guid()).collect();
        let mut pending = lock(&self.pending);
        let doomed: Vec<u64> = pending
            .iter()
            .filter(|(_, call)| disposed.contains(call.guid.as_str()))
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            if let Some(call) = pending.remove(&id) {
                debug!(id, guid = call.guid, "failing call, target disposed");
                call.promise
                    .settle(Err(ConnError::TargetDisposed { guid: call.guid }));
            }
        }
        drop(pending);
        info!(guid, count = removed.len(), "disposed object subtree");
    }

    /// Caller-initiated shutdown. Stops accepting calls, fails everything
    /// outstanding and closes the outbound stream; the dispatch thread
    /// finishes the job when the inbound stream ends.
    fn begin_close(&self, reason: &str) {
        if !self.advance_phase(ConnPhase::Closing) {
            return;
        }
        info!(reason, "closing connection");
        lock(&self.writer).take();
        self.fail_pending(reason);
        self.fail_object_waiters(reason);
    }

    /// Terminal teardown, run by the dispatch thread when the inbound
    /// stream ends, and on write failure. Safe to call more than once.
    fn finalize(&self, reason: &str) {
        self.advance_phase(ConnPhase::Closing);
        lock(&self.writer).take();
        self.fail_pending(reason);
        self.fail_object_waiters(reason);
        let orphaned = lock(&self.registry).drain_all();
        for object in &orphaned {
            object.core().mark_disposed();
        }
        if self.advance_phase(ConnPhase::Closed) {
            info!(reason, "connection closed");
        }
    }

    fn fail_pending(&self, reason: &str) {
        let calls: Vec<PendingCall> = {
            let mut pending = lock(&self.pending);
            pending.drain().map(|(_, call)| call).collect()
        };
        if calls.is_empty() {
            return;
        }
        debug!(count = calls.len(), "failing pending calls");
        for call in calls {
            call.promise.settle(Err(ConnError::closed(reason)));
        }
    }

    fn fail_object_waiters(&self, reason: &str) {
        let waiters: Vec<Promise<Result<Arc<dyn RemoteObject>>>> = {
            let mut object_waiters = lock(&self.object_waiters);
            object_waiters.drain().flat_map(|(_, v)| v).collect()
        };
        for promise in waiters {
            promise.settle(Err(ConnError::closed(reason)));
        }
    }
}

/// Body of the dispatch thread: read, decode, classify, act, until the
/// stream ends or turns malformed.
fn run_dispatch<R: Read>(state: Arc<ConnState>, mut reader: FrameReader<R>) {
    let reason = loop {
        let payload = match reader.read_frame() {
            Ok(payload) => payload,
            Err(FrameError::StreamClosed) => break "stream closed".to_owned(),
            Err(e) => break format!("read failed: {e}"),
        };
        let raw: RawFrame = match serde_json::from_slice(&payload) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "frame payload is not a protocol envelope");
                break format!("malformed frame: {e}");
            }
        };
        match raw.classify() {
            Ok(incoming) => state.dispatch(incoming),
            Err(e) => {
                error!(error = %e, "envelope matches no message kind");
                break e.to_string();
            }
        }
    };
    state.finalize(&reason);
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ConnConfig::default();
        assert_eq!(config.default_call_timeout, Some(DEFAULT_CALL_TIMEOUT));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(ConnPhase::Idle < ConnPhase::Running);
        assert!(ConnPhase::Running < ConnPhase::Closing);
        assert!(ConnPhase::Closing < ConnPhase::Closed);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex as StdMutex;

    /// Drives the far end of the socket pair the way a driver would.
    struct ScriptedDriver {
        reader: FrameReader<UnixStream>,
        writer: FrameWriter<UnixStream>,
    }

    impl ScriptedDriver {
        fn read_call(&mut self) -> serde_json::Value {
            serde_json::from_slice(&self.reader.read_frame().unwrap()).unwrap()
        }

        fn send(&mut self, value: serde_json::Value) {
            self.writer.send(&serde_json::to_vec(&value).unwrap()).unwrap();
        }
    }

    fn connect(types: TypeRegistry) -> (Arc<Connection>, ScriptedDriver) {
        // One pair per direction, matching the driver's two stdio pipes;
        // closing the connection's write end reaches the driver as EOF.
        let (client_rx, driver_tx) = UnixStream::pair().unwrap();
        let (driver_rx, client_tx) = UnixStream::pair().unwrap();
        let connection = Connection::start(client_rx, client_tx, types, ConnConfig::default());
        let driver = ScriptedDriver {
            reader: FrameReader::new(driver_rx),
            writer: FrameWriter::new(driver_tx),
        };
        (connection, driver)
    }

    /// Round-trips one call so every previously sent frame is known to
    /// have been dispatched.
    fn fence(connection: &Connection, driver: &mut ScriptedDriver) {
        let waiter = connection.send_call(ROOT_GUID, "fence", json!({})).unwrap();
        let call = driver.read_call();
        driver.send(json!({"id": call["id"], "result": null}));
        waiter.wait().unwrap();
    }

    #[test]
    fn call_resolves_with_result() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        assert_eq!(connection.phase(), ConnPhase::Running);

        let waiter = connection
            .send_call(ROOT_GUID, "ping", json!({"probe": true}))
            .unwrap();
        let call = driver.read_call();
        assert_eq!(call["id"], json!(1));
        assert_eq!(call["guid"], json!(""));
        assert_eq!(call["method"], json!("ping"));
        assert_eq!(call["params"], json!({"probe": true}));

        driver.send(json!({"id": 1, "result": {"s": "pong"}}));
        assert_eq!(waiter.wait().unwrap(), json!({"s": "pong"}));
    }

    #[test]
    fn results_correlate_out_of_order() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let first = connection.send_call(ROOT_GUID, "one", json!({})).unwrap();
        let second = connection.send_call(ROOT_GUID, "two", json!({})).unwrap();
        let call_one = driver.read_call();
        let call_two = driver.read_call();
        assert_eq!(call_one["method"], json!("one"));
        assert_eq!(call_two["method"], json!("two"));

        driver.send(json!({"id": call_two["id"], "result": {"n": 2.0}}));
        driver.send(json!({"id": call_one["id"], "result": {"n": 1.0}}));
        assert_eq!(second.wait().unwrap(), json!({"n": 2.0}));
        assert_eq!(first.wait().unwrap(), json!({"n": 1.0}));
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        for expected in 1..=3u64 {
            let waiter = connection.send_call(ROOT_GUID, "tick", json!({})).unwrap();
            assert_eq!(waiter.id(), expected);
            let call = driver.read_call();
            driver.send(json!({"id": call["id"], "result": null}));
            waiter.wait().unwrap();
        }
    }

    #[test]
    fn remote_error_fails_only_that_call() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let waiter = connection.send_call(ROOT_GUID, "boom", json!({})).unwrap();
        let call = driver.read_call();
        driver.send(json!({
            "id": call["id"],
            "error": {"name": "TypeError", "message": "no such method"}
        }));
        match waiter.wait() {
            Err(ConnError::Remote(e)) => {
                assert_eq!(e.name, "TypeError");
                assert_eq!(e.message, "no such method");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The connection survives a per-call failure.
        fence(&connection, &mut driver);
        assert_eq!(connection.phase(), ConnPhase::Running);
    }

    #[test]
    fn unknown_result_id_is_ignored() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"id": 9999, "result": null}));
        fence(&connection, &mut driver);
        assert_eq!(connection.phase(), ConnPhase::Running);
    }

    #[test]
    fn creation_builds_the_object_tree() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({
            "guid": "browser@1",
            "type": "Browser",
            "initializer": {"version": "134.0"},
            "parentGuid": ""
        }));
        let browser = connection
            .wait_for_object("browser@1", Duration::from_secs(5))
            .unwrap();
        assert_eq!(browser.core().type_name(), "Browser");
        assert_eq!(browser.core().initializer(), &json!({"version": "134.0"}));
        assert_eq!(browser.core().parent_guid(), Some(""));
        assert_eq!(connection.root().core().children(), vec!["browser@1"]);
        assert!(connection.object("browser@1").is_some());
    }

    #[test]
    fn wait_for_object_sees_later_creation() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let conn = Arc::clone(&connection);
        let waiter = thread::spawn(move || {
            conn.wait_for_object("late@1", Duration::from_secs(5))
        });
        // Give the waiter a moment to register, then announce the object.
        thread::sleep(Duration::from_millis(20));
        driver.send(json!({"guid": "late@1", "type": "Gadget", "parentGuid": ""}));
        let object = waiter.join().unwrap().unwrap();
        assert_eq!(object.core().guid(), "late@1");
    }

    #[test]
    fn wait_for_object_times_out() {
        let (connection, _driver) = connect(TypeRegistry::new());
        match connection.wait_for_object("never@1", Duration::from_millis(30)) {
            Err(ConnError::Timeout(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn registered_constructor_is_used() {
        struct Browser {
            core: ObjectCore,
        }
        impl RemoteObject for Browser {
            fn core(&self) -> &ObjectCore {
                &self.core
            }
        }

        let mut types = TypeRegistry::new();
        types.register("Browser", |core| {
            Arc::new(Browser { core }) as Arc<dyn RemoteObject>
        });
        let (connection, mut driver) = connect(types);
        driver.send(json!({"guid": "b@1", "type": "Browser", "parentGuid": ""}));
        driver.send(json!({"guid": "u@1", "type": "Unregistered", "parentGuid": ""}));
        fence(&connection, &mut driver);

        // Both are live; the unregistered type fell back to a generic proxy
        // that still reports its wire type.
        assert_eq!(
            connection.object("b@1").unwrap().core().type_name(),
            "Browser"
        );
        assert_eq!(
            connection.object("u@1").unwrap().core().type_name(),
            "Unregistered"
        );
    }

    #[test]
    fn events_dispatch_in_subscription_order() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"guid": "page@1", "type": "Page", "parentGuid": ""}));
        let page = connection
            .wait_for_object("page@1", Duration::from_secs(5))
            .unwrap();

        let log = Arc::new(StdMutex::new(Vec::new()));
        for tag in ["A", "B"] {
            let log = Arc::clone(&log);
            page.core().on("console", move |params| {
                log.lock().unwrap().push(format!("{tag}:{}", params["seq"]));
            });
        }
        driver.send(json!({"guid": "page@1", "method": "console", "params": {"seq": 1}}));
        driver.send(json!({"guid": "page@1", "method": "console", "params": {"seq": 2}}));
        fence(&connection, &mut driver);
        assert_eq!(*log.lock().unwrap(), vec!["A:1", "B:1", "A:2", "B:2"]);
    }

    #[test]
    fn event_for_unknown_object_is_dropped() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"guid": "ghost@1", "method": "boo", "params": {}}));
        fence(&connection, &mut driver);
        assert_eq!(connection.phase(), ConnPhase::Running);
    }

    #[test]
    fn disposal_fails_outstanding_calls_and_cascades() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        // ""─ b@1 ─ p@1 ─ f@1, plus sibling b@2.
        for (guid, parent) in [("b@1", ""), ("p@1", "b@1"), ("f@1", "p@1"), ("b@2", "")] {
            driver.send(json!({"guid": guid, "type": "Node", "parentGuid": parent}));
        }
        let frame = connection
            .wait_for_object("f@1", Duration::from_secs(5))
            .unwrap();
        let sibling = connection
            .wait_for_object("b@2", Duration::from_secs(5))
            .unwrap();

        let doomed = frame.core().channel().start_call("slow", json!({})).unwrap();
        let untouched = sibling.core().channel().start_call("fast", json!({})).unwrap();
        driver.read_call();
        driver.read_call();

        driver.send(json!({"guid": "b@1"}));
        match doomed.wait() {
            Err(ConnError::TargetDisposed { guid }) => assert_eq!(guid, "f@1"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        fence(&connection, &mut driver);
        assert!(frame.core().is_disposed());
        assert!(connection.object("b@1").is_none());
        assert!(connection.object("p@1").is_none());
        assert!(connection.object("f@1").is_none());
        assert!(connection.object("b@2").is_some());
        assert_eq!(connection.root().core().children(), vec!["b@2"]);

        // The sibling's call is still answerable.
        driver.send(json!({"id": untouched.id(), "result": {"b": true}}));
        assert_eq!(untouched.wait().unwrap(), json!({"b": true}));

        // New calls to the disposed proxy fail locally.
        assert!(matches!(
            frame.core().channel().call("late", json!({})),
            Err(ConnError::TargetDisposed { .. })
        ));
    }

    #[test]
    fn double_disposal_is_a_no_op() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"guid": "b@1", "type": "Node", "parentGuid": ""}));
        connection
            .wait_for_object("b@1", Duration::from_secs(5))
            .unwrap();
        driver.send(json!({"guid": "b@1"}));
        driver.send(json!({"guid": "b@1"}));
        fence(&connection, &mut driver);
        assert_eq!(connection.phase(), ConnPhase::Running);
    }

    #[test]
    fn transport_closure_fails_everything() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"guid": "b@1", "type": "Node", "parentGuid": ""}));
        let object = connection
            .wait_for_object("b@1", Duration::from_secs(5))
            .unwrap();
        let waiter = connection.send_call(ROOT_GUID, "ping", json!({})).unwrap();
        driver.read_call();

        drop(driver);
        match waiter.wait() {
            Err(ConnError::ConnectionClosed { .. }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        connection.wait_until_closed();
        assert_eq!(connection.phase(), ConnPhase::Closed);
        assert!(object.core().is_disposed());
        assert!(connection.root().core().is_disposed());
        assert!(connection.object("b@1").is_none());

        // Later calls fail fast.
        assert!(matches!(
            connection.send_call(ROOT_GUID, "ping", json!({})),
            Err(ConnError::ConnectionClosed { .. })
        ));
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let waiter = connection.send_call(ROOT_GUID, "ping", json!({})).unwrap();
        driver.read_call();
        driver.writer.send(b"this is not json").unwrap();
        assert!(matches!(
            waiter.wait(),
            Err(ConnError::ConnectionClosed { .. })
        ));
        connection.wait_until_closed();
        assert_eq!(connection.phase(), ConnPhase::Closed);
    }

    #[test]
    fn unclassifiable_envelope_is_fatal() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        driver.send(json!({"unrelated": true}));
        connection.wait_until_closed();
        assert_eq!(connection.phase(), ConnPhase::Closed);
    }

    #[test]
    fn timeout_leaves_the_connection_usable() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let waiter = connection.send_call(ROOT_GUID, "slow", json!({})).unwrap();
        let call = driver.read_call();
        match waiter.wait_timeout(Duration::from_millis(30)) {
            Err(ConnError::Timeout(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The late answer settles the table entry and is discarded.
        driver.send(json!({"id": call["id"], "result": {"s": "too late"}}));
        fence(&connection, &mut driver);
        assert_eq!(connection.phase(), ConnPhase::Running);
    }

    #[test]
    fn close_refuses_new_calls_and_fails_outstanding() {
        let (connection, mut driver) = connect(TypeRegistry::new());
        let waiter = connection.send_call(ROOT_GUID, "ping", json!({})).unwrap();
        driver.read_call();
        connection.close();
        assert!(matches!(
            waiter.wait(),
            Err(ConnError::ConnectionClosed { .. })
        ));
        assert!(matches!(
            connection.send_call(ROOT_GUID, "ping", json!({})),
            Err(ConnError::ConnectionClosed { .. })
        ));
        assert!(connection.phase() >= ConnPhase::Closing);

        // The driver sees EOF on its inbound stream; once it hangs up, the
        // dispatch thread drains and the connection reaches Closed.
        assert!(matches!(
            driver.reader.read_frame(),
            Err(FrameError::StreamClosed)
        ));
        drop(driver);
        connection.wait_until_closed();
        assert_eq!(connection.phase(), ConnPhase::Closed);
    }

    #[test]
    fn root_is_seeded_before_any_frame() {
        let (connection, _driver) = connect(TypeRegistry::new());
        let root = connection.root();
        assert_eq!(root.core().guid(), ROOT_GUID);
        assert_eq!(root.core().type_name(), "Root");
        assert_eq!(root.core().parent_guid(), None);
        assert!(!root.core().is_disposed());
        assert!(connection.object(ROOT_GUID).is_some());
    }

    #[test]
    fn launch_connects_over_child_stdio() {
        // cat echoes our own call envelope back, which classifies as a
        // result and settles the call with a null payload.
        let (connection, mut process) = Connection::launch(
            DriverConfig::new("/bin/cat"),
            TypeRegistry::new(),
            ConnConfig::default(),
        )
        .unwrap();
        let echoed = connection
            .send_call(ROOT_GUID, "echo", json!({"x": 1}))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(echoed, serde_json::Value::Null);

        connection.close();
        let status = process.shutdown(Duration::from_secs(5)).unwrap();
        assert!(status.success());
        connection.wait_until_closed();
        assert_eq!(connection.phase(), ConnPhase::Closed);
    }
}
