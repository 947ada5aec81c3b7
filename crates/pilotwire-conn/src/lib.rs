//! Connection, dispatch and remote object graph.
//!
//! This crate turns the byte streams of a driver process into a live object
//! graph. A [`Connection`] owns the dispatch thread that reads inbound
//! frames and keeps the guid-keyed registry of [`RemoteObject`] proxies;
//! each proxy carries a [`Channel`] for outbound calls and an
//! [`EventEmitter`] for driver-initiated notifications.
//!
//! Calls are correlated by id: the caller's thread writes the frame, parks
//! on a [`CallWaiter`] and is woken by the dispatch thread when the result
//! arrives. Object creations, disposals and events carry no id and are
//! applied to the registry in arrival order.
//!
//! ```no_run
//! use pilotwire_conn::{ConnConfig, Connection, TypeRegistry};
//! use pilotwire_transport::DriverConfig;
//! use std::time::Duration;
//!
//! # fn main() -> pilotwire_conn::Result<()> {
//! let (connection, mut driver) = Connection::launch(
//!     DriverConfig::new("driver"),
//!     TypeRegistry::new(),
//!     ConnConfig::default(),
//! )?;
//! let answer = connection
//!     .send_call("", "initialize", serde_json::json!({}))?
//!     .wait()?;
//! println!("driver said: {answer}");
//! connection.close();
//! driver.shutdown(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod connection;
pub mod error;
pub mod events;
pub mod message;
pub mod owner;
pub mod registry;
pub mod values;
pub mod waiter;

mod sync;

pub use channel::Channel;
pub use connection::{
    CallWaiter, ConnConfig, ConnPhase, Connection, DEFAULT_CALL_TIMEOUT, ROOT_GUID,
};
pub use error::{ConnError, Result};
pub use events::{EventEmitter, ListenerId};
pub use message::{CallFrame, CallMetadata, Incoming, RawFrame, RemoteError};
pub use owner::{GenericObject, ObjectCore, RemoteObject};
pub use registry::{ObjectCtor, TypeRegistry};
pub use values::{parse_result, serialize_arg};
pub use waiter::{promise, Promise, Waiter};
