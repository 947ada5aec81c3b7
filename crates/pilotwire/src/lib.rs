//! Drive an external automation process over a framed JSON protocol.
//!
//! pilotwire remote-controls a driver process through its stdio: calls go
//! out as length-prefixed JSON frames, results come back correlated by id,
//! and the driver's object graph is mirrored locally as guid-keyed proxies
//! with events and cascading disposal.
//!
//! # Crate Structure
//!
//! - [`codec`] — Structured value codec (dates, regexes, cycles, handles)
//! - [`transport`] — Driver process spawning and stdio plumbing
//! - [`frame`] — Length-prefixed frame reader/writer
//! - [`conn`] — Connection, dispatch and the remote object registry
//!   (behind the `conn` feature)

/// Re-export value codec types.
pub mod codec {
    pub use pilotwire_codec::*;
}

/// Re-export driver process types.
pub mod transport {
    pub use pilotwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pilotwire_frame::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use pilotwire_conn::*;
}
