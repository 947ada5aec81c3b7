//! Driver process transport.
//!
//! A pilotwire connection talks to exactly one driver: a child process that
//! performs the real automation work and speaks the framed protocol over its
//! stdin/stdout. This crate owns that process boundary: spawning the driver,
//! handing out its pipe ends exactly once, forwarding its stderr, and tearing
//! it down again.
//!
//! This is the lowest layer of pilotwire. The framing and connection layers
//! build on the [`DriverStdin`] and [`DriverStdout`] handles provided here.

pub mod driver;
pub mod error;
pub mod pipe;

pub use driver::{DriverConfig, DriverProcess};
pub use error::{Result, TransportError};
pub use pipe::{DriverStdin, DriverStdout};
