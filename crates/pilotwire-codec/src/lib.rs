//! Structured value codec for the pilotwire driver protocol.
//!
//! The driver exchanges arguments and results as a tagged JSON union that is
//! richer than plain JSON: it distinguishes `undefined` from `null`, carries
//! non-finite numbers and negative zero symbolically, and encodes dates,
//! regular expressions, remote-object handles, and cyclic object graphs.
//!
//! This crate converts between that wire form ([`WireValue`]) and an
//! in-process representation ([`JsValue`]) without losing any of those
//! distinctions. Conversion is a pure data transformation; nothing here
//! talks to a driver.

pub mod error;
pub mod parse;
pub mod serialize;
pub mod value;
pub mod wire;

pub use error::{CodecError, Result};
pub use parse::parse;
pub use serialize::{serialize, MAX_DEPTH};
pub use value::{HandleRef, JsRegex, JsValue, RegexFlags};
pub use wire::{SerializedArgument, WireEntry, WireRegex, WireValue};
