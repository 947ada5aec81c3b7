//! Length-prefixed message framing for the driver protocol.
//!
//! Every message the driver sends or receives is framed as a 4-byte
//! little-endian payload length followed by that many bytes of payload.
//! There is no magic number and no channel id; the stream carries exactly
//! one conversation.
//!
//! [`FrameReader`] and [`FrameWriter`] hide the byte stream entirely: no
//! partial reads, no buffer management in user code. Callers hand over any
//! `Read`/`Write` pair (in practice the driver's stdout/stdin pipes) and
//! exchange whole payloads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
