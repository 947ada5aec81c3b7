use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Turns payloads into frames on a raw `Write` stream.
///
/// [`FrameWriter::send`] always leaves the stream at a frame boundary: the
/// header and payload go out in full, flushed, before it returns. On a live
/// connection the stream is the driver's stdin, shared by caller threads
/// under the connection's writer lock.
pub struct FrameWriter<T> {
    stream: T,
    staging: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self {
            stream,
            staging: BytesMut::new(),
            config,
        }
    }

    /// Frame one payload and write it out, flushing the stream.
    ///
    /// A write of zero bytes means the other side is gone and surfaces as
    /// [`FrameError::StreamClosed`].
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.staging.clear();
        encode_frame(payload, &mut self.staging)?;

        let mut rest: &[u8] = &self.staging;
        while !rest.is_empty() {
            match self.stream.write(rest) {
                Ok(0) => return Err(FrameError::StreamClosed),
                Ok(n) => rest = &rest[n..],
                Err(err) if recoverable(&err) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        trace!(bytes = payload.len(), "frame out");
        Ok(())
    }

    /// Flush the wrapped stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if recoverable(&err) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> T {
        self.stream
    }
}

// Worth another try on a blocking pipe; anything else tears the frame.
fn recoverable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock
    )
}
