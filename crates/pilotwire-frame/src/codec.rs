use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a 4-byte little-endian payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 64 MiB.
///
/// Screenshots and download metadata travel inline, so driver payloads can
/// be large; anything past this limit indicates a desynchronized stream.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Append one framed payload to `dst`: the length word, then the payload
/// bytes verbatim.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Try to split one payload off the front of `src`.
///
/// `Ok(None)` means the buffer holds less than a full frame; nothing is
/// consumed and the caller should read more bytes. The length word is
/// checked against `max_payload` as soon as it is visible, before any
/// payload bytes arrive.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let announced = header.get_u32_le() as usize;
    if announced > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: announced,
            max: max_payload,
        });
    }
    if src.len() - HEADER_SIZE < announced {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(announced).freeze()))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
