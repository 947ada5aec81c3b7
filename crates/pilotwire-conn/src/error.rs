//! Error types for the connection layer.

use std::time::Duration;

use crate::message::RemoteError;

/// Errors surfaced by connections, channels and the object registry.
///
/// Only [`ConnError::ConnectionClosed`] (and the transport/frame failures
/// that lead to it) is terminal for the connection as a whole. Everything
/// else fails a single call and leaves the connection running.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Driver process management failed.
    #[error(transparent)]
    Transport(#[from] pilotwire_transport::TransportError),

    /// Reading or writing a frame failed.
    #[error(transparent)]
    Frame(#[from] pilotwire_frame::FrameError),

    /// A value could not be serialized or parsed.
    #[error(transparent)]
    Codec(#[from] pilotwire_codec::CodecError),

    /// A frame payload was not valid JSON, or a message failed to encode.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// The driver answered a call with an error.
    #[error("driver error: {0}")]
    Remote(RemoteError),

    /// The peer sent an envelope that violates the protocol.
    #[error("protocol violation: {reason}")]
    Protocol { reason: String },

    /// The connection is closed; the reason records why.
    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// The call's target object was disposed before the call completed.
    #[error("target disposed: {guid:?}")]
    TargetDisposed { guid: String },

    /// A result referenced an object guid the registry does not know.
    #[error("unknown remote object: {guid:?}")]
    UnknownObject { guid: String },

    /// No response arrived within the allotted time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl ConnError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        ConnError::Protocol {
            reason: reason.into(),
        }
    }

    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        ConnError::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// True when the error means the connection itself is gone and every
    /// outstanding and future call will fail.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnError::ConnectionClosed { .. } | ConnError::Frame(_) | ConnError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
