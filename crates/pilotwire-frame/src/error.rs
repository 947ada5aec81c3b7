/// Failures in the framing layer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A length word, outgoing or incoming, exceeds the configured cap.
    #[error("frame payload of {size} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The underlying pipe failed mid-frame.
    #[error("frame transport error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream; the other side hung up.
    #[error("stream ended before a complete frame")]
    StreamClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
