use thiserror::Error;

/// Errors produced by the structured value codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value cannot be represented on the wire.
    #[error("unserializable value: {what}")]
    Unserializable { what: String },

    /// The wire tree is not a valid structured value.
    #[error("malformed wire value: {reason}")]
    Malformed { reason: String },
}

impl CodecError {
    pub(crate) fn unserializable(what: impl Into<String>) -> Self {
        CodecError::Unserializable { what: what.into() }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodecError::Malformed { reason: reason.into() }
    }
}

/// Convenience result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
