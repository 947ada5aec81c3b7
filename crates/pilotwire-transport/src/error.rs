use std::path::PathBuf;

/// Errors that can occur while managing the driver process.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to launch the driver executable.
    #[error("failed to spawn driver {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The driver's pipe ends were already handed out.
    #[error("driver pipes already taken")]
    PipesTaken,

    /// Failed to wait on the driver process.
    #[error("failed to wait on driver: {0}")]
    Wait(std::io::Error),

    /// Failed to kill the driver process.
    #[error("failed to kill driver: {0}")]
    Kill(std::io::Error),

    /// An I/O error occurred on a driver pipe.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
