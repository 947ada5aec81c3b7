use std::io::{Read, Write};
use std::process::{ChildStdin, ChildStdout};

/// The write end of the driver's stdin pipe.
///
/// Frames written here are read by the driver. Dropping this handle closes
/// the pipe, which well-behaved drivers treat as a shutdown request.
pub struct DriverStdin {
    inner: ChildStdin,
}

/// The read end of the driver's stdout pipe.
///
/// All frames the driver sends arrive here. The connection layer owns this
/// handle on its dispatch thread.
pub struct DriverStdout {
    inner: ChildStdout,
}

impl DriverStdin {
    pub(crate) fn new(inner: ChildStdin) -> Self {
        Self { inner }
    }
}

impl DriverStdout {
    pub(crate) fn new(inner: ChildStdout) -> Self {
        Self { inner }
    }
}

impl Write for DriverStdin {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Read for DriverStdout {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl std::fmt::Debug for DriverStdin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverStdin").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for DriverStdout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverStdout").finish_non_exhaustive()
    }
}
