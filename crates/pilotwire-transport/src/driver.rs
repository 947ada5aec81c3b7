use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::pipe::{DriverStdin, DriverStdout};

/// How to launch the driver process.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Path to the driver executable.
    pub executable: PathBuf,
    /// Arguments passed to the driver.
    pub args: Vec<String>,
    /// Extra environment variables for the driver (inherits the rest).
    pub env: Vec<(String, String)>,
    /// Working directory for the driver, if different from ours.
    pub cwd: Option<PathBuf>,
    /// Capture the driver's stderr and re-emit it through tracing.
    ///
    /// When `false` the driver inherits this process's stderr instead.
    pub forward_stderr: bool,
}

impl DriverConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            forward_stderr: true,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_forward_stderr(mut self, forward: bool) -> Self {
        self.forward_stderr = forward;
        self
    }
}

/// A running driver process.
///
/// Owns the child handle for its whole lifetime. The stdin/stdout pipe ends
/// are handed out exactly once via [`DriverProcess::take_pipes`]; from then
/// on the connection layer does all the talking while this type retains
/// process control (waiting, shutdown, kill).
pub struct DriverProcess {
    child: Child,
    program: PathBuf,
    pipes: Option<(DriverStdin, DriverStdout)>,
    stderr_pump: Option<JoinHandle<()>>,
}

impl DriverProcess {
    /// Poll interval used while waiting for the driver to exit.
    const REAP_POLL: Duration = Duration::from_millis(10);

    /// Spawn the driver with piped stdin/stdout.
    pub fn spawn(config: DriverConfig) -> Result<Self> {
        let mut command = Command::new(&config.executable);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        for (key, value) in &config.env {
            command.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        command.stderr(if config.forward_stderr {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = command.spawn().map_err(|e| TransportError::Spawn {
            program: config.executable.clone(),
            source: e,
        })?;

        // Both ends exist because we asked for Stdio::piped above.
        let stdin = child.stdin.take().map(DriverStdin::new);
        let stdout = child.stdout.take().map(DriverStdout::new);
        let pipes = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Some((stdin, stdout)),
            _ => {
                let _ = child.kill();
                return Err(TransportError::Spawn {
                    program: config.executable.clone(),
                    source: std::io::Error::other("driver stdio was not piped"),
                });
            }
        };

        let stderr_pump = child.stderr.take().and_then(spawn_stderr_pump);

        info!(program = %config.executable.display(), pid = child.id(), "spawned driver");
        Ok(Self {
            child,
            program: config.executable,
            pipes,
            stderr_pump,
        })
    }

    /// Hand out the driver's pipe ends. Callable exactly once.
    pub fn take_pipes(&mut self) -> Result<(DriverStdin, DriverStdout)> {
        self.pipes.take().ok_or(TransportError::PipesTaken)
    }

    /// OS process id of the driver.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The executable this driver was launched from.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Check whether the driver has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(TransportError::Wait)
    }

    /// Ask the driver to exit and reap it, escalating to kill after `grace`.
    ///
    /// Closing stdin is the exit request: a conforming driver treats the EOF
    /// as "no more calls are coming" and terminates. Pipes still held by the
    /// connection layer must be dropped before calling this, otherwise the
    /// driver never sees the EOF and the grace period is spent in full.
    pub fn shutdown(&mut self, grace: Duration) -> Result<ExitStatus> {
        self.pipes = None;
        drop(self.child.stdin.take());

        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.try_wait()? {
                debug!(pid = self.child.id(), %status, "driver exited");
                self.join_stderr_pump();
                return Ok(status);
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Self::REAP_POLL);
        }

        warn!(pid = self.child.id(), "driver ignored shutdown, killing");
        self.kill()?;
        let status = self.child.wait().map_err(TransportError::Wait)?;
        self.join_stderr_pump();
        Ok(status)
    }

    /// Kill the driver immediately.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill().map_err(TransportError::Kill)
    }

    fn join_stderr_pump(&mut self) {
        if let Some(pump) = self.stderr_pump.take() {
            let _ = pump.join();
        }
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                debug!(pid = self.child.id(), "driver still running on drop, killing");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
        self.join_stderr_pump();
    }
}

impl std::fmt::Debug for DriverProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverProcess")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .field("pipes_taken", &self.pipes.is_none())
            .finish()
    }
}

/// Copies driver stderr lines into our logs until the pipe closes.
///
/// Returns `None` if the pump thread could not be started; the driver still
/// runs, we just lose its stderr.
fn spawn_stderr_pump(stderr: std::process::ChildStderr) -> Option<JoinHandle<()>> {
    let spawned = std::thread::Builder::new()
        .name("pilotwire-driver-stderr".to_owned())
        .spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(line) => debug!(target: "pilotwire::driver", "{line}"),
                    Err(_) => break,
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "could not start stderr pump");
            None
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn cat_config() -> DriverConfig {
        DriverConfig::new("/bin/cat").with_forward_stderr(false)
    }

    #[test]
    fn spawn_take_pipes_echo() {
        let mut driver = DriverProcess::spawn(cat_config()).unwrap();
        let (mut stdin, mut stdout) = driver.take_pipes().unwrap();

        stdin.write_all(b"ping").unwrap();
        stdin.flush().unwrap();

        let mut buf = [0u8; 4];
        stdout.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        drop(stdin);
        driver.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn take_pipes_is_single_shot() {
        let mut driver = DriverProcess::spawn(cat_config()).unwrap();
        let first = driver.take_pipes();
        assert!(first.is_ok());
        let second = driver.take_pipes();
        assert!(matches!(second, Err(TransportError::PipesTaken)));
    }

    #[test]
    fn shutdown_reaps_on_stdin_eof() {
        let mut driver = DriverProcess::spawn(cat_config()).unwrap();
        // cat exits as soon as its stdin closes.
        let status = driver.shutdown(Duration::from_secs(5)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn shutdown_escalates_to_kill() {
        let config = DriverConfig::new("/bin/sh")
            .with_args(["-c", "sleep 30"])
            .with_forward_stderr(false);
        let mut driver = DriverProcess::spawn(config).unwrap();
        let status = driver.shutdown(Duration::from_millis(100)).unwrap();
        assert!(!status.success());
    }

    #[test]
    fn try_wait_reports_exit() {
        let config = DriverConfig::new("/bin/sh")
            .with_args(["-c", "exit 0"])
            .with_forward_stderr(false);
        let mut driver = DriverProcess::spawn(config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if driver.try_wait().unwrap().is_some() {
                break;
            }
            assert!(Instant::now() < deadline, "driver never exited");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn spawn_reports_missing_executable() {
        let config = DriverConfig::new("/nonexistent/driver-binary");
        let err = DriverProcess::spawn(config).unwrap_err();
        match err {
            TransportError::Spawn { program, .. } => {
                assert_eq!(program, PathBuf::from("/nonexistent/driver-binary"));
            }
            other => panic!("expected Spawn error, got {other}"),
        }
    }

    #[test]
    fn config_builders_accumulate() {
        let config = DriverConfig::new("drv")
            .with_arg("run-driver")
            .with_args(["--stdio"])
            .with_env("DEBUG", "pw:*")
            .with_cwd("/tmp");
        assert_eq!(config.args, vec!["run-driver", "--stdio"]);
        assert_eq!(config.env, vec![("DEBUG".to_owned(), "pw:*".to_owned())]);
        assert_eq!(config.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert!(config.forward_stderr);
    }
}
