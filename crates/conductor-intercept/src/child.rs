//! Child process spawning and non-blocking stream access.
//!
//! The worker is spawned with all three standard streams piped. Its stdout
//! and stderr fds are switched to non-blocking mode for integration with
//! `poll()`; its stdin is wrapped in a shared handle so the host-stdin
//! forwarder and the injector serialize on the same lock, one whole write at
//! a time.

use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use conductor_types::ConductorError;

/// Outcome of one non-blocking read from a child stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// No data available right now (EAGAIN).
    Empty,
    /// The stream reached end-of-file (writer closed).
    Closed,
}

/// Shared, serialized access to the child's stdin.
///
/// Cloning is cheap; all clones write through the same lock, so an injection
/// and a forwarded host-stdin chunk can interleave only at write boundaries,
/// never inside one.
#[derive(Clone)]
#[derive(Debug)]
pub struct StdinHandle {
    inner: Arc<Mutex<Option<ChildStdin>>>,
}

impl StdinHandle {
    fn new(stdin: ChildStdin) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stdin))),
        }
    }

    /// Write a whole buffer to the child's stdin.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), ConductorError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ConductorError::StdinUnwritable("stdin lock poisoned".into()))?;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| ConductorError::StdinUnwritable("stdin closed".into()))?;
        stdin
            .write_all(bytes)
            .and_then(|_| stdin.flush())
            .map_err(|e| ConductorError::StdinUnwritable(e.to_string()))
    }

    /// Write text followed by a newline.
    pub fn write_line(&self, text: &str) -> Result<(), ConductorError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.write_all(&bytes)
    }

    /// Drop the underlying pipe, delivering EOF to the child. Later writes
    /// fail with `StdinUnwritable`.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.take();
        }
    }
}

/// The wrapped worker process and its piped streams.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdin: StdinHandle,
}

impl ChildProcess {
    /// Spawn `command` with piped stdio and a color hint in the environment.
    ///
    /// Workers detect the pipe and drop color by default; `FORCE_COLOR` /
    /// `CLICOLOR_FORCE` ask them to keep emitting it so the host terminal
    /// sees the same output it would without the conductor in between.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, ConductorError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("FORCE_COLOR", "1")
            .env("CLICOLOR_FORCE", "1")
            .spawn()
            .map_err(|e| ConductorError::ChildSpawnFailed(format!("{command}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConductorError::ChildSpawnFailed("no stdout pipe".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConductorError::ChildSpawnFailed("no stderr pipe".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConductorError::ChildSpawnFailed("no stdin pipe".into()))?;

        set_nonblocking(stdout.as_raw_fd())?;
        set_nonblocking(stderr.as_raw_fd())?;

        Ok(Self {
            child,
            stdout,
            stderr,
            stdin: StdinHandle::new(stdin),
        })
    }

    /// A clonable handle to the child's stdin.
    pub fn stdin(&self) -> StdinHandle {
        self.stdin.clone()
    }

    /// The child's process id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Poll stdout and stderr for readability.
    ///
    /// Returns `(stdout_ready, stderr_ready)`; POLLHUP counts as ready so a
    /// closed stream is drained to EOF rather than ignored.
    pub fn poll(&self, timeout_ms: i32) -> Result<(bool, bool), ConductorError> {
        let mut fds = [
            PollFd::new(self.stdout.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.stderr.as_fd(), PollFlags::POLLIN),
        ];
        let timeout = if timeout_ms < 0 {
            PollTimeout::NONE
        } else {
            PollTimeout::try_from(timeout_ms as u32).unwrap_or(PollTimeout::MAX)
        };

        match nix::poll::poll(&mut fds, timeout) {
            Ok(0) => Ok((false, false)),
            Ok(_) => {
                let ready = |fd: &PollFd| {
                    let revents = fd.revents().unwrap_or(PollFlags::empty());
                    revents.contains(PollFlags::POLLIN) || revents.contains(PollFlags::POLLHUP)
                };
                Ok((ready(&fds[0]), ready(&fds[1])))
            }
            Err(nix::errno::Errno::EINTR) => Ok((false, false)),
            Err(e) => Err(ConductorError::Intercept(format!("poll: {e}"))),
        }
    }

    /// Non-blocking read from the child's stdout.
    pub fn read_stdout(&self, buf: &mut [u8]) -> Result<ReadStatus, ConductorError> {
        read_nonblocking(self.stdout.as_raw_fd(), buf)
    }

    /// Non-blocking read from the child's stderr.
    pub fn read_stderr(&self, buf: &mut [u8]) -> Result<ReadStatus, ConductorError> {
        read_nonblocking(self.stderr.as_raw_fd(), buf)
    }

    /// Check whether the child has exited, without blocking.
    ///
    /// Returns `(code, signal)` once: the exit code (0 when killed by a
    /// signal) and the terminating signal if any.
    pub fn try_wait(&mut self) -> Result<Option<(i32, Option<i32>)>, ConductorError> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(split_status(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(ConductorError::Intercept(format!("wait: {e}"))),
        }
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<(i32, Option<i32>), ConductorError> {
        self.child
            .wait()
            .map(split_status)
            .map_err(|e| ConductorError::Intercept(format!("wait: {e}")))
    }

    /// Ask the child to exit with SIGTERM.
    pub fn terminate(&self) -> Result<(), ConductorError> {
        signal::kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM)
            .map_err(|e| ConductorError::Intercept(format!("kill SIGTERM: {e}")))
    }

    /// Kill the child outright.
    pub fn kill(&mut self) -> Result<(), ConductorError> {
        self.child
            .kill()
            .map_err(|e| ConductorError::Intercept(format!("kill: {e}")))
    }
}

fn split_status(status: std::process::ExitStatus) -> (i32, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code().unwrap_or(0), status.signal())
}

fn set_nonblocking(fd: RawFd) -> Result<(), ConductorError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| ConductorError::Intercept(format!("fcntl F_GETFL: {e}")))?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
        .map_err(|e| ConductorError::Intercept(format!("fcntl F_SETFL: {e}")))?;
    Ok(())
}

fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> Result<ReadStatus, ConductorError> {
    match nix::unistd::read(fd, buf) {
        Ok(0) => Ok(ReadStatus::Closed),
        Ok(n) => Ok(ReadStatus::Data(n)),
        Err(nix::errno::Errno::EAGAIN) => Ok(ReadStatus::Empty),
        Err(e) => Err(ConductorError::Intercept(format!("read: {e}"))),
    }
}
