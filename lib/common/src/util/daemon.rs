//! Detaching a process from its controlling terminal.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DetachError {
    #[error("fork failed: {0}")]
    Fork(io::Error),

    #[error("setsid failed: {0}")]
    Session(io::Error),

    #[error("cannot redirect standard streams: {0}")]
    Redirect(io::Error),
}

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    /// The original process; carries the pid of the detached child.
    Parent(i32),
    /// The detached child, now leading its own session.
    Child,
}

/// Forks, and in the child starts a new session and points stdin, stdout and
/// stderr at `/dev/null`.
///
/// Must be called while the process is still single-threaded, i.e. before any
/// async runtime is built.
pub fn detach() -> Result<Fork, DetachError> {
    // SAFETY: no other threads exist yet, so the child inherits a consistent
    // address space.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(DetachError::Fork(io::Error::last_os_error()));
    }
    if pid > 0 {
        debug!(child = pid, "Detached sampler");
        return Ok(Fork::Parent(pid));
    }

    if unsafe { libc::setsid() } < 0 {
        return Err(DetachError::Session(io::Error::last_os_error()));
    }

    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(DetachError::Redirect)?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } < 0 {
            return Err(DetachError::Redirect(io::Error::last_os_error()));
        }
    }

    Ok(Fork::Child)
}
