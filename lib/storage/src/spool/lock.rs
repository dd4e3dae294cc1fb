use fs2::FileExt;
use std::fs::File;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// How often a bounded wait retries a contended lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why an exclusive lock could not be taken.
#[derive(Debug)]
pub(crate) enum LockFailure {
    TimedOut(Duration),
    Io(io::Error),
}

/// Holds an exclusive `flock` until dropped.
#[derive(Debug)]
pub(crate) struct ExclusiveLock<'a> {
    file: &'a File,
}

impl<'a> ExclusiveLock<'a> {
    /// Blocks until the lock is held, or until `timeout` has passed when one
    /// is given.
    pub(crate) fn acquire(file: &'a File, timeout: Option<Duration>) -> Result<Self, LockFailure> {
        match timeout {
            None => file.lock_exclusive().map_err(LockFailure::Io)?,
            Some(timeout) => Self::acquire_within(file, timeout)?,
        }
        Ok(Self { file })
    }

    fn acquire_within(file: &File, timeout: Duration) -> Result<(), LockFailure> {
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(LockFailure::TimedOut(waited));
                    }
                    trace!(?waited, "Spool lock contended, retrying");
                    thread::sleep(LOCK_POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(LockFailure::Io(e)),
            }
        }
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        // Closing the descriptor would release it as well.
        let _ = FileExt::unlock(self.file);
    }
}
