#[cfg(test)]
use super::setup_spool;
use super::lock::{ExclusiveLock, LockFailure};
use getset::{CopyGetters, Getters};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, trace};
use typed_builder::TypedBuilder;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("cannot open spool {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("cannot lock spool {}: {source}", path.display())]
    Lock { path: PathBuf, source: io::Error },

    #[error("gave up waiting for the lock on spool {} after {waited:?}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("I/O error on spool {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// A file-backed, lock-protected buffer of formatted samples.
///
/// `Spool` itself only knows the path; every operation opens its own
/// descriptor, so two drains (or a drain and a writer) always contend on the
/// lock even inside one process.
#[derive(Debug, Clone, Getters, CopyGetters, TypedBuilder)]
pub struct Spool {
    #[builder(setter(into))]
    #[getset(get = "pub")]
    path: PathBuf,
    /// Bound on how long `drain` waits for the lock. `None` blocks.
    #[builder(default)]
    #[getset(get_copy = "pub")]
    lock_timeout: Option<Duration>,
}

impl Spool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Spool::builder().path(path).build()
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Opens (creating if needed) the spool for appending. The sampler keeps
    /// the returned writer for its whole lifetime.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn writer(&self) -> Result<SpoolWriter, SpoolError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(|source| {
                error!("Failed to open spool for appending: {}", source);
                SpoolError::Open {
                    path: self.path.clone(),
                    source,
                }
            })?;

        debug!("Spool opened for appending");
        Ok(SpoolWriter {
            file,
            path: self.path.clone(),
        })
    }

    /// Appends one batch through a short-lived writer.
    pub fn append(&self, batch: &[u8]) -> Result<(), SpoolError> {
        self.writer()?.append(batch)
    }

    /// Atomically takes everything buffered so far and leaves the spool empty.
    ///
    /// A spool that was never created (no sampler has run yet) drains to
    /// nothing and stays absent.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn drain(&self) -> Result<Vec<u8>, SpoolError> {
        let file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Spool does not exist yet, nothing to drain");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(SpoolError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let _lock = lock(&file, &self.path, self.lock_timeout)?;

        let mut content = Vec::new();
        (&file)
            .read_to_end(&mut content)
            .map_err(|source| io_error(&self.path, source))?;
        file.set_len(0)
            .map_err(|source| io_error(&self.path, source))?;

        debug!(bytes = content.len(), "Spool drained");
        Ok(content)
    }
}

/// Append side of a spool, holding one `O_APPEND` descriptor.
#[derive(Debug)]
pub struct SpoolWriter {
    file: File,
    path: PathBuf,
}

impl SpoolWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the whole batch under the spool lock.
    pub fn append(&self, batch: &[u8]) -> Result<(), SpoolError> {
        if batch.is_empty() {
            return Ok(());
        }

        let _lock = lock(&self.file, &self.path, None)?;
        (&self.file)
            .write_all(batch)
            .and_then(|_| (&self.file).flush())
            .map_err(|source| {
                error!("Failed to append to spool {}: {}", self.path.display(), source);
                io_error(&self.path, source)
            })?;

        trace!(bytes = batch.len(), "Batch appended");
        Ok(())
    }
}

fn lock<'a>(
    file: &'a File,
    path: &Path,
    timeout: Option<Duration>,
) -> Result<ExclusiveLock<'a>, SpoolError> {
    ExclusiveLock::acquire(file, timeout).map_err(|failure| match failure {
        LockFailure::TimedOut(waited) => SpoolError::LockTimeout {
            path: path.to_path_buf(),
            waited,
        },
        LockFailure::Io(source) => SpoolError::Lock {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn io_error(path: &Path, source: io::Error) -> SpoolError {
    SpoolError::Io {
        path: path.to_path_buf(),
        source,
    }
}
