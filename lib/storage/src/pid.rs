//! The PID marker records which process runs a plugin's sampler.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PidError {
    #[error("cannot write pid marker {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot read pid marker {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot remove pid marker {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct PidMarker {
    path: PathBuf,
}

impl PidMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `pid`, replacing whatever the marker held before.
    pub fn write(&self, pid: u32) -> Result<(), PidError> {
        fs::write(&self.path, format!("{}\n", pid)).map_err(|source| PidError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(pid, path = %self.path.display(), "Pid marker written");
        Ok(())
    }

    /// The recorded pid. A missing marker reads as `None`, and so does one
    /// whose content is not a pid.
    pub fn read(&self) -> Result<Option<u32>, PidError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PidError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match content.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                warn!(path = %self.path.display(), "Ignoring malformed pid marker");
                Ok(None)
            }
        }
    }

    /// The recorded pid if that process is still alive.
    pub fn running(&self) -> Result<Option<u32>, PidError> {
        Ok(self.read()?.filter(|pid| is_alive(*pid)))
    }

    /// Deletes the marker. Removing an absent marker succeeds.
    pub fn remove(&self) -> Result<(), PidError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PidError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Checks `pid` with signal 0. A process owned by another user still counts
/// as alive.
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
