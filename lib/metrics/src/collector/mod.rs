use crate::sample::ReadingGroup;
use crate::schema::GraphConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::error;

pub mod cpu;
pub mod net;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
}

/// A source of monotonically increasing OS counters.
///
/// Sources hold no state between calls: every snapshot re-reads the
/// underlying table. Records that do not have the expected shape are skipped;
/// only an unreadable table is an error.
pub trait CounterSource: Send + Sync {
    /// Short description used in logs (usually the path read).
    fn name(&self) -> String;

    /// Reads the counters once, preserving the enumeration order of the OS.
    fn snapshot(&self) -> Result<Vec<ReadingGroup>, SourceError>;

    /// Describes the graphs for the series found in `groups`.
    fn graphs(&self, groups: &[ReadingGroup]) -> Vec<GraphConfig>;
}

/// Reads a whole counter table in one go.
pub(crate) fn read_table(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path).map_err(|source| {
        error!("Failed to read {}: {}", path.display(), source);
        SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    })
}
