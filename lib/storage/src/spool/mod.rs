//! # Spool
//!
//! A spool is a plain file that buffers formatted samples between the sampler,
//! which appends one batch per tick, and `fetch`, which drains everything that
//! accumulated since the previous drain.
//!
//! Both sides take the same exclusive advisory lock (`flock(2)`) on the file:
//!
//! - `append` holds it for the whole batch, so a drain sees a batch entirely or
//!   not at all.
//! - `drain` holds it across read and truncate, so every record is handed out
//!   exactly once.
//!
//! The lock belongs to the open file description. A sampler that dies while
//! holding it releases it when the kernel tears down its descriptors.

mod lock;
mod manager;

pub use manager::{Spool, SpoolError, SpoolWriter};

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use tempfile::TempDir;

#[cfg(test)]
fn setup_spool() -> (Arc<Spool>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let name = format!("test_{}.value", rand::random::<u32>());
    let spool = Arc::new(Spool::new(temp_dir.path().join(name)));

    (spool, temp_dir)
}
