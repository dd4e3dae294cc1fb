pub mod pid;
pub mod spool;

pub use pid::{PidError, PidMarker};
pub use spool::{Spool, SpoolError, SpoolWriter};
