pub mod config;
pub mod util;

pub use self::config::*;
