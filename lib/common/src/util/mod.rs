pub mod daemon;
pub mod time;
pub mod trace;
