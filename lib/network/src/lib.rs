//! A minimal munin node: answers the line protocol pollers speak and runs
//! plugins from a directory on their behalf.

pub mod middleware;
pub mod node;
pub mod plugin;
pub mod protocol;
pub mod server;

pub use node::{NodeState, NodeStateRef};
pub use plugin::{PluginError, PluginOutput, PluginRunner};
pub use server::start_node;
