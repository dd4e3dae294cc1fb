use crate::middleware::MiddlewareStackRef;
use crate::plugin::PluginRunner;
use getset::{CopyGetters, Getters};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// A reference-counted reference to a [`NodeState`].
pub type NodeStateRef = Arc<NodeState>;

/// Everything a session needs to answer requests. Shared read-only by all
/// sessions.
#[derive(Debug, Getters, CopyGetters, TypedBuilder)]
pub struct NodeState {
    /// Host name announced in the greeting and in `nodes`.
    #[builder(setter(into))]
    #[getset(get = "pub")]
    host: String,
    #[getset(get = "pub")]
    runner: PluginRunner,
    /// Directory of the `spoolfetch_<host>` helper. Enables the `spool`
    /// capability when set.
    #[builder(default)]
    #[getset(get = "pub")]
    spoolfetch_dir: Option<PathBuf>,
    /// Idle time after which a session is closed.
    #[builder(default = Duration::from_secs(10))]
    #[getset(get_copy = "pub")]
    session_timeout: Duration,
    #[getset(get = "pub")]
    middleware: MiddlewareStackRef,
}

impl NodeState {
    /// Path of the spoolfetch helper for this host.
    pub fn spoolfetch_program(&self) -> Option<PathBuf> {
        self.spoolfetch_dir
            .as_ref()
            .map(|dir| dir.join(format!("spoolfetch_{}", self.host)))
    }
}
