use crate::protocol::message::Request;
use anyhow::Result;
use async_trait::async_trait;
use core::fmt;
use getset::{CopyGetters, Getters};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

pub mod trace;

/// Identity of one poller session, handed to every middleware hook.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct SessionInfo {
    #[getset(get = "pub")]
    id: String,
    /// Peer address, or `stdio` for a session on the standard streams.
    #[getset(get = "pub")]
    peer: String,
    #[getset(get_copy = "pub")]
    started: Instant,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            peer: peer.into(),
            started: Instant::now(),
        }
    }
}

/// The `Middleware` trait defines hooks around the life of a node session.
///
/// Middleware components are executed in the order they are added to the
/// [`MiddlewareStack`]. Hooks run for TCP and stdio sessions alike, so they
/// only see the session identity and the parsed request, never the transport.
///
/// # Lifecycle Hooks
///
/// - `on_connect`: called once the greeting has been sent.
/// - `before_request`: invoked before a request is answered.
/// - `after_request`: invoked after the answer has been written.
/// - `on_disconnect`: called when the session ends, whatever the reason.
///
/// An error from `on_connect` or `before_request` ends the session.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Returns the name of the middleware, used in logs.
    fn name(&self) -> String;

    async fn on_connect(&self, session: &SessionInfo) -> Result<()>;

    async fn before_request(&self, session: &SessionInfo, request: &Request) -> Result<()>;

    async fn after_request(&self, session: &SessionInfo, request: &Request) -> Result<()>;

    async fn on_disconnect(&self, session: &SessionInfo) -> Result<()>;
}

/// A reference-counted reference to a [`MiddlewareStack`].
pub type MiddlewareStackRef = Arc<MiddlewareStack>;

/// An ordered stack of middleware components.
#[derive(Default)]
pub struct MiddlewareStack {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let start = Instant::now();
        let name = middleware.name();
        self.middlewares.push(Box::new(middleware));
        trace!(
            "Added middleware {} to middleware stack in {:?}",
            name,
            start.elapsed()
        );
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn handle_connect(&self, session: &SessionInfo) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.on_connect(session).await?;
        }
        Ok(())
    }

    pub async fn handle_before_request(
        &self,
        session: &SessionInfo,
        request: &Request,
    ) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.before_request(session, request).await?;
        }
        Ok(())
    }

    pub async fn handle_after_request(
        &self,
        session: &SessionInfo,
        request: &Request,
    ) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.after_request(session, request).await?;
        }
        Ok(())
    }

    pub async fn handle_disconnect(&self, session: &SessionInfo) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.on_disconnect(session).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
