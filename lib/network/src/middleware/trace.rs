use super::{Middleware, SessionInfo};
use crate::protocol::message::Request;
use async_trait::async_trait;
use common::util::time::{elapsed_duration_since, format_duration, now_as_u64};
use dashmap::DashMap;
use tracing::{debug, info};

/// Middleware for logging the session lifecycle and request durations.
///
/// Sessions run concurrently, so request start times are kept per session
/// id rather than in a single slot.
#[derive(Debug, Default)]
pub struct LoggingMiddleware {
    // Timestamp of when the current request of each session started.
    request_start_times: DashMap<String, u64>,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    #[inline]
    fn name(&self) -> String {
        "LoggingMiddleware".to_string()
    }

    #[inline]
    async fn on_connect(&self, session: &SessionInfo) -> anyhow::Result<()> {
        info!("Session {} established with {}", session.id(), session.peer());
        Ok(())
    }

    #[inline]
    async fn before_request(&self, session: &SessionInfo, request: &Request) -> anyhow::Result<()> {
        self.request_start_times
            .insert(session.id().clone(), now_as_u64());
        debug!("Handling `{}` from {}", request, session.peer());
        Ok(())
    }

    #[inline]
    async fn after_request(&self, session: &SessionInfo, request: &Request) -> anyhow::Result<()> {
        if let Some((_, start)) = self.request_start_times.remove(session.id()) {
            debug!(
                "Answered `{}` for {} (took {})",
                request,
                session.peer(),
                format_duration(elapsed_duration_since(start))
            );
        }
        Ok(())
    }

    #[inline]
    async fn on_disconnect(&self, session: &SessionInfo) -> anyhow::Result<()> {
        self.request_start_times.remove(session.id());
        info!(
            "Session {} with {} closed (lifespan: {})",
            session.id(),
            session.peer(),
            format_duration(session.started().elapsed())
        );
        Ok(())
    }
}
