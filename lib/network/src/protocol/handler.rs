use super::message::{Request, Response, BAD_EXIT, TIMED_OUT, UNKNOWN_COMMAND, UNKNOWN_SERVICE};
use super::Protocol;
use crate::middleware::SessionInfo;
use crate::node::NodeStateRef;
use crate::plugin::{PluginError, PluginOutput};
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, instrument, warn};

/// Version reported by the `version` command.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Answers the requests of one session at a time; cheap to clone per session.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    state: NodeStateRef,
}

impl CommandHandler {
    pub fn new(state: NodeStateRef) -> Self {
        Self { state }
    }

    /// Greets the poller, then answers requests until it quits, closes the
    /// stream or stays idle past the session timeout.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn handle_session<R, W>(
        &self,
        mut reader: R,
        mut writer: W,
        session: &SessionInfo,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let middleware = self.state.middleware();
        let greeting = Response::new().line(&format!("# munin node at {}", self.state.host()));
        Protocol::send_response(&mut writer, greeting).await?;
        middleware.handle_connect(session).await?;

        let result = self.serve_requests(&mut reader, &mut writer, session).await;

        if let Err(e) = middleware.handle_disconnect(session).await {
            warn!("Disconnect hook failed: {}", e);
        }
        result
    }

    async fn serve_requests<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        session: &SessionInfo,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let middleware = self.state.middleware();
        let timeout = self.state.session_timeout();

        loop {
            let request = match tokio::time::timeout(timeout, Protocol::read_request(reader)).await {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => {
                    debug!("Peer closed the session");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    info!("Session idle for {:?}, closing", timeout);
                    return Ok(());
                }
            };

            match request {
                Request::Empty => continue,
                Request::Quit => return Ok(()),
                _ => {}
            }

            middleware.handle_before_request(session, &request).await?;
            let response = self.respond(&request).await;
            Protocol::send_response(writer, response).await?;
            middleware.handle_after_request(session, &request).await?;
        }
    }

    /// The answer to one request.
    pub async fn respond(&self, request: &Request) -> Response {
        let host = self.state.host();
        match request {
            Request::Version => {
                Response::new().line(&format!("munin node on {host} version: {NODE_VERSION}"))
            }
            Request::Nodes => Response::new().line(host).end(),
            Request::List(node) => self.list(node.as_deref()).await,
            Request::Cap(_) => {
                let caps = if self.state.spoolfetch_dir().is_some() {
                    "cap multigraph spool"
                } else {
                    "cap multigraph"
                };
                Response::new().line(caps)
            }
            Request::Config(plugin) => {
                let result = self.state.runner().run_plugin(plugin, Some("config")).await;
                plugin_response(result)
            }
            Request::Fetch(plugin) => {
                let result = self.state.runner().run_plugin(plugin, None).await;
                plugin_response(result)
            }
            Request::Spoolfetch(arg) => match self.state.spoolfetch_program() {
                Some(program) => {
                    let result = self.state.runner().run(&program, Some(arg)).await;
                    plugin_response(result)
                }
                None => Response::new().line(UNKNOWN_COMMAND),
            },
            Request::Unknown(_) | Request::Empty | Request::Quit => {
                Response::new().line(UNKNOWN_COMMAND)
            }
        }
    }

    async fn list(&self, node: Option<&str>) -> Response {
        if node.is_some_and(|node| node != self.state.host()) {
            return Response::new().line("");
        }

        match self.state.runner().list().await {
            Ok(names) => Response::new().line(&names.join(" ")),
            Err(e) => {
                error!("Cannot list plugins: {}", e);
                Response::new().line("")
            }
        }
    }
}

fn plugin_response(result: Result<PluginOutput, PluginError>) -> Response {
    match result {
        Ok(output) if output.success() => Response::new().output(output.stdout()).end(),
        Ok(output) => Response::new().output(output.stdout()).line(BAD_EXIT).end(),
        Err(PluginError::UnknownService(name)) => {
            debug!("Unknown service `{}`", name);
            Response::new().line(UNKNOWN_SERVICE).end()
        }
        Err(PluginError::TimedOut { .. }) => Response::new().line(TIMED_OUT).end(),
        Err(e) => {
            error!("{}", e);
            Response::new().line(BAD_EXIT).end()
        }
    }
}

#[cfg(test)]
mod async_tests {
    use super::*;
    use crate::middleware::trace::LoggingMiddleware;
    use crate::middleware::MiddlewareStack;
    use crate::node::NodeState;
    use crate::plugin::test_plugins::{install, populate};
    use crate::plugin::PluginRunner;
    use pretty_assertions_sorted::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    struct Fixture {
        handler: CommandHandler,
        _plugins: TempDir,
        _spoolfetch: Option<TempDir>,
    }

    fn setup_handler(with_spoolfetch: bool, session_timeout: Duration) -> Fixture {
        let plugins = TempDir::new().expect("Failed to create temp dir");
        populate(plugins.path());

        let runner = PluginRunner::builder()
            .plugin_dir(plugins.path())
            .plugstate_dir(plugins.path())
            .timeout(Duration::from_millis(500))
            .build();

        let mut middleware = MiddlewareStack::new();
        middleware.add_middleware(LoggingMiddleware::new());

        let spoolfetch = with_spoolfetch.then(|| {
            let dir = TempDir::new().expect("Failed to create temp dir");
            install(
                dir.path(),
                "spoolfetch_node1",
                "#!/bin/sh\necho \"multigraph if_eth0_1sec\"\necho \"down.value $1:5\"\n",
            );
            dir
        });

        let state = NodeState::builder()
            .host("node1")
            .runner(runner)
            .spoolfetch_dir(spoolfetch.as_ref().map(|dir| dir.path().to_path_buf()))
            .session_timeout(session_timeout)
            .middleware(Arc::new(middleware))
            .build();

        Fixture {
            handler: CommandHandler::new(Arc::new(state)),
            _plugins: plugins,
            _spoolfetch: spoolfetch,
        }
    }

    /// Plays `input` against a fresh session and returns everything the node
    /// wrote.
    async fn converse(handler: &CommandHandler, input: &str) -> String {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let session = SessionInfo::new("test", "duplex");
        let handler = handler.clone();
        let task = tokio::spawn(async move {
            handler
                .handle_session(BufReader::new(server_read), server_write, &session)
                .await
        });

        client_write.write_all(input.as_bytes()).await.unwrap();
        client_write.shutdown().await.unwrap();
        let mut output = String::new();
        client_read.read_to_string(&mut output).await.unwrap();
        task.await.unwrap().unwrap();
        output
    }

    #[tokio::test]
    async fn answers_simple_commands() {
        let fixture = setup_handler(false, Duration::from_secs(5));

        let output = converse(&fixture.handler, "version\nnodes\nlist\ncap multigraph\nquit\n").await;
        assert_eq!(
            output,
            format!(
                "# munin node at node1\n\
                 munin node on node1 version: {NODE_VERSION}\n\
                 node1\n.\n\
                 broken load slow state\n\
                 cap multigraph\n"
            )
        );
    }

    #[tokio::test]
    async fn relays_plugin_output() {
        let fixture = setup_handler(false, Duration::from_secs(5));

        let output = converse(&fixture.handler, "config load\nfetch load\n.\n").await;
        assert_eq!(
            output,
            "# munin node at node1\n\
             graph_title Load\nload.label load\n.\n\
             load.value 42\n.\n"
        );
    }

    #[tokio::test]
    async fn reports_plugin_failures() {
        let fixture = setup_handler(false, Duration::from_secs(5));

        let output = converse(
            &fixture.handler,
            "fetch broken\nfetch ../load\nfetch\nfetch slow\nquit\n",
        )
        .await;
        assert_eq!(
            output,
            "# munin node at node1\n\
             broken.value 1\n# Bad exit\n.\n\
             # Unknown service\n.\n\
             # Unknown service\n.\n\
             # Timed out\n.\n"
        );
    }

    #[tokio::test]
    async fn unknown_commands_get_a_hint() {
        let fixture = setup_handler(false, Duration::from_secs(5));

        let output = converse(&fixture.handler, "help\n\nspoolfetch 1000\nlist other\n").await;
        assert_eq!(
            output,
            format!(
                "# munin node at node1\n\
                 {UNKNOWN_COMMAND}\n\
                 {UNKNOWN_COMMAND}\n\
                 \n"
            )
        );
    }

    #[tokio::test]
    async fn spool_capability_and_spoolfetch() {
        let fixture = setup_handler(true, Duration::from_secs(5));

        let output = converse(&fixture.handler, "cap multigraph spool\nspoolfetch 1700000000\n").await;
        assert_eq!(
            output,
            "# munin node at node1\n\
             cap multigraph spool\n\
             multigraph if_eth0_1sec\ndown.value 1700000000:5\n.\n"
        );
    }

    #[tokio::test]
    async fn idle_sessions_are_closed() {
        let fixture = setup_handler(false, Duration::from_millis(100));

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let session = SessionInfo::new("idle", "duplex");

        tokio::time::timeout(
            Duration::from_secs(5),
            fixture
                .handler
                .handle_session(BufReader::new(server_read), server_write, &session),
        )
        .await
        .expect("session should end on its own")
        .unwrap();
        drop(client);
    }
}
