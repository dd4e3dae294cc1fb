use crate::middleware::SessionInfo;
use crate::protocol::handler::CommandHandler;
use anyhow::Result;
use tokio::io::{self, BufReader};
use tracing::info;

/// Serves one session on stdin and stdout, for nodes spawned by inetd or
/// reached through ssh.
pub async fn serve_stdio(handler: CommandHandler) -> Result<()> {
    info!("Serving a single session on the standard streams");
    let session = SessionInfo::new("stdio", "stdio");
    handler
        .handle_session(BufReader::new(io::stdin()), io::stdout(), &session)
        .await
}
