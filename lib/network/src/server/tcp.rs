use crate::middleware::SessionInfo;
use crate::protocol::handler::CommandHandler;
use anyhow::{Context, Result};
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

/// Unique identifier for each connection
pub type ConnectionId = String;

/// A reference-counted [`Semaphore`] handle that can be shared across threads.
pub type SemaphoreRef = Arc<Semaphore>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot listen on {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

/// `NodeServer` accepts poller connections on TCP and serves each one in its
/// own task, with at most `max_connections` sessions at a time.
#[derive(Debug, TypedBuilder)]
pub struct NodeServer {
    server_address: SocketAddr,
    handler: CommandHandler,
    /// Peer address of every live session.
    #[builder(default = Arc::new(DashMap::new()))]
    connections: Arc<DashMap<ConnectionId, SocketAddr>>,
    conn_pool: SemaphoreRef,
}

impl NodeServer {
    pub fn new(server_address: SocketAddr, handler: CommandHandler, max_connections: usize) -> Self {
        NodeServer::builder()
            .server_address(server_address)
            .handler(handler)
            .conn_pool(Arc::new(Semaphore::new(max_connections.max(1))))
            .build()
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.server_address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.server_address,
                source,
            })
            .context("node server failed to start")
    }

    /// Accepts connections until the listener fails.
    pub async fn accept_connections(&self, listener: TcpListener) -> Result<()> {
        loop {
            // Wait for a free slot before accepting, so excess pollers queue
            // in the kernel backlog.
            let permit = self.conn_pool.clone().acquire_owned().await?;
            let (socket, addr) = listener.accept().await?;

            let conn_id = generate_connection_id(&addr);
            self.connections.insert(conn_id.clone(), addr);
            debug!("Currently active connections: {}", self.connections.len());

            let connections = self.connections.clone();
            let conn_pool = self.conn_pool.clone();
            let handler = self.handler.clone();

            tokio::spawn(async move {
                if let Err(e) = serve_connection(handler, socket, &conn_id, addr).await {
                    error!("Error handling connection from {}: {:#}", addr, e);
                }

                connections.remove(&conn_id);
                drop(permit);
                debug!(
                    "Connection pool permits available: {}",
                    conn_pool.available_permits()
                );
            });
        }
    }

    /// Serves until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        info!("Node listening on {}", listener.local_addr()?);

        tokio::select! {
            result = self.accept_connections(listener) => {
                if let Err(e) = &result {
                    error!("Error accepting connections: {}", e);
                }
                result
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, terminating node...");
                if !self.connections.is_empty() {
                    warn!("Dropping {} open sessions", self.connections.len());
                }
                Ok(())
            }
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }
}

async fn serve_connection(
    handler: CommandHandler,
    socket: TcpStream,
    conn_id: &str,
    addr: SocketAddr,
) -> Result<()> {
    let (reader, writer) = socket.into_split();
    let session = SessionInfo::new(conn_id, addr.to_string());
    handler
        .handle_session(BufReader::new(reader), writer, &session)
        .await
}

pub fn generate_connection_id(addr: &SocketAddr) -> ConnectionId {
    // Generate a unique connection ID based on the client's address
    let mut hasher = FxHasher::default();
    format!("{}:{}", addr.ip(), addr.port()).hash(&mut hasher);
    hasher.finish().to_string()
}
