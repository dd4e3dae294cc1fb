pub mod stdio;
pub mod tcp;

use crate::middleware::trace::LoggingMiddleware;
use crate::middleware::MiddlewareStack;
use crate::node::NodeState;
use crate::plugin::PluginRunner;
use crate::protocol::handler::CommandHandler;
use anyhow::{Context, Result};
use cli::NodeCli;
use common::NodeConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use sysinfo::System;
use tracing::{info, warn};

pub use stdio::serve_stdio;
pub use tcp::{NodeServer, ServerError};

/// Runs the node with the configuration file and environment merged under
/// the command line flags.
pub async fn start_node(cli: &NodeCli) -> Result<()> {
    let config = NodeConfig::load_from_file_and_env(cli.config().as_deref())
        .context("cannot load node configuration")?;
    let config = apply_cli(config, cli);
    let host = resolve_host(&config);
    info!(host = %host, plugin_dir = %config.plugin_dir, "Starting node");

    let handler = CommandHandler::new(Arc::new(build_state(&config, host)));

    if cli.stdio() {
        return serve_stdio(handler).await;
    }

    let address: IpAddr = config
        .address
        .parse()
        .with_context(|| format!("invalid listen address `{}`", config.address))?;
    NodeServer::new(
        SocketAddr::new(address, config.port),
        handler,
        config.max_connections,
    )
    .run()
    .await
}

/// Command line flags win over every other source.
pub fn apply_cli(mut config: NodeConfig, cli: &NodeCli) -> NodeConfig {
    if let Some(host) = cli.host() {
        config.host = host.clone();
    }
    if let Some(address) = cli.address() {
        config.address = address.clone();
    }
    if let Some(port) = cli.port() {
        config.port = port;
    }
    if let Some(plugin_dir) = cli.plugin_dir() {
        config.plugin_dir = plugin_dir.clone();
    }
    if let Some(plugstate_dir) = cli.plugstate_dir() {
        config.plugstate_dir = plugstate_dir.clone();
    }
    if let Some(spoolfetch_dir) = cli.spoolfetch_dir() {
        config.spoolfetch_dir = Some(spoolfetch_dir.clone());
    }
    config
}

/// The configured host name, or the one the OS reports.
pub fn resolve_host(config: &NodeConfig) -> String {
    if !config.host.is_empty() {
        return config.host.clone();
    }
    System::host_name().unwrap_or_else(|| {
        warn!("Cannot determine host name, announcing `localhost`");
        "localhost".to_string()
    })
}

pub fn build_state(config: &NodeConfig, host: String) -> NodeState {
    let mut middleware = MiddlewareStack::new();
    middleware.add_middleware(LoggingMiddleware::new());

    let runner = PluginRunner::builder()
        .plugin_dir(&config.plugin_dir)
        .plugstate_dir(&config.plugstate_dir)
        .timeout(config.plugin_timeout())
        .build();

    NodeState::builder()
        .host(host)
        .runner(runner)
        .spoolfetch_dir(config.spoolfetch_dir.as_ref().map(PathBuf::from))
        .session_timeout(config.session_timeout())
        .middleware(Arc::new(middleware))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn cli_flags_override_configuration() {
        let config = NodeConfig::builder()
            .host("from-file")
            .port(5000)
            .plugin_dir("/etc/munin/plugins")
            .build();
        let cli = NodeCli::parse_from(["spoolnode", "-H", "from-cli", "-s", "/usr/share/munin"]);

        let config = apply_cli(config, &cli);
        assert_eq!(config.host, "from-cli");
        assert_eq!(config.port, 5000);
        assert_eq!(config.plugin_dir, "/etc/munin/plugins");
        assert_eq!(config.spoolfetch_dir.as_deref(), Some("/usr/share/munin"));
    }

    #[test]
    fn configured_host_wins_over_os() {
        let config = NodeConfig::builder().host("node1").build();
        assert_eq!(resolve_host(&config), "node1");
        assert!(!resolve_host(&NodeConfig::default()).is_empty());
    }

    #[test]
    fn state_follows_configuration() {
        let config = NodeConfig::builder()
            .plugin_dir("/srv/plugins")
            .spoolfetch_dir(Some("/srv/spool".to_string()))
            .session_timeout_secs(3)
            .plugin_timeout_secs(7)
            .build();

        let state = build_state(&config, "node1".to_string());
        assert_eq!(state.runner().plugin_dir(), Path::new("/srv/plugins"));
        assert_eq!(state.runner().timeout(), Duration::from_secs(7));
        assert_eq!(state.session_timeout(), Duration::from_secs(3));
        assert_eq!(
            state.spoolfetch_program().as_deref(),
            Some(Path::new("/srv/spool/spoolfetch_node1"))
        );
        assert_eq!(state.middleware().len(), 1);
    }
}
