use clap::Parser;
use core::fmt;
use getset::{CopyGetters, Getters};
use std::path::PathBuf;

/// What a 1-second plugin was asked to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PluginAction {
    /// Print the graph schema.
    Config,
    /// Start the background sampler.
    Acquire,
    /// Drain the spool to stdout.
    Fetch,
}

impl PluginAction {
    /// Anything other than `config` or `acquire`, including no argument at
    /// all, is a fetch.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("config") => PluginAction::Config,
            Some("acquire") => PluginAction::Acquire,
            _ => PluginAction::Fetch,
        }
    }
}

impl fmt::Display for PluginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginAction::Config => write!(f, "config"),
            PluginAction::Acquire => write!(f, "acquire"),
            PluginAction::Fetch => write!(f, "fetch"),
        }
    }
}

/// Command line of a 1-second plugin: `<plugin> [config|acquire|fetch]`.
///
/// The environment carries the rest (`MUNIN_PLUGSTATE`, `no_fork`).
#[derive(Debug, Parser, Getters)]
#[command(about = "1-second sampling plugin", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct PluginCli {
    /// `config`, `acquire` or `fetch` (default)
    #[arg(allow_hyphen_values = true)]
    #[getset(get = "pub")]
    command: Option<String>,
    /// Extra arguments are accepted and ignored.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    #[getset(get = "pub")]
    rest: Vec<String>,
}

impl PluginCli {
    pub fn action(&self) -> PluginAction {
        PluginAction::from_arg(self.command.as_deref())
    }
}

/// spoolnode: serves 1-second plugins over the munin node protocol
#[derive(Debug, Parser, Getters, CopyGetters)]
#[command(name = "spoolnode")]
#[command(about = "Minimal munin node serving spool-backed plugins", long_about = None)]
pub struct NodeCli {
    /// Optional TOML configuration file
    #[arg(short, long)]
    #[getset(get = "pub")]
    config: Option<PathBuf>,
    /// Directory containing the plugin executables
    #[arg(short = 'd', long)]
    #[getset(get = "pub")]
    plugin_dir: Option<String>,
    /// Host name reported to pollers (defaults to the system host name)
    #[arg(short = 'H', long)]
    #[getset(get = "pub")]
    host: Option<String>,
    /// Address to listen on
    #[arg(short, long)]
    #[getset(get = "pub")]
    address: Option<String>,
    /// TCP port to listen on
    #[arg(short, long)]
    #[getset(get_copy = "pub")]
    port: Option<u16>,
    /// Directory exported to plugins as MUNIN_PLUGSTATE
    #[arg(long)]
    #[getset(get = "pub")]
    plugstate_dir: Option<String>,
    /// Directory holding the spoolfetch helper; enables the `spool` capability
    #[arg(short, long)]
    #[getset(get = "pub")]
    spoolfetch_dir: Option<String>,
    /// Serve a single session on stdin/stdout instead of listening on TCP
    #[arg(long)]
    #[getset(get_copy = "pub")]
    stdio: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_actions_from_arguments() {
        assert_eq!(PluginAction::from_arg(Some("config")), PluginAction::Config);
        assert_eq!(PluginAction::from_arg(Some("acquire")), PluginAction::Acquire);
        assert_eq!(PluginAction::from_arg(Some("fetch")), PluginAction::Fetch);
        assert_eq!(PluginAction::from_arg(Some("autoconf")), PluginAction::Fetch);
        assert_eq!(PluginAction::from_arg(None), PluginAction::Fetch);
    }

    #[test]
    fn plugin_cli_parses_command() {
        let cli = PluginCli::parse_from(["multicpu1sec", "acquire"]);
        assert_eq!(cli.action(), PluginAction::Acquire);

        let cli = PluginCli::parse_from(["multicpu1sec"]);
        assert_eq!(cli.action(), PluginAction::Fetch);

        let cli = PluginCli::parse_from(["if1sec", "config", "extra"]);
        assert_eq!(cli.action(), PluginAction::Config);
    }

    #[test]
    fn plugin_cli_treats_flags_as_fetch() {
        for arg in ["--weird", "-x", "--help", "--version"] {
            let cli = PluginCli::try_parse_from(["multicpu1sec", arg])
                .unwrap_or_else(|e| panic!("`{arg}` rejected: {e}"));
            assert_eq!(cli.action(), PluginAction::Fetch, "argument `{arg}`");
        }

        let cli = PluginCli::try_parse_from(["multicpu1sec", "-x", "config"]).unwrap();
        assert_eq!(cli.command().as_deref(), Some("-x"));
        assert_eq!(cli.action(), PluginAction::Fetch);
    }

    #[test]
    fn node_cli_overrides() {
        let cli = NodeCli::parse_from([
            "spoolnode",
            "-d",
            "/etc/munin/plugins",
            "-H",
            "node1",
            "--port",
            "5000",
            "--stdio",
        ]);

        assert_eq!(cli.plugin_dir().as_deref(), Some("/etc/munin/plugins"));
        assert_eq!(cli.host().as_deref(), Some("node1"));
        assert_eq!(cli.port(), Some(5000));
        assert!(cli.stdio());
        assert!(cli.config().is_none());
    }
}
