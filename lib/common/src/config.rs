//! Configuration for the 1-second plugins and the node agent.
//!
//! Plugins are configured purely through their environment (the node agent
//! exports `MUNIN_PLUGSTATE` and friends before spawning them). The node agent
//! layers defaults, an optional TOML file, `MUNIN_NODE__*` variables and
//! finally command line flags.

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use getset::{CopyGetters, Getters, Setters};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use typed_builder::TypedBuilder;

/// Environment variable naming the directory that holds plugin state
/// (spool and pid files).
pub const PLUGSTATE_ENV: &str = "MUNIN_PLUGSTATE";

/// Plugin state directory used when `MUNIN_PLUGSTATE` is unset.
pub const DEFAULT_PLUGSTATE: &str = ".";

/// File-name suffix of the PID marker (`<plugin>.pid`).
pub const PID_SUFFIX: &str = "pid";

/// File-name suffix of the spool (`<plugin>.value`).
pub const SPOOL_SUFFIX: &str = "value";

/// Default TCP port of the node agent.
pub const NODE_PORT: u16 = 4949;

/// Environment keys a plugin understands. Keys are matched case-insensitively.
const PLUGIN_ENV_KEYS: [&str; 4] = [
    "munin_plugstate",
    "no_fork",
    "spool_lock_timeout_ms",
    "allow_multiple",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] config::ConfigError),

    #[error("Invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

/// Raw view of the plugin environment before interpretation.
#[derive(Debug, Deserialize)]
struct PluginEnv {
    munin_plugstate: String,
    no_fork: Option<String>,
    spool_lock_timeout_ms: Option<String>,
    allow_multiple: Option<String>,
}

/// Per-process configuration of a 1-second plugin.
///
/// Built once at start-up and handed by reference to the sampler and the
/// drain operation.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, TypedBuilder)]
pub struct PluginConfig {
    /// Name used for the spool and pid file names.
    #[builder(setter(into))]
    #[getset(get = "pub")]
    name: String,
    /// Directory holding `<name>.pid` and `<name>.value`.
    #[builder(setter(into), default = PathBuf::from(DEFAULT_PLUGSTATE))]
    #[getset(get = "pub")]
    plugstate: PathBuf,
    /// Stay in the foreground on `acquire`.
    #[builder(default = false)]
    #[getset(get_copy = "pub")]
    no_fork: bool,
    /// Upper bound on how long `fetch` waits for the spool lock. `None` blocks.
    #[builder(default)]
    #[getset(get_copy = "pub")]
    lock_timeout: Option<Duration>,
    /// Refuse to `acquire` while the pid marker names a live process.
    #[builder(default = true)]
    #[getset(get_copy = "pub")]
    single_instance: bool,
}

impl PluginConfig {
    /// Reads the plugin configuration from the process environment.
    pub fn from_env(name: &str) -> Result<Self, ConfigError> {
        let vars = env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        });
        Self::from_vars(name, vars)
    }

    /// Builds the configuration from an explicit set of variables. Unknown
    /// keys are ignored.
    pub fn from_vars<I>(name: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut builder = Config::builder().set_default("munin_plugstate", DEFAULT_PLUGSTATE)?;
        for (key, value) in vars {
            let key = key.to_lowercase();
            if PLUGIN_ENV_KEYS.contains(&key.as_str()) {
                builder = builder.set_override(key, value)?;
            }
        }

        let raw: PluginEnv = builder.build()?.try_deserialize()?;

        let lock_timeout = match raw.spool_lock_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "spool_lock_timeout_ms".to_string(),
                    value: ms.clone(),
                }
            })?)),
            None => None,
        };

        let plugstate = if raw.munin_plugstate.is_empty() {
            PathBuf::from(DEFAULT_PLUGSTATE)
        } else {
            PathBuf::from(raw.munin_plugstate)
        };

        Ok(PluginConfig::builder()
            .name(name)
            .plugstate(plugstate)
            .no_fork(is_enabled(raw.no_fork.as_deref()))
            .lock_timeout(lock_timeout)
            .single_instance(!is_enabled(raw.allow_multiple.as_deref()))
            .build())
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_file(PID_SUFFIX)
    }

    pub fn spool_path(&self) -> PathBuf {
        self.state_file(SPOOL_SUFFIX)
    }

    fn state_file(&self, suffix: &str) -> PathBuf {
        self.plugstate.join(format!("{}.{}", self.name, suffix))
    }
}

/// Toggles follow the plugin convention: only the literal `1` switches on.
fn is_enabled(value: Option<&str>) -> bool {
    value.map(str::trim) == Some("1")
}

/// Configuration of the node agent.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, Setters, TypedBuilder,
)]
#[getset(get = "pub", set = "pub")]
pub struct NodeConfig {
    /// Host name announced to pollers. Empty means "ask the OS".
    #[builder(default, setter(into))]
    pub host: String,
    #[builder(default = "0.0.0.0".to_string(), setter(into))]
    pub address: String,
    #[builder(default = NODE_PORT)]
    pub port: u16,
    #[builder(default = "plugins".to_string(), setter(into))]
    pub plugin_dir: String,
    #[builder(default = DEFAULT_PLUGSTATE.to_string(), setter(into))]
    pub plugstate_dir: String,
    #[builder(default)]
    pub spoolfetch_dir: Option<String>,
    #[builder(default = 16)]
    pub max_connections: usize,
    #[builder(default = 10)]
    pub session_timeout_secs: u64,
    #[builder(default = 10)]
    pub plugin_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig::builder().build()
    }
}

impl NodeConfig {
    /// Loads configuration from an optional TOML file and `MUNIN_NODE__*`
    /// environment variables, on top of the built-in defaults.
    pub fn load_from_file_and_env(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default()
            .set_default("host", "")?
            .set_default("address", "0.0.0.0")?
            .set_default("port", NODE_PORT as i64)?
            .set_default("plugin_dir", "plugins")?
            .set_default("plugstate_dir", DEFAULT_PLUGSTATE)?
            .set_default("max_connections", 16_i64)?
            .set_default("session_timeout_secs", 10_i64)?
            .set_default("plugin_timeout_secs", 10_i64)?;

        if let Some(path) = file_path {
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
        }

        let config = builder
            .add_source(Environment::with_prefix("MUNIN_NODE").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<NodeConfig>()?)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }
}

#[cfg(test)]
mod plugin_config_tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_current_directory() {
        let config = PluginConfig::from_vars("multicpu1sec", vars(&[])).unwrap();

        assert_eq!(config.plugstate(), Path::new("."));
        assert_eq!(config.spool_path(), Path::new("./multicpu1sec.value"));
        assert_eq!(config.pid_path(), Path::new("./multicpu1sec.pid"));
        assert!(!config.no_fork());
        assert!(config.single_instance());
        assert_eq!(config.lock_timeout(), None);
    }

    #[test]
    fn reads_plugstate_and_toggles() {
        let config = PluginConfig::from_vars(
            "if1sec",
            vars(&[
                ("MUNIN_PLUGSTATE", "/var/lib/munin-node/plugin-state"),
                ("no_fork", "1"),
                ("spool_lock_timeout_ms", "250"),
                ("allow_multiple", "1"),
                ("HOME", "/root"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.spool_path(),
            Path::new("/var/lib/munin-node/plugin-state/if1sec.value")
        );
        assert!(config.no_fork());
        assert!(!config.single_instance());
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn only_literal_one_disables_fork() {
        let config =
            PluginConfig::from_vars("multicpu1sec", vars(&[("no_fork", "yes")])).unwrap();
        assert!(!config.no_fork());
    }

    #[test]
    fn rejects_bad_timeout() {
        let result = PluginConfig::from_vars(
            "multicpu1sec",
            vars(&[("spool_lock_timeout_ms", "soon")]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
