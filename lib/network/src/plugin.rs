//! Locating and running plugin executables.

use common::PLUGSTATE_ENV;
use getset::{CopyGetters, Getters};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use typed_builder::TypedBuilder;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("cannot run {}: {source}", path.display())]
    Spawn { path: PathBuf, source: io::Error },

    #[error("{} did not finish within {timeout:?}", path.display())]
    TimedOut { path: PathBuf, timeout: Duration },

    #[error("cannot list plugin directory {}: {source}", path.display())]
    List { path: PathBuf, source: io::Error },
}

/// What a plugin printed and whether it exited successfully.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct PluginOutput {
    #[getset(get = "pub")]
    stdout: Vec<u8>,
    #[getset(get_copy = "pub")]
    success: bool,
}

/// Runs executables from the plugin directory with a time limit.
#[derive(Debug, Clone, Getters, CopyGetters, TypedBuilder)]
pub struct PluginRunner {
    #[builder(setter(into))]
    #[getset(get = "pub")]
    plugin_dir: PathBuf,
    /// Exported to every child as `MUNIN_PLUGSTATE`.
    #[builder(setter(into))]
    #[getset(get = "pub")]
    plugstate_dir: PathBuf,
    #[builder(default = Duration::from_secs(10))]
    #[getset(get_copy = "pub")]
    timeout: Duration,
}

impl PluginRunner {
    /// Names of the runnable plugins, sorted. Hidden entries and files without
    /// an execute bit are left out.
    pub async fn list(&self) -> Result<Vec<String>, PluginError> {
        let list_error = |source| PluginError::List {
            path: self.plugin_dir.clone(),
            source,
        };

        let mut entries = fs::read_dir(&self.plugin_dir).await.map_err(list_error)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_valid_name(&name) && is_executable(&entry.path()).await {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Maps a plugin name from the wire to its executable.
    pub async fn resolve(&self, name: &str) -> Result<PathBuf, PluginError> {
        if !is_valid_name(name) {
            warn!(name, "Rejected plugin name");
            return Err(PluginError::UnknownService(name.to_string()));
        }

        let path = self.plugin_dir.join(name);
        if !is_executable(&path).await {
            return Err(PluginError::UnknownService(name.to_string()));
        }
        Ok(path)
    }

    /// Runs plugin `name`, passing `arg` when given.
    pub async fn run_plugin(
        &self,
        name: &str,
        arg: Option<&str>,
    ) -> Result<PluginOutput, PluginError> {
        let path = self.resolve(name).await?;
        self.run(&path, arg).await
    }

    /// Runs `program` with stdin closed and stdout captured. The child is
    /// killed when it outlives the timeout.
    #[instrument(skip(self), fields(program = %program.display()))]
    pub async fn run(&self, program: &Path, arg: Option<&str>) -> Result<PluginOutput, PluginError> {
        let mut command = Command::new(program);
        command
            .args(arg)
            .env(PLUGSTATE_ENV, &self.plugstate_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| PluginError::Spawn {
            path: program.to_path_buf(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| PluginError::Spawn {
                path: program.to_path_buf(),
                source,
            })?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Plugin timed out");
                return Err(PluginError::TimedOut {
                    path: program.to_path_buf(),
                    timeout: self.timeout,
                });
            }
        };

        debug!(status = %output.status, bytes = output.stdout.len(), "Plugin finished");
        Ok(PluginOutput {
            stdout: output.stdout,
            success: output.status.success(),
        })
    }
}

/// Plugin names are single path components made of ASCII alphanumerics, `_`,
/// `-` and `.`, not starting with a dot.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

async fn is_executable(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
