//! Dispatch of a 1-second plugin invocation: `config`, `acquire` or `fetch`.

use crate::clock::SystemClock;
use crate::collector::CounterSource;
use crate::sampler::Sampler;
use crate::schema::render;
use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{PluginAction, PluginCli};
use common::util::daemon::{detach, Fork};
use common::util::trace::initialize_tracing;
use common::PluginConfig;
use std::io::{self, Write};
use std::process::ExitCode;
use storage::{PidMarker, Spool};
use tracing::{debug, info, instrument, warn};

/// Entry point shared by the plugin binaries.
pub fn main<S>(name: &str, source: S) -> ExitCode
where
    S: CounterSource + 'static,
{
    let cli = PluginCli::parse();
    if let Err(err) = initialize_tracing("warn") {
        eprintln!("{name}: {err:#}");
    }

    let result = PluginConfig::from_env(name)
        .context("invalid plugin environment")
        .and_then(|config| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            run(source, &config, cli.action(), &mut out)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{name}: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[instrument(skip(source, config, out), fields(plugin = %config.name()))]
pub fn run<S, W>(source: S, config: &PluginConfig, action: PluginAction, out: &mut W) -> Result<()>
where
    S: CounterSource + 'static,
    W: Write,
{
    debug!(%action, "Dispatching");
    match action {
        PluginAction::Config => emit_config(&source, out),
        PluginAction::Fetch => fetch(config, out),
        PluginAction::Acquire => acquire(source, config),
    }
}

/// Prints the graph schema for the series the source currently reports.
pub fn emit_config<S, W>(source: &S, out: &mut W) -> Result<()>
where
    S: CounterSource + ?Sized,
    W: Write,
{
    let groups = source.snapshot()?;
    out.write_all(render(&source.graphs(&groups)).as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Drains the spool and copies it verbatim to `out`.
pub fn fetch<W>(config: &PluginConfig, out: &mut W) -> Result<()>
where
    W: Write,
{
    let spool = Spool::new(config.spool_path()).with_lock_timeout(config.lock_timeout());
    let content = spool.drain()?;
    out.write_all(&content)?;
    out.flush()?;
    Ok(())
}

/// Starts the sampler, in the background unless `no_fork` is set.
///
/// Returns in the original process once the sampler is detached. The detached
/// sampler returns when it receives SIGINT or SIGTERM, or when a tick fails.
pub fn acquire<S>(source: S, config: &PluginConfig) -> Result<()>
where
    S: CounterSource + 'static,
{
    // Fail in the foreground if the source cannot be read at all.
    source.snapshot()?;

    let marker = PidMarker::new(config.pid_path());
    if config.single_instance() {
        if let Some(pid) = marker.running()? {
            if pid != std::process::id() {
                bail!(
                    "sampler already running with pid {} (see {})",
                    pid,
                    marker.path().display()
                );
            }
        }
    }

    let writer = Spool::new(config.spool_path())
        .writer()
        .context("cannot open spool for appending")?;

    if !config.no_fork() {
        if let Fork::Parent(child) = detach()? {
            info!(child, "Sampler detached");
            return Ok(());
        }
    }

    let pid = std::process::id();
    marker.write(pid)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot build sampler runtime")?;

    let sampler = Sampler::builder()
        .source(source)
        .clock(SystemClock)
        .writer(writer)
        .build();
    let result = runtime.block_on(sampler.run_until(shutdown_signal()));

    if result.is_ok() && marker.read()? == Some(pid) {
        marker.remove()?;
    }
    result.context("sampler stopped")
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::cpu::CpuSource;
    use crate::collector::net::NetSource;
    use pretty_assertions_sorted::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const STAT: &str = "cpu 3 3 3 3 3 3 3\ncpu0 1 1 1 1 1 1 1\ncpu1 2 2 2 2 2 2 2\nintr 0\n";

    fn config_in(dir: &Path) -> PluginConfig {
        PluginConfig::builder()
            .name("multicpu1sec")
            .plugstate(dir)
            .no_fork(true)
            .build()
    }

    fn cpu_source(dir: &Path) -> CpuSource {
        let path = dir.join("stat");
        fs::write(&path, STAT).unwrap();
        CpuSource::new(path)
    }

    #[test]
    fn config_lists_every_core() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = cpu_source(temp_dir.path());

        let mut out = Vec::new();
        run(source, &config_in(temp_dir.path()), PluginAction::Config, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("graph_title multicpu1sec\n"));
        assert!(text.contains("cpu0.label CPU 0\n"));
        assert!(text.contains("cpu1.label CPU 1\n"));
        assert!(!text.contains("cpu2"));
    }

    #[test]
    fn config_without_interfaces_prints_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("dev");
        fs::write(&path, "header\nheader\n").unwrap();

        let mut out = Vec::new();
        emit_config(&NetSource::new(path), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn config_fails_on_unreadable_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = CpuSource::new(temp_dir.path().join("missing"));

        let mut out = Vec::new();
        assert!(emit_config(&source, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn fetch_before_acquire_prints_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());

        let mut out = Vec::new();
        fetch(&config, &mut out).unwrap();
        assert!(out.is_empty());
        assert!(!config.spool_path().exists());
    }

    #[test]
    fn fetch_drains_spool_verbatim() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        Spool::new(config.spool_path())
            .append(b"cpu0.value 1000:100\ncpu1.value 1000:140\n")
            .unwrap();

        let mut out = Vec::new();
        run(
            cpu_source(temp_dir.path()),
            &config,
            PluginAction::Fetch,
            &mut out,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "cpu0.value 1000:100\ncpu1.value 1000:140\n"
        );

        let mut out = Vec::new();
        fetch(&config, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn acquire_fails_fast_on_unreadable_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());

        let result = acquire(CpuSource::new(temp_dir.path().join("missing")), &config);
        assert!(result.is_err());
        assert!(!config.spool_path().exists());
        assert!(!config.pid_path().exists());
    }

    #[test]
    fn acquire_refuses_second_instance() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());

        let mut other = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        PidMarker::new(config.pid_path()).write(other.id()).unwrap();

        let result = acquire(cpu_source(temp_dir.path()), &config);
        other.kill().unwrap();
        other.wait().unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("already running"), "{err:#}");
        assert!(!config.spool_path().exists());
    }
}
