use crate::clock::Clock;
use crate::collector::{CounterSource, SourceError};
use crate::sample::SampleBatch;
use common::util::time::until_next_second;
use core::fmt;
use std::future::Future;
use std::time::Duration;
use storage::{SpoolError, SpoolWriter};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace};
use typed_builder::TypedBuilder;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Spool(#[from] SpoolError),
}

/// Samples a counter source once per wall-clock second into a spool.
#[derive(TypedBuilder)]
pub struct Sampler<S, C> {
    source: S,
    clock: C,
    writer: SpoolWriter,
}

impl<S, C> fmt::Debug for Sampler<S, C>
where
    S: CounterSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("source", &self.source.name())
            .field("spool", &self.writer.path())
            .finish()
    }
}

impl<S, C> Sampler<S, C>
where
    S: CounterSource,
    C: Clock,
{
    /// Waits for the next second boundary, then snapshots the source and
    /// appends the batch stamped with that second.
    ///
    /// The delay is recomputed from the clock on every call, so time spent in
    /// the snapshot or waiting for the lock never accumulates.
    pub async fn tick(&self) -> Result<SampleBatch, SamplerError> {
        let (delay, timestamp) = until_next_second(self.clock.now());
        if delay > Duration::ZERO {
            self.clock.sleep(delay).await;
        }

        let batch = SampleBatch::new(timestamp, self.source.snapshot()?);
        self.writer.append(batch.encode().as_bytes())?;

        trace!(timestamp, empty = batch.is_empty(), "Tick");
        Ok(batch)
    }

    /// Ticks until a tick fails.
    pub async fn run(&self) -> Result<(), SamplerError> {
        loop {
            self.tick().await?;
        }
    }

    /// Ticks until `shutdown` resolves. Shutdown is only observed while
    /// waiting for a boundary: a tick never suspends between its snapshot and
    /// its append.
    #[instrument(skip_all, fields(source = %self.source.name()))]
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), SamplerError>
    where
        F: Future<Output = ()>,
    {
        info!(spool = %self.writer.path().display(), "Sampler started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, sampler stopping");
                    return Ok(());
                }
                result = self.tick() => match result {
                    Ok(batch) => debug!(timestamp = batch.timestamp(), "Sample appended"),
                    Err(e) => {
                        error!("Sampler stopped: {}", e);
                        return Err(e);
                    }
                },
            }
        }
    }
}
