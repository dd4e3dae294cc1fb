pub mod clock;
pub mod collector;
pub mod plugin;
pub mod sample;
pub mod sampler;
pub mod schema;

pub use collector::{CounterSource, SourceError};
pub use sample::{Reading, ReadingGroup, Sample, SampleBatch, SeriesId};
pub use sampler::{Sampler, SamplerError};
