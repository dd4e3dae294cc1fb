use core::fmt;
use getset::{CopyGetters, Getters};
use shrinkwraprs::Shrinkwrap;
use std::fmt::Write;
use typed_builder::TypedBuilder;

/// Name of one counter stream, e.g. `cpu0` or `down`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Shrinkwrap)]
pub struct SeriesId(pub String);

impl SeriesId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for SeriesId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One raw counter value read from a source.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Reading {
    #[getset(get = "pub")]
    series: SeriesId,
    #[getset(get_copy = "pub")]
    value: u64,
}

impl Reading {
    pub fn new(series: impl Into<SeriesId>, value: u64) -> Self {
        Self {
            series: series.into(),
            value,
        }
    }
}

/// A run of readings that belong to the same graph.
///
/// `graph` is `None` for a plugin's single, implicit graph and names the
/// multigraph otherwise (`if_eth0_1sec`).
#[derive(Debug, Clone, PartialEq, Eq, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct ReadingGroup {
    #[builder(default, setter(strip_option, into))]
    graph: Option<String>,
    #[builder(default)]
    readings: Vec<Reading>,
}

impl ReadingGroup {
    pub fn series(&self) -> impl Iterator<Item = &SeriesId> {
        self.readings.iter().map(Reading::series)
    }
}

/// A reading stamped with the tick it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Sample {
    #[getset(get = "pub")]
    series: SeriesId,
    #[getset(get_copy = "pub")]
    timestamp: u64,
    #[getset(get_copy = "pub")]
    value: u64,
}

impl fmt::Display for Sample {
    /// `<series>.value <timestamp>:<value>`, without the line terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.value {}:{}", self.series, self.timestamp, self.value)
    }
}

/// Everything one tick produced, sharing a single timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct SampleBatch {
    #[getset(get_copy = "pub")]
    timestamp: u64,
    #[getset(get = "pub")]
    groups: Vec<ReadingGroup>,
}

impl SampleBatch {
    pub fn new(timestamp: u64, groups: Vec<ReadingGroup>) -> Self {
        Self { timestamp, groups }
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.groups.iter().flat_map(move |group| {
            group.readings.iter().map(move |reading| Sample {
                series: reading.series.clone(),
                timestamp: self.timestamp,
                value: reading.value,
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.readings.is_empty())
    }

    /// Spool encoding: one line per sample, each named graph introduced by a
    /// `multigraph <graph>` line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for group in &self.groups {
            if group.readings.is_empty() {
                continue;
            }
            if let Some(graph) = &group.graph {
                let _ = writeln!(out, "multigraph {}", graph);
            }
            for reading in &group.readings {
                let _ = writeln!(
                    out,
                    "{}.value {}:{}",
                    reading.series, self.timestamp, reading.value
                );
            }
        }
        out
    }
}
