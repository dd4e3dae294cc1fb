//! Graph schema printed by `plugin config`.

use crate::sample::SeriesId;
use core::fmt;
use getset::{CopyGetters, Getters};
use std::fmt::Write;
use typed_builder::TypedBuilder;

/// Retention requested for 1-second graphs.
pub const ONE_SECOND_DATA_SIZE: &str = "custom 1d, 10s for 1w, 1m for 1t, 5m for 1y";

/// How the poller turns successive counter values into rates. Every 1-second
/// series is a monotonic counter read as a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterType {
    Derive,
}

impl fmt::Display for CounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterType::Derive => write!(f, "DERIVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawStyle {
    AreaStack,
}

impl fmt::Display for DrawStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawStyle::AreaStack => write!(f, "AREASTACK"),
        }
    }
}

/// Description of one series inside a graph.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, TypedBuilder)]
pub struct FieldConfig {
    #[builder(setter(into))]
    #[getset(get = "pub")]
    series: SeriesId,
    #[builder(setter(into))]
    #[getset(get = "pub")]
    label: String,
    #[builder(default, setter(strip_option))]
    #[getset(get_copy = "pub")]
    draw: Option<DrawStyle>,
    #[builder(default = CounterType::Derive)]
    #[getset(get_copy = "pub")]
    kind: CounterType,
    /// `false` hides the series (it is still stored and can be referenced).
    #[builder(default = true)]
    #[getset(get_copy = "pub")]
    graph: bool,
    /// Series drawn on the negative axis opposite this one.
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub")]
    negative: Option<SeriesId>,
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub")]
    cdef: Option<String>,
    #[builder(default, setter(strip_option))]
    #[getset(get_copy = "pub")]
    min: Option<i64>,
}

impl fmt::Display for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let series = &self.series;
        writeln!(f, "{series}.label {}", self.label)?;
        if let Some(draw) = self.draw {
            writeln!(f, "{series}.draw {draw}")?;
        }
        writeln!(f, "{series}.type {}", self.kind)?;
        if !self.graph {
            writeln!(f, "{series}.graph no")?;
        }
        if let Some(negative) = &self.negative {
            writeln!(f, "{series}.negative {negative}")?;
        }
        if let Some(cdef) = &self.cdef {
            writeln!(f, "{series}.cdef {cdef}")?;
        }
        if let Some(min) = self.min {
            writeln!(f, "{series}.min {min}")?;
        }
        Ok(())
    }
}

/// One graph: optional multigraph name, graph-level attributes in order, then
/// its fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct GraphConfig {
    multigraph: Option<String>,
    attributes: Vec<(String, String)>,
    fields: Vec<FieldConfig>,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph introduced by a `multigraph <name>` header.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            multigraph: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    pub fn series(&self) -> impl Iterator<Item = &SeriesId> {
        self.fields.iter().map(FieldConfig::series)
    }
}

impl fmt::Display for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.multigraph {
            writeln!(f, "multigraph {name}")?;
        }
        for (key, value) in &self.attributes {
            writeln!(f, "{key} {value}")?;
        }
        for field in &self.fields {
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Renders graphs in order, as printed by `plugin config`.
pub fn render(graphs: &[GraphConfig]) -> String {
    let mut out = String::new();
    for graph in graphs {
        let _ = write!(out, "{graph}");
    }
    out
}
