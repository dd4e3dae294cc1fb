use super::{read_table, CounterSource, SourceError};
use crate::sample::{Reading, ReadingGroup};
use crate::schema::{FieldConfig, GraphConfig, ONE_SECOND_DATA_SIZE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::trace;

pub const PROC_NET_DEV: &str = "/proc/net/dev";

const HEADER_LINES: usize = 2;
const FIELDS: usize = 16;
const RX_BYTES: usize = 0;
const TX_BYTES: usize = 8;

/// Per-interface byte counters from `/proc/net/dev`, one multigraph per
/// interface.
#[derive(Debug, Clone)]
pub struct NetSource {
    path: PathBuf,
}

impl Default for NetSource {
    fn default() -> Self {
        Self::new(PROC_NET_DEV)
    }
}

impl NetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CounterSource for NetSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn snapshot(&self) -> Result<Vec<ReadingGroup>, SourceError> {
        let table = read_table(&self.path)?;
        Ok(parse_net_dev(&table))
    }

    fn graphs(&self, groups: &[ReadingGroup]) -> Vec<GraphConfig> {
        groups
            .iter()
            .filter_map(|group| {
                let graph_id = group.graph().as_deref()?;
                let interface = interface_of(graph_id);
                Some(interface_graph(graph_id, interface))
            })
            .collect()
    }
}

/// Graph id for an interface. Characters other than ASCII alphanumerics and
/// `_` are replaced so the id stays a valid field name.
pub fn graph_id(interface: &str) -> String {
    format!("if_{}_1sec", sanitize(interface))
}

fn sanitize(interface: &str) -> String {
    interface
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Like [`graph_id`], but numbers an interface whose sanitized name is already
/// taken (`br-lan` after `br_lan` becomes `if_br_lan_2_1sec`).
fn unique_graph_id(interface: &str, taken: &mut HashSet<String>) -> String {
    let clean = sanitize(interface);
    let mut id = format!("if_{clean}_1sec");
    let mut n = 2;
    while !taken.insert(id.clone()) {
        id = format!("if_{clean}_{n}_1sec");
        n += 1;
    }
    id
}

fn interface_of(graph_id: &str) -> &str {
    graph_id
        .strip_prefix("if_")
        .and_then(|rest| rest.strip_suffix("_1sec"))
        .unwrap_or(graph_id)
}

fn interface_graph(graph_id: &str, interface: &str) -> GraphConfig {
    GraphConfig::named(graph_id)
        .attribute("graph_order", "down up")
        .attribute("graph_title", format!("{interface} traffic"))
        .attribute("graph_category", "1sec")
        .attribute("graph_vlabel", "bits in (-) / out (+) per ${graph_period}")
        .attribute("update_rate", "1")
        .attribute("graph_data_size", ONE_SECOND_DATA_SIZE)
        .field(
            FieldConfig::builder()
                .series("down")
                .label("-")
                .graph(false)
                .cdef("down,8,*")
                .min(0)
                .build(),
        )
        .field(
            FieldConfig::builder()
                .series("up")
                .label("bps")
                .negative("down")
                .cdef("up,8,*")
                .min(0)
                .build(),
        )
}

/// Parses a `/proc/net/dev` table into one group per interface, in kernel
/// order. Graph ids are unique within the table.
pub fn parse_net_dev(table: &str) -> Vec<ReadingGroup> {
    let mut taken = HashSet::new();
    table
        .lines()
        .skip(HEADER_LINES)
        .filter_map(parse_interface_line)
        .map(|(name, down, up)| {
            ReadingGroup::builder()
                .graph(unique_graph_id(name, &mut taken))
                .readings(vec![Reading::new("down", down), Reading::new("up", up)])
                .build()
        })
        .collect()
}

/// Interface name with its received and sent byte counters.
fn parse_interface_line(line: &str) -> Option<(&str, u64, u64)> {
    let Some((name, counters)) = line.split_once(':') else {
        trace!(line, "Skipping record without interface name");
        return None;
    };
    let name = name.trim();

    let fields = counters
        .split_whitespace()
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>();
    let fields = match fields {
        Ok(fields) if !name.is_empty() && fields.len() == FIELDS => fields,
        _ => {
            trace!(line, "Skipping malformed interface record");
            return None;
        }
    };

    Some((name, fields[RX_BYTES], fields[TX_BYTES]))
}
