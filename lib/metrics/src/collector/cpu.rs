use super::{read_table, CounterSource, SourceError};
use crate::sample::{Reading, ReadingGroup};
use crate::schema::{FieldConfig, GraphConfig, DrawStyle, ONE_SECOND_DATA_SIZE};
use std::path::{Path, PathBuf};
use tracing::trace;

pub const PROC_STAT: &str = "/proc/stat";

/// user, nice, system, idle, iowait, irq, softirq
const REQUIRED_FIELDS: usize = 7;
const IDLE_FIELD: usize = 3;

/// Per-core busy jiffies from `/proc/stat`.
#[derive(Debug, Clone)]
pub struct CpuSource {
    path: PathBuf,
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new(PROC_STAT)
    }
}

impl CpuSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CounterSource for CpuSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn snapshot(&self) -> Result<Vec<ReadingGroup>, SourceError> {
        let table = read_table(&self.path)?;
        Ok(vec![ReadingGroup::builder()
            .readings(parse_stat(&table))
            .build()])
    }

    fn graphs(&self, groups: &[ReadingGroup]) -> Vec<GraphConfig> {
        let mut graph = GraphConfig::new()
            .attribute("graph_title", "multicpu1sec")
            .attribute("graph_category", "1sec")
            .attribute("graph_vlabel", "average cpu use %")
            .attribute("graph_scale", "no")
            .attribute("graph_total", "All CPUs")
            .attribute("update_rate", "1")
            .attribute("graph_data_size", ONE_SECOND_DATA_SIZE);

        for series in groups.iter().flat_map(ReadingGroup::series) {
            let label = match series.strip_prefix("cpu") {
                Some(index) => format!("CPU {index}"),
                None => series.to_string(),
            };
            graph = graph.field(
                FieldConfig::builder()
                    .series(series.clone())
                    .label(label)
                    .draw(DrawStyle::AreaStack)
                    .min(0)
                    .build(),
            );
        }

        vec![graph]
    }
}

/// Parses the per-core lines of a `/proc/stat` table.
///
/// The first line is the aggregate over all cores and is skipped; parsing stops
/// at the first line that is not a `cpu` line.
pub fn parse_stat(table: &str) -> Vec<Reading> {
    table
        .lines()
        .skip(1)
        .take_while(|line| line.starts_with("cpu"))
        .filter_map(parse_cpu_line)
        .collect()
}

fn parse_cpu_line(line: &str) -> Option<Reading> {
    let mut tokens = line.split_whitespace();
    let id = tokens.next()?;

    let fields = tokens
        .take(REQUIRED_FIELDS)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>();
    let fields = match fields {
        Ok(fields) if fields.len() == REQUIRED_FIELDS => fields,
        _ => {
            trace!(line, "Skipping malformed cpu record");
            return None;
        }
    };

    let busy = fields
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != IDLE_FIELD)
        .fold(0u64, |acc, (_, value)| acc.wrapping_add(*value));

    Some(Reading::new(id, busy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::render;
    use pretty_assertions_sorted::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const STAT: &str = "\
cpu  200 0 40 9000 0 0 0 0 0 0
cpu0 60 0 40 4000 0 0 0 0 0 0
cpu1 100 10 20 5000 5 3 2 0 0 0
intr 12345 0 0
ctxt 999
cpu9 1 1 1 1 1 1 1
";

    #[test]
    fn sums_busy_fields_per_core() {
        let readings = parse_stat(STAT);

        assert_eq!(
            readings,
            vec![Reading::new("cpu0", 100), Reading::new("cpu1", 140)]
        );
    }

    #[test]
    fn skips_malformed_cores() {
        let table = "cpu 1 2 3 4 5 6 7\ncpu0 1 2 3\ncpu1 1 x 3 4 5 6 7\ncpu2 1 1 1 1 1 1 1\n";

        assert_eq!(parse_stat(table), vec![Reading::new("cpu2", 6)]);
    }

    #[test]
    fn aggregate_only_yields_no_series() {
        assert!(parse_stat("cpu 1 2 3 4 5 6 7\nintr 0\n").is_empty());
        assert!(parse_stat("").is_empty());
    }

    #[test]
    fn snapshot_reads_the_table() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("stat");
        fs::write(&path, STAT).unwrap();

        let groups = CpuSource::new(&path).snapshot().unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].graph().is_none());
        assert_eq!(groups[0].readings().len(), 2);
    }

    #[test]
    fn unreadable_table_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = CpuSource::new(temp_dir.path().join("missing"));

        assert!(matches!(
            source.snapshot(),
            Err(SourceError::Unreadable { .. })
        ));
    }

    #[test]
    fn schema_describes_every_core() {
        let source = CpuSource::default();
        let groups = vec![ReadingGroup::builder().readings(parse_stat(STAT)).build()];

        assert_eq!(
            render(&source.graphs(&groups)),
            "graph_title multicpu1sec\n\
             graph_category 1sec\n\
             graph_vlabel average cpu use %\n\
             graph_scale no\n\
             graph_total All CPUs\n\
             update_rate 1\n\
             graph_data_size custom 1d, 10s for 1w, 1m for 1t, 5m for 1y\n\
             cpu0.label CPU 0\n\
             cpu0.draw AREASTACK\n\
             cpu0.type DERIVE\n\
             cpu0.min 0\n\
             cpu1.label CPU 1\n\
             cpu1.draw AREASTACK\n\
             cpu1.type DERIVE\n\
             cpu1.min 0\n"
        );
    }
}
