use crate::error::{PlanError, Result};
use crate::types::{CommGroup, CommRecord, CommType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Reporting stage a segment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Train,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => f.write_str("init"),
            Stage::Train => f.write_str("train"),
        }
    }
}

/// Ingestion state: before or after the first closed iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Training,
}

/// Grouping key by type and group
pub type CoarseKey = (CommType, Option<CommGroup>);
/// Grouping key by type, group and message size
pub type DetailedKey = (CommType, Option<CommGroup>, u64);

/// Mean, population standard deviation and range of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty sample
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(Self {
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }
}

/// Accumulated observations for one grouping key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageStats {
    pub count: u64,
    /// Sum of message sizes in bytes
    pub msg_size: u64,
    pub elapsed_ms: Vec<f64>,
    pub busbw: Vec<f64>,
}

impl StageStats {
    fn add(&mut self, record: &CommRecord) {
        self.count += 1;
        self.msg_size += record.msg_size;
        if let Some(elapsed) = record.elapsed_ms() {
            self.elapsed_ms.push(elapsed);
        }
        if let Some(busbw) = record.busbw() {
            self.busbw.push(busbw);
        }
    }

    pub fn elapsed_summary(&self) -> Option<Summary> {
        Summary::of(&self.elapsed_ms)
    }

    pub fn busbw_summary(&self) -> Option<Summary> {
        Summary::of(&self.busbw)
    }
}

/// One flattened statistics row, as printed or exported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub comm_type: CommType,
    pub comm_group: Option<CommGroup>,
    /// Message size of the key; absent for coarse rows
    pub msg_size: Option<u64>,
    pub count: u64,
    pub total_msg_size: u64,
    pub elapsed_ms: Option<Summary>,
    pub busbw: Option<Summary>,
}

impl StatsRow {
    fn new(comm_type: CommType, comm_group: Option<CommGroup>, msg_size: Option<u64>, stats: &StageStats) -> Self {
        Self {
            comm_type,
            comm_group,
            msg_size,
            count: stats.count,
            total_msg_size: stats.msg_size,
            elapsed_ms: stats.elapsed_summary(),
            busbw: stats.busbw_summary(),
        }
    }
}

/// Statistics of one stage, merged over its segments
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// Number of segments folded into this stage
    pub segments: usize,
    pub coarse: BTreeMap<CoarseKey, StageStats>,
    pub detailed: BTreeMap<DetailedKey, StageStats>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            segments: 0,
            coarse: BTreeMap::new(),
            detailed: BTreeMap::new(),
        }
    }

    fn ingest(&mut self, segment: &[CommRecord]) {
        self.segments += 1;
        for record in segment.iter().filter(|r| r.comm_type != CommType::Computation) {
            self.coarse
                .entry((record.comm_type, record.comm_group))
                .or_default()
                .add(record);
            self.detailed
                .entry((record.comm_type, record.comm_group, record.msg_size))
                .or_default()
                .add(record);
        }
    }

    pub fn coarse_rows(&self) -> Vec<StatsRow> {
        self.coarse
            .iter()
            .map(|(&(t, g), stats)| StatsRow::new(t, g, None, stats))
            .collect()
    }

    pub fn detailed_rows(&self) -> Vec<StatsRow> {
        self.detailed
            .iter()
            .map(|(&(t, g, size), stats)| StatsRow::new(t, g, Some(size), stats))
            .collect()
    }
}

/// Iteration-time statistics over closed training iterations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    /// Time reported by the marker that closed initialization
    pub init_ms: Option<f64>,
    pub iterations: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub std: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Value at `floor(len * p)` of an ascending sample, no interpolation
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Segmented record stream of one run.
///
/// Everything before the first `epoch_end` marker is initialization, every
/// later segment is one training iteration.
#[derive(Debug, Clone)]
pub struct CommLog {
    closed: Vec<Vec<CommRecord>>,
    markers: Vec<CommRecord>,
    open: Vec<CommRecord>,
    phase: Phase,
}

impl Default for CommLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommLog {
    pub fn new() -> Self {
        Self {
            closed: Vec::new(),
            markers: Vec::new(),
            open: Vec::new(),
            phase: Phase::Init,
        }
    }

    /// Append one record.
    ///
    /// An `epoch_end` marker closes the open segment when that segment has
    /// records. Markers arriving with nothing open (repeated markers, or a
    /// marker at the very start) are dropped.
    pub fn push(&mut self, record: CommRecord) {
        if !record.is_epoch_end() {
            self.open.push(record);
            return;
        }

        if self.open.is_empty() {
            debug!("dropping epoch_end marker with no open segment");
            return;
        }

        self.closed.push(std::mem::take(&mut self.open));
        self.markers.push(record);
        if self.phase == Phase::Init {
            debug!(records = self.closed[0].len(), "initialization stage closed");
            self.phase = Phase::Training;
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Closed segments followed by the open one, if it has records
    pub fn segments(&self) -> Vec<&[CommRecord]> {
        let mut segments: Vec<&[CommRecord]> = self.closed.iter().map(Vec::as_slice).collect();
        if !self.open.is_empty() || segments.is_empty() {
            segments.push(&self.open);
        }
        segments
    }

    /// Elapsed time of each closing marker, in closing order
    pub fn epoch_times(&self) -> Vec<Option<f64>> {
        self.markers.iter().map(CommRecord::elapsed_ms).collect()
    }

    /// All kept records in emission order, markers included
    pub fn records(&self) -> Vec<&CommRecord> {
        let mut out = Vec::new();
        for (segment, marker) in self.closed.iter().zip(&self.markers) {
            out.extend(segment.iter());
            out.push(marker);
        }
        out.extend(self.open.iter());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.open.is_empty()
    }

    /// Per-stage statistics: `init` first, then `train` when any iteration exists
    pub fn analyze(&self) -> Vec<StageReport> {
        let segments = self.segments();
        let mut init = StageReport::new(Stage::Init);
        init.ingest(segments[0]);

        let mut reports = vec![init];
        if segments.len() > 1 {
            let mut train = StageReport::new(Stage::Train);
            for segment in &segments[1..] {
                train.ingest(segment);
            }
            reports.push(train);
        }
        reports
    }

    /// Iteration-time statistics, excluding the initialization segment
    pub fn analyze_time(&self) -> Result<IterationSummary> {
        let times = self.epoch_times();
        let init_ms = times.first().copied().flatten();

        let mut iterations: Vec<f64> = Vec::new();
        for (i, time) in times.iter().enumerate().skip(1) {
            match time {
                Some(t) => iterations.push(*t),
                None => warn!(iteration = i, "epoch_end marker without elapsed time, skipping"),
            }
        }
        if iterations.is_empty() {
            return Err(PlanError::NoIterations);
        }

        iterations.sort_by(f64::total_cmp);
        let summary = Summary::of(&iterations).ok_or(PlanError::NoIterations)?;
        Ok(IterationSummary {
            init_ms,
            iterations: iterations.len(),
            max: summary.max,
            min: summary.min,
            mean: summary.mean,
            std: summary.std,
            p90: percentile(&iterations, 0.9).ok_or(PlanError::NoIterations)?,
            p99: percentile(&iterations, 0.99).ok_or(PlanError::NoIterations)?,
        })
    }
}

/// Serializable stage section of a [`LogReport`]
#[derive(Debug, Clone, Serialize)]
pub struct StageSection {
    pub stage: Stage,
    pub segments: usize,
    pub coarse: Vec<StatsRow>,
    pub detailed: Vec<StatsRow>,
}

/// Full analysis of one log, ready for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    pub generated_at: DateTime<Utc>,
    pub records: usize,
    pub stages: Vec<StageSection>,
    pub iteration_time: Option<IterationSummary>,
}

impl LogReport {
    pub fn new(log: &CommLog) -> Self {
        let stages = log
            .analyze()
            .into_iter()
            .map(|report| StageSection {
                stage: report.stage,
                segments: report.segments,
                coarse: report.coarse_rows(),
                detailed: report.detailed_rows(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            records: log.records().len(),
            stages,
            iteration_time: log.analyze_time().ok(),
        }
    }
}
