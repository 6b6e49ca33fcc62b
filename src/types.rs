use crate::error::{PlanError, Result};
use crate::perf::{Bandwidth, compute_bandwidth};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of operation carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommType {
    AllReduce,
    AllGather,
    ReduceScatter,
    Broadcast,
    Reduce,
    Gather,
    Scatter,
    AllToAll,
    Isend,
    Irecv,
    Barrier,
    ReduceScatterTensor,
    AllGatherIntoTensor,
    Computation,
    /// End of one training iteration; the first one ends initialization
    EpochEnd,
}

impl CommType {
    pub const ALL: [CommType; 15] = [
        CommType::AllReduce,
        CommType::AllGather,
        CommType::ReduceScatter,
        CommType::Broadcast,
        CommType::Reduce,
        CommType::Gather,
        CommType::Scatter,
        CommType::AllToAll,
        CommType::Isend,
        CommType::Irecv,
        CommType::Barrier,
        CommType::ReduceScatterTensor,
        CommType::AllGatherIntoTensor,
        CommType::Computation,
        CommType::EpochEnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommType::AllReduce => "all_reduce",
            CommType::AllGather => "all_gather",
            CommType::ReduceScatter => "reduce_scatter",
            CommType::Broadcast => "broadcast",
            CommType::Reduce => "reduce",
            CommType::Gather => "gather",
            CommType::Scatter => "scatter",
            CommType::AllToAll => "all_to_all",
            CommType::Isend => "isend",
            CommType::Irecv => "irecv",
            CommType::Barrier => "barrier",
            CommType::ReduceScatterTensor => "reduce_scatter_tensor",
            CommType::AllGatherIntoTensor => "all_gather_into_tensor",
            CommType::Computation => "computation",
            CommType::EpochEnd => "epoch_end",
        }
    }
}

impl fmt::Display for CommType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        // Accept enum-style spellings such as `CommType.all_reduce`
        let name = name.strip_prefix("CommType.").unwrap_or(name);
        CommType::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| PlanError::UnknownCommType(s.to_string()))
    }
}

/// Named communication group a record runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommGroup {
    DpGroup,
    PpGroup,
    TpGroup,
    EpGroup,
    EpDpGroup,
    EpTpGroup,
    EmbeddingGroup,
    AllNodes,
}

impl CommGroup {
    pub const ALL: [CommGroup; 8] = [
        CommGroup::DpGroup,
        CommGroup::PpGroup,
        CommGroup::TpGroup,
        CommGroup::EpGroup,
        CommGroup::EpDpGroup,
        CommGroup::EpTpGroup,
        CommGroup::EmbeddingGroup,
        CommGroup::AllNodes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommGroup::DpGroup => "dp_group",
            CommGroup::PpGroup => "pp_group",
            CommGroup::TpGroup => "tp_group",
            CommGroup::EpGroup => "ep_group",
            CommGroup::EpDpGroup => "ep_dp_group",
            CommGroup::EpTpGroup => "ep_tp_group",
            CommGroup::EmbeddingGroup => "embedding_group",
            CommGroup::AllNodes => "all_nodes",
        }
    }
}

impl fmt::Display for CommGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommGroup {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let name = name.strip_prefix("CommGroup.").unwrap_or(name);
        // Older CSV dumps name the whole-world group by its member name
        if name == "all" {
            return Ok(CommGroup::AllNodes);
        }
        CommGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == name)
            .ok_or_else(|| PlanError::UnknownCommGroup(s.to_string()))
    }
}

/// Label for an optional group in tables and keys
pub fn group_label(group: Option<CommGroup>) -> &'static str {
    group.map_or("None", CommGroup::as_str)
}

/// One communication or compute event.
///
/// A record without an elapsed time is a planned workload item. Timing is
/// attached with [`CommRecord::with_duration`], which also derives the
/// bandwidth pair. [`CommRecord::with_bandwidth`] overrides that pair with
/// figures measured elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommRecord {
    pub comm_type: CommType,
    pub comm_group: Option<CommGroup>,
    pub comm_group_size: Option<usize>,
    /// Payload in bytes
    pub msg_size: u64,
    pub stage: String,
    pub src: Option<usize>,
    pub dst: Option<usize>,
    pub additional: String,
    elapsed_ms: Option<f64>,
    algbw: Option<f64>,
    busbw: Option<f64>,
}

impl CommRecord {
    /// Build an untimed record.
    ///
    /// Computation records without a group run on `all_nodes`. Every other
    /// type except the `epoch_end` marker needs an explicit group.
    pub fn new(
        comm_type: CommType,
        comm_group: Option<CommGroup>,
        comm_group_size: Option<usize>,
        msg_size: u64,
    ) -> Result<Self> {
        let comm_group = match (comm_type, comm_group) {
            (_, Some(group)) => Some(group),
            (CommType::Computation, None) => Some(CommGroup::AllNodes),
            (CommType::EpochEnd, None) => None,
            (other, None) => return Err(PlanError::MissingCommGroup(other.to_string())),
        };

        Ok(Self {
            comm_type,
            comm_group,
            comm_group_size,
            msg_size,
            stage: String::new(),
            src: None,
            dst: None,
            additional: String::new(),
            elapsed_ms: None,
            algbw: None,
            busbw: None,
        })
    }

    /// Iteration boundary marker without payload
    pub fn epoch_end() -> Self {
        Self {
            comm_type: CommType::EpochEnd,
            comm_group: None,
            comm_group_size: None,
            msg_size: 0,
            stage: String::new(),
            src: None,
            dst: None,
            additional: String::new(),
            elapsed_ms: None,
            algbw: None,
            busbw: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_peers(mut self, src: Option<usize>, dst: Option<usize>) -> Self {
        self.src = src;
        self.dst = dst;
        self
    }

    pub fn with_additional(mut self, additional: impl Into<String>) -> Self {
        self.additional = additional.into();
        self
    }

    /// Attach an elapsed time and derive the bandwidth pair from it
    pub fn with_duration(self, duration_ms: f64) -> Result<Self> {
        let bw = compute_bandwidth(self.comm_type, self.msg_size, duration_ms, self.comm_group_size)?;
        Ok(Self {
            elapsed_ms: Some(duration_ms),
            algbw: Some(bw.algbw),
            busbw: Some(bw.busbw),
            ..self
        })
    }

    /// Replace the derived bandwidth pair with logged values
    pub fn with_bandwidth(self, bw: Bandwidth) -> Self {
        Self {
            algbw: Some(bw.algbw),
            busbw: Some(bw.busbw),
            ..self
        }
    }

    pub fn is_epoch_end(&self) -> bool {
        self.comm_type == CommType::EpochEnd
    }

    /// True until a duration has been attached
    pub fn is_workload(&self) -> bool {
        self.elapsed_ms.is_none()
    }

    /// Compute overlapped with communication; reported without payload
    pub fn is_overlap(&self) -> bool {
        self.additional == "overlap"
    }

    pub fn elapsed_ms(&self) -> Option<f64> {
        self.elapsed_ms
    }

    pub fn algbw(&self) -> Option<f64> {
        self.algbw
    }

    pub fn busbw(&self) -> Option<f64> {
        self.busbw
    }

    pub fn bandwidth(&self) -> Option<Bandwidth> {
        Some(Bandwidth {
            algbw: self.algbw?,
            busbw: self.busbw?,
        })
    }
}
