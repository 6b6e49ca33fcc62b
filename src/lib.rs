pub mod cli;
pub mod csv_writer;
pub mod error;
pub mod loader;
pub mod logfmt;
pub mod logging;
pub mod perf;
pub mod reporter;
pub mod stats;
pub mod topology;
pub mod types;

pub use error::{PlanError, Result};
pub use perf::{Bandwidth, compute_bandwidth};
pub use stats::{CommLog, IterationSummary, StageReport, StageStats};
pub use topology::{RankGenerator, RankGroup, TopologyConfig, generate_orthogonal_rank_groups};
pub use types::{CommGroup, CommRecord, CommType};
