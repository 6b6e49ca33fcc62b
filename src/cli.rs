use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "commplan")]
#[command(about = "Rank-group planner and communication log analyzer for parallel training", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Log level used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Diagnostic log format: pretty or json (default: $COMMPLAN_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Parallel layout; flags override values read from --config
#[derive(Args, Debug, Clone, Default)]
pub struct TopologyArgs {
    /// JSON file with tp/pp/dp/ep/cp/order/world_size fields
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    /// Tensor parallel size
    #[arg(long)]
    pub tp: Option<usize>,

    /// Pipeline parallel size
    #[arg(long)]
    pub pp: Option<usize>,

    /// Data parallel size (expert parallel ranks included)
    #[arg(long)]
    pub dp: Option<usize>,

    /// Expert parallel size; must divide the data parallel size
    #[arg(long)]
    pub ep: Option<usize>,

    /// Context parallel size
    #[arg(long)]
    pub cp: Option<usize>,

    /// Mapping order, innermost first (e.g. tp-cp-ep-dp-pp)
    #[arg(long)]
    pub order: Option<String>,

    /// Expected world size; rejected if it disagrees with tp*pp*dp*cp
    #[arg(long)]
    pub world_size: Option<usize>,
}

/// Input layout of a record file
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    /// CSV with a header row
    Csv,
    /// Text log with `comm op: ...` lines
    Log,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the rank groups of a parallel layout
    Ranks {
        #[command(flatten)]
        topology: TopologyArgs,

        /// Hyphen-joined dimensions forming one group (e.g. tp, dp, tp-dp)
        #[arg(short, long, conflicts_with = "comm_group")]
        group: Option<String>,

        /// Named communication group (e.g. dp_group, ep_dp_group, embedding_group)
        #[arg(long)]
        comm_group: Option<String>,

        /// Treat ep and dp as separate axes when resolving --group
        #[arg(long)]
        independent_ep: bool,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },

    /// Compute algorithmic and bus bandwidth of one operation
    Bandwidth {
        /// Communication type (e.g. all_reduce, all_gather, broadcast)
        #[arg(short = 't', long)]
        comm_type: String,

        /// Payload size in bytes
        #[arg(short, long)]
        size: u64,

        /// Elapsed time in milliseconds
        #[arg(short, long)]
        duration_ms: f64,

        /// Number of ranks in the communication group
        #[arg(short, long)]
        group_size: Option<usize>,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },

    /// Segment a record file into stages and summarize it
    Analyze {
        /// Record file (CSV or text log)
        file: std::path::PathBuf,

        /// Input format (default: by file extension)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Group rows by type and group only, not by message size
        #[arg(long)]
        coarse: bool,

        /// Also print the initialization stage
        #[arg(long)]
        include_init: bool,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Suppress human-readable output (useful with --csv)
        #[arg(long)]
        quiet: bool,

        /// Export stage statistics to this CSV file
        #[arg(long)]
        csv: Option<std::path::PathBuf>,

        /// Export the parsed record stream to this CSV file
        #[arg(long)]
        records_csv: Option<std::path::PathBuf>,
    },
}
