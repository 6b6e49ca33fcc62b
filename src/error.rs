use thiserror::Error;

/// Errors raised by the planner core
#[derive(Debug, Error)]
pub enum PlanError {
    /// Declared world size disagrees with the parallel dimensions
    #[error("world size {world_size} does not match tp*pp*dp*cp = {product}")]
    WorldSizeMismatch { world_size: usize, product: usize },

    /// A dimension larger than 1 was left out of the ordering
    #[error("the size of ({dim}) is ({size}), but it is missing from the order ({order})")]
    MissingOrder {
        dim: String,
        size: usize,
        order: String,
    },

    /// Expert and data dimensions are separated in the ordering
    #[error("ep and dp must be adjacent in order ({0})")]
    NotAdjacent(String),

    /// Ordering or group token names something that is not a dimension
    #[error("unknown parallel dimension '{token}' in '{within}'")]
    UnknownDimension { token: String, within: String },

    /// Same dimension listed twice
    #[error("dimension '{token}' appears more than once in '{within}'")]
    DuplicateDimension { token: String, within: String },

    /// A size that must divide another does not
    #[error("{what}: {numerator} is not divisible by {denominator}")]
    Indivisible {
        what: &'static str,
        numerator: usize,
        denominator: usize,
    },

    /// Generator inputs disagree with each other
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Zero, negative or non-finite elapsed time fed to the bandwidth model
    #[error("duration must be a positive number of milliseconds, got {0}")]
    NonPositiveDuration(f64),

    #[error("unknown communication type '{0}'")]
    UnknownCommType(String),

    #[error("unknown communication group '{0}'")]
    UnknownCommGroup(String),

    /// Non-computation record without a communication group
    #[error("{0} record requires a communication group")]
    MissingCommGroup(String),

    /// Malformed input line or field
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Iteration-time analysis needs at least one closed training iteration
    #[error("no completed training iterations in the log")]
    NoIterations,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, PlanError>;
