pub mod groups;
pub mod radix;

pub use groups::{RankGroup, generate_orthogonal_rank_groups};

use crate::error::{PlanError, Result};
use crate::types::CommGroup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Default mapping order, innermost dimension first
pub const DEFAULT_ORDER: &str = "tp-cp-ep-dp-pp";

/// One named parallel dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Tp,
    Pp,
    Dp,
    Ep,
    Cp,
}

impl Dim {
    /// Every dimension, in the order missing entries are appended
    pub const ALL: [Dim; 5] = [Dim::Tp, Dim::Pp, Dim::Dp, Dim::Ep, Dim::Cp];

    pub fn as_str(self) -> &'static str {
        match self {
            Dim::Tp => "tp",
            Dim::Pp => "pp",
            Dim::Dp => "dp",
            Dim::Ep => "ep",
            Dim::Cp => "cp",
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dim {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tp" => Ok(Dim::Tp),
            "pp" => Ok(Dim::Pp),
            "dp" => Ok(Dim::Dp),
            "ep" => Ok(Dim::Ep),
            "cp" => Ok(Dim::Cp),
            _ => Err(PlanError::UnknownDimension {
                token: s.to_string(),
                within: s.to_string(),
            }),
        }
    }
}

/// Parse a hyphen-joined list of dimension names, rejecting repeats
fn parse_dims(spec: &str) -> Result<Vec<Dim>> {
    let mut dims = Vec::new();
    for token in spec.split('-') {
        let dim = token
            .parse::<Dim>()
            .map_err(|_| PlanError::UnknownDimension {
                token: token.to_string(),
                within: spec.to_string(),
            })?;
        if dims.contains(&dim) {
            return Err(PlanError::DuplicateDimension {
                token: token.to_string(),
                within: spec.to_string(),
            });
        }
        dims.push(dim);
    }
    Ok(dims)
}

/// Topology settings as read from flags or a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub tp: usize,
    pub pp: usize,
    pub dp: usize,
    pub ep: usize,
    pub cp: usize,
    pub order: String,
    /// Expected total rank count; checked against the dimensions when set
    pub world_size: Option<usize>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            tp: 1,
            pp: 1,
            dp: 1,
            ep: 1,
            cp: 1,
            order: DEFAULT_ORDER.to_string(),
            world_size: None,
        }
    }
}

impl TopologyConfig {
    /// Load a topology from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| PlanError::Parse {
            line: e.line(),
            reason: e.to_string(),
        })
    }

    /// Validate the settings and precompute both rank layouts
    pub fn build(&self) -> Result<RankGenerator> {
        let generator = RankGenerator::new(self.tp, self.ep, self.dp, self.pp, self.cp, &self.order)?;
        if let Some(world_size) = self.world_size {
            if world_size != generator.world_size() {
                return Err(PlanError::WorldSizeMismatch {
                    world_size,
                    product: generator.world_size(),
                });
            }
        }
        Ok(generator)
    }
}

/// Ordered dimensions together with their sizes
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    order: Vec<Dim>,
    sizes: Vec<usize>,
}

/// Resolves parallel-group tokens to concrete rank groups.
///
/// The order string picks which dimension varies fastest: in `tp-pp-dp`
/// consecutive ranks share a tensor-parallel group and data-parallel peers
/// are `tp * pp` ranks apart. Two layouts are kept, one with `ep` folded
/// into `dp` and one with `dp` split into `dp / ep` replicas of an `ep` axis.
#[derive(Debug, Clone)]
pub struct RankGenerator {
    tp: usize,
    ep: usize,
    dp: usize,
    pp: usize,
    cp: usize,
    world_size: usize,
    order: String,
    with_ep: Layout,
    without_ep: Layout,
}

impl RankGenerator {
    pub fn new(tp: usize, ep: usize, dp: usize, pp: usize, cp: usize, order: &str) -> Result<Self> {
        for (dim, size) in [(Dim::Tp, tp), (Dim::Ep, ep), (Dim::Dp, dp), (Dim::Pp, pp), (Dim::Cp, cp)] {
            if size == 0 {
                return Err(PlanError::ShapeMismatch(format!("{} size must be positive", dim)));
            }
        }
        if dp % ep != 0 {
            return Err(PlanError::Indivisible {
                what: "data parallel size by expert parallel size",
                numerator: dp,
                denominator: ep,
            });
        }
        let world_size = radix::checked_product(&[tp, dp, pp, cp]).ok_or_else(|| {
            PlanError::ShapeMismatch(format!(
                "world size tp={} dp={} pp={} cp={} overflows",
                tp, dp, pp, cp
            ))
        })?;

        let size_of = |dim: Dim| match dim {
            Dim::Tp => tp,
            Dim::Pp => pp,
            Dim::Dp => dp,
            Dim::Ep => ep,
            Dim::Cp => cp,
        };

        let normalized = order.trim().to_ascii_lowercase();
        let mut dims = parse_dims(&normalized)?;

        if ep > 1 {
            if let Some(ep_pos) = dims.iter().position(|&d| d == Dim::Ep) {
                let adjacent = dims
                    .iter()
                    .position(|&d| d == Dim::Dp)
                    .is_some_and(|dp_pos| dp_pos.abs_diff(ep_pos) == 1);
                if !adjacent {
                    return Err(PlanError::NotAdjacent(order.to_string()));
                }
            }
        }

        for dim in Dim::ALL {
            if dims.contains(&dim) {
                continue;
            }
            if size_of(dim) != 1 {
                return Err(PlanError::MissingOrder {
                    dim: dim.to_string(),
                    size: size_of(dim),
                    order: order.to_string(),
                });
            }
            dims.push(dim);
        }

        let with_ep = Layout {
            sizes: dims
                .iter()
                .map(|&d| if d == Dim::Dp { dp / ep } else { size_of(d) })
                .collect(),
            order: dims.clone(),
        };
        let without_order: Vec<Dim> = dims.into_iter().filter(|&d| d != Dim::Ep).collect();
        let without_ep = Layout {
            sizes: without_order.iter().map(|&d| size_of(d)).collect(),
            order: without_order,
        };

        debug!(
            world_size,
            order = %order,
            with_ep = ?with_ep.order,
            "built rank generator"
        );

        Ok(Self {
            tp,
            ep,
            dp,
            pp,
            cp,
            world_size,
            order: order.to_string(),
            with_ep,
            without_ep,
        })
    }

    /// Total rank count, `tp * pp * dp * cp`
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Ordering string as supplied at construction
    pub fn order(&self) -> &str {
        &self.order
    }

    /// Normalized ordering, optionally including the expert axis
    pub fn ordered_dims(&self, independent_ep: bool) -> &[Dim] {
        &self.layout(independent_ep).order
    }

    /// Sizes matching [`ordered_dims`](Self::ordered_dims)
    pub fn ordered_sizes(&self, independent_ep: bool) -> &[usize] {
        &self.layout(independent_ep).sizes
    }

    pub fn size_of(&self, dim: Dim) -> usize {
        match dim {
            Dim::Tp => self.tp,
            Dim::Pp => self.pp,
            Dim::Dp => self.dp,
            Dim::Ep => self.ep,
            Dim::Cp => self.cp,
        }
    }

    fn layout(&self, independent_ep: bool) -> &Layout {
        if independent_ep {
            &self.with_ep
        } else {
            &self.without_ep
        }
    }

    /// Mask over `order` selecting the dimensions named by `token` (e.g. `tp-dp`)
    pub fn get_mask(order: &[Dim], token: &str) -> Result<Vec<bool>> {
        let mut mask = vec![false; order.len()];
        for dim in parse_dims(&token.trim().to_ascii_lowercase())? {
            let pos = order
                .iter()
                .position(|&d| d == dim)
                .ok_or_else(|| PlanError::UnknownDimension {
                    token: dim.to_string(),
                    within: order
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join("-"),
                })?;
            mask[pos] = true;
        }
        Ok(mask)
    }

    /// Rank groups for a hyphen-joined dimension token.
    ///
    /// With `independent_ep` set, `ep` and `dp` are separate axes: `dp` then
    /// yields data-parallel groups modulo expert replication and `ep` yields
    /// pure expert groups. Without it, `ep` is not an addressable dimension.
    pub fn get_ranks(&self, token: &str, independent_ep: bool) -> Result<Vec<RankGroup>> {
        let layout = self.layout(independent_ep);
        let mask = Self::get_mask(&layout.order, token)?;
        generate_orthogonal_rank_groups(self.world_size, &layout.sizes, &mask)
    }

    /// Rank groups backing a named communication group
    pub fn groups_for(&self, group: CommGroup) -> Result<Vec<RankGroup>> {
        match group {
            CommGroup::TpGroup => self.get_ranks("tp", false),
            CommGroup::PpGroup => self.get_ranks("pp", false),
            CommGroup::DpGroup => self.get_ranks("dp", false),
            CommGroup::EpGroup => self.get_ranks("ep", true),
            CommGroup::EpDpGroup => self.get_ranks("dp", true),
            CommGroup::EpTpGroup => self.get_ranks("tp-ep", true),
            CommGroup::EmbeddingGroup => Ok(self
                .get_ranks("pp", false)?
                .into_iter()
                .map(|stages| {
                    let mut ends = vec![stages[0]];
                    if let Some(&last) = stages.last().filter(|&&r| r != stages[0]) {
                        ends.push(last);
                    }
                    ends
                })
                .collect()),
            CommGroup::AllNodes => Ok(vec![(0..self.world_size).collect()]),
        }
    }

    /// Member count of each group backing `group`
    pub fn group_size_for(&self, group: CommGroup) -> Result<usize> {
        Ok(self.groups_for(group)?.first().map_or(0, Vec::len))
    }
}
