//! Value types of the grouping search.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::analysis::FStage;
use crate::cost::Cost;

/// Tile sizes along the output dimensions of a group. Omission means the
/// dimension is left untiled.
pub type TileSizes = BTreeMap<String, i64>;

/// A set of stages computed together at the granularity of the output
/// stage's tiling.
///
/// Groups start as singletons, one per stage, and only ever mutate through
/// the partitioner's merge routines.
#[derive(Debug, Clone)]
pub struct Group {
    /// The stage with no successor within the group.
    pub output: FStage,
    /// Member stages, in splice order.
    pub members: Vec<FStage>,
    /// Function names whose cost is accounted inside their consumers. For
    /// INLINE merges these are functionally inlined; for FAST_MEM merges
    /// they stay materialized members and the marking only shapes the cost
    /// model.
    pub inlined: BTreeSet<String>,
    pub tile_sizes: TileSizes,
    /// Bytes of producer regions shared between adjacent iterations, per
    /// dimension of this group's output stage.
    pub reuse: BTreeMap<String, Cost>,
}

impl Group {
    pub fn new(output: FStage, members: Vec<FStage>) -> Self {
        Self {
            output,
            members,
            inlined: BTreeSet::new(),
            tile_sizes: TileSizes::new(),
            reuse: BTreeMap::new(),
        }
    }

    /// Function names of all members.
    pub fn member_names(&self) -> BTreeSet<String> {
        self.members.iter().map(FStage::name).collect()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output {} members [", self.output)?;
        for (i, m) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{m}")?;
        }
        write!(f, "] inlined {:?} tiles {:?}", self.inlined, self.tile_sizes)
    }
}

/// Analytical summary of one group. Any unknown component renders the whole
/// analysis invalid for comparison purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAnalysis {
    pub arith_cost: Cost,
    pub mem_cost: Cost,
    pub parallelism: Cost,
}

impl GroupAnalysis {
    pub const UNKNOWN: GroupAnalysis = GroupAnalysis {
        arith_cost: Cost::Unknown,
        mem_cost: Cost::Unknown,
        parallelism: Cost::Unknown,
    };

    pub fn is_known(&self) -> bool {
        self.arith_cost.is_known() && self.mem_cost.is_known() && self.parallelism.is_known()
    }
}

/// A candidate fusion of a producer function into a consumer group, at the
/// granularity of the consumer's tiling.
///
/// Equality and ordering deliberately ignore `tile_sizes`: the cache is
/// keyed by the producer/consumer pair alone.
#[derive(Debug, Clone)]
pub struct FusionChoice {
    pub prod: String,
    pub cons: FStage,
    pub tile_sizes: TileSizes,
}

impl FusionChoice {
    pub fn new(prod: String, cons: FStage) -> Self {
        Self { prod, cons, tile_sizes: TileSizes::new() }
    }
}

impl PartialEq for FusionChoice {
    fn eq(&self, other: &Self) -> bool {
        self.prod == other.prod && self.cons == other.cons
    }
}

impl Eq for FusionChoice {}

impl PartialOrd for FusionChoice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FusionChoice {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.prod, &self.cons).cmp(&(&other.prod, &other.cons))
    }
}

impl fmt::Display for FusionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} tiles {:?}", self.prod, self.cons, self.tile_sizes)
    }
}

/// Benefit and tile configuration recorded for a fusion choice.
#[derive(Debug, Clone)]
pub struct CachedBenefit {
    pub benefit: Cost,
    pub tile_sizes: TileSizes,
}

/// Granularity targeted by one grouping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Merge producers into consumers by expression substitution.
    Inline,
    /// Merge producers into consumers at tile granularity, sized for fast
    /// memory.
    FastMem,
}
