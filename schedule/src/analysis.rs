//! Dependence analysis over the pipeline graph.
//!
//! For a stage evaluated over a bounds box, [`DependenceAnalysis`] computes
//! the region of every upstream function required to produce it, by walking
//! producer stages with a work queue and hull-merging the inferred access
//! boxes. [`redundant_regions`](DependenceAnalysis::redundant_regions)
//! measures the overlap between two adjacent tiles along one variable,
//! which is exactly the work recomputed when a producer is tiled with its
//! consumer.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use mosaic_ir::bounds::{boxes_required, BBox, FuncValueBounds, Interval};
use mosaic_ir::expr::{Expr, ExprRef};
use mosaic_ir::func::Function;
use mosaic_ir::simplify::simplify;

/// One stage of a function: `(function, stage_num)` with `stage_num == 0`
/// the pure definition and `k >= 1` the k-th update.
#[derive(Clone)]
pub struct FStage {
    pub func: Function,
    pub stage_num: usize,
}

impl FStage {
    pub fn new(func: Function, stage_num: usize) -> Self {
        Self { func, stage_num }
    }

    pub fn name(&self) -> String {
        self.func.name()
    }

    /// The final stage of a function: reading it reads the function's
    /// completed state.
    pub fn last_stage(func: &Function) -> Self {
        Self { func: func.clone(), stage_num: func.num_stages() - 1 }
    }

    pub fn is_last_stage(&self) -> bool {
        self.stage_num + 1 == self.func.num_stages()
    }
}

impl PartialEq for FStage {
    fn eq(&self, other: &Self) -> bool {
        self.func.name() == other.func.name() && self.stage_num == other.stage_num
    }
}

impl Eq for FStage {}

impl PartialOrd for FStage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FStage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.func.name(), self.stage_num).cmp(&(other.func.name(), other.stage_num))
    }
}

impl fmt::Debug for FStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.func.name(), self.stage_num)
    }
}

impl fmt::Display for FStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.func.name(), self.stage_num)
    }
}

/// Per-variable bounds of one stage's loop nest.
pub type DimBounds = BTreeMap<String, Interval>;

pub struct DependenceAnalysis {
    env: BTreeMap<String, Function>,
    func_val_bounds: FuncValueBounds,
}

impl DependenceAnalysis {
    pub fn new(env: BTreeMap<String, Function>, func_val_bounds: FuncValueBounds) -> Self {
        Self { env, func_val_bounds }
    }

    pub fn env(&self) -> &BTreeMap<String, Function> {
        &self.env
    }

    /// Bounds of stage `stage_num`: the pure bounds overlaid with the
    /// stage's reduction domains.
    ///
    /// Assumes the pure domain is shared across all updates, which can
    /// overestimate.
    pub fn get_stage_bounds(&self, f: &Function, stage_num: usize, pure_bounds: &DimBounds) -> DimBounds {
        let mut bounds = pure_bounds.clone();
        if let Ok(def) = f.definition(stage_num) {
            for rvar in def.schedule().rvars() {
                bounds.insert(rvar.var.clone(), rvar_interval(&rvar.min, &rvar.extent));
            }
        }
        bounds
    }

    /// Per-stage bounds for every stage of a function.
    pub fn get_all_stage_bounds(&self, f: &Function, pure_bounds: &DimBounds) -> Vec<DimBounds> {
        (0..f.num_stages()).map(|s| self.get_stage_bounds(f, s, pure_bounds)).collect()
    }

    /// Regions of every upstream function and image required to evaluate
    /// stage `(f, stage_num)` over `bounds`.
    pub fn regions_required_stage(
        &self,
        f: &Function,
        stage_num: usize,
        bounds: &DimBounds,
    ) -> BTreeMap<String, BBox> {
        let mut regions: BTreeMap<String, BBox> = BTreeMap::new();
        let mut queue: VecDeque<(FStage, DimBounds)> = VecDeque::new();
        queue.push_back((FStage::new(f.clone(), stage_num), bounds.clone()));

        while let Some((stage, curr_bounds)) = queue.pop_front() {
            let Ok(def) = stage.func.definition(stage.stage_num) else {
                continue;
            };

            let dims = def.schedule().dims();
            let mut scope: BTreeMap<String, Interval> = BTreeMap::new();
            for dim in &dims[..dims.len() - 1] {
                let interval = curr_bounds.get(&dim.var).unwrap_or_else(|| {
                    panic!("no bounds for dimension {} of {}", dim.var, stage)
                });
                scope.insert(dim.var.clone(), interval.simplified());
            }

            for e in def.values().iter().chain(def.args().iter()) {
                let curr_regions = boxes_required(e, &scope, &self.func_val_bounds);
                for (callee, region) in curr_regions {
                    match regions.get_mut(&callee) {
                        Some(existing) => existing.merge(&region),
                        None => {
                            regions.insert(callee.clone(), region.clone());
                        }
                    }

                    // Recurse into every stage of an upstream pipeline
                    // function, each over its own reduction-extended bounds.
                    if callee == stage.func.name() {
                        continue;
                    }
                    let Some(prod_func) = self.env.get(&callee) else {
                        continue;
                    };
                    let args = prod_func.args();
                    debug_assert_eq!(args.len(), region.len(), "region rank mismatch for {callee}");
                    let prod_pure_bounds: DimBounds =
                        args.into_iter().zip(region.iter().cloned()).collect();
                    for (prod_stage, prod_bounds) in
                        self.get_all_stage_bounds(prod_func, &prod_pure_bounds).into_iter().enumerate()
                    {
                        queue.push_back((FStage::new(prod_func.clone(), prod_stage), prod_bounds));
                    }
                }
            }
        }

        self.concretize(regions)
    }

    /// Simplify box endpoints and substitute user estimates for endpoints
    /// that stayed symbolic. Endpoints on inputs without estimates remain
    /// symbolic; their areas read as unknown.
    fn concretize(&self, regions: BTreeMap<String, BBox>) -> BTreeMap<String, BBox> {
        let mut concrete = BTreeMap::new();
        for (name, mut bx) in regions {
            bx.simplify();
            let func = self.env.get(&name);
            let mut out = BBox::default();
            for (i, interval) in bx.iter().enumerate() {
                let mut lower = interval.min.clone();
                let mut upper = interval.max.clone();
                if let Some(f) = func {
                    let args = f.args();
                    if i < args.len() {
                        if lower.as_int().is_none() {
                            if let Some(est) = estimate_endpoints(f, &args[i]) {
                                lower = Expr::int(est.0);
                            }
                        }
                        if upper.as_int().is_none() {
                            if let Some(est) = estimate_endpoints(f, &args[i]) {
                                upper = Expr::int(est.1);
                            }
                        }
                    }
                }
                out.push(Interval::new(lower, upper));
            }
            concrete.insert(name, out);
        }
        concrete
    }

    /// Regions required by every stage of `f`, hull-merged.
    pub fn regions_required(&self, f: &Function, pure_bounds: &DimBounds) -> BTreeMap<String, BBox> {
        let mut regions: BTreeMap<String, BBox> = BTreeMap::new();
        for (stage, bounds) in self.get_all_stage_bounds(f, pure_bounds).into_iter().enumerate() {
            for (callee, region) in self.regions_required_stage(f, stage, &bounds) {
                match regions.get_mut(&callee) {
                    Some(existing) => existing.merge(&region),
                    None => {
                        regions.insert(callee, region);
                    }
                }
            }
        }
        regions
    }

    /// Overlap between the regions required by two adjacent tiles along
    /// `var`: the work that would be computed twice if producers were tiled
    /// with this stage. Functions absent from the shifted side are dropped.
    pub fn redundant_regions(
        &self,
        f: &Function,
        stage_num: usize,
        var: &str,
        bounds: &DimBounds,
    ) -> BTreeMap<String, BBox> {
        let regions = self.regions_required_stage(f, stage_num, bounds);

        let mut shifted_bounds = bounds.clone();
        if let Some(interval) = bounds.get(var) {
            let len = simplify(&Expr::add(
                Expr::sub(interval.max.clone(), interval.min.clone()),
                Expr::int(1),
            ));
            shifted_bounds.insert(
                var.to_string(),
                Interval::new(
                    simplify(&Expr::add(interval.min.clone(), len.clone())),
                    simplify(&Expr::add(interval.max.clone(), len)),
                ),
            );
        }
        let shifted_regions = self.regions_required_stage(f, stage_num, &shifted_bounds);

        let mut overlaps = BTreeMap::new();
        for (callee, region) in regions {
            let Some(shifted) = shifted_regions.get(&callee) else {
                continue;
            };
            debug_assert_eq!(region.len(), shifted.len(), "box rank mismatch for {callee}");
            let mut overlap = region.intersect(shifted);
            overlap.simplify();
            overlaps.insert(callee, overlap);
        }
        overlaps
    }

    /// One redundant-region map per non-outermost dim, in dim order.
    pub fn overlap_regions(
        &self,
        f: &Function,
        stage_num: usize,
        bounds: &DimBounds,
    ) -> Vec<BTreeMap<String, BBox>> {
        let Ok(def) = f.definition(stage_num) else {
            return Vec::new();
        };
        let dims = def.schedule().dims();
        dims[..dims.len() - 1]
            .iter()
            .map(|dim| self.redundant_regions(f, stage_num, &dim.var, bounds))
            .collect()
    }

    /// Bounds of every function in the pipeline, given the output estimates:
    /// the union of all output-driven required regions plus the outputs'
    /// own estimate boxes.
    pub fn get_pipeline_bounds(&self, outputs: &[Function]) -> BTreeMap<String, BBox> {
        let mut pipeline_bounds: BTreeMap<String, BBox> = BTreeMap::new();

        for out in outputs {
            let mut pure_bounds = DimBounds::new();
            let mut out_box = BBox::default();
            for arg in out.args() {
                let interval = match out.estimates().iter().find(|est| est.var == arg) {
                    Some(est) => rvar_interval(&est.min, &est.extent),
                    // Estimates are validated before scheduling begins; a
                    // missing one here degrades to a symbolic bound.
                    None => Interval::point(Expr::var(arg.as_str())),
                };
                pure_bounds.insert(arg.clone(), interval.clone());
                out_box.push(interval);
            }

            let mut regions = self.regions_required(out, &pure_bounds);
            regions.insert(out.name(), out_box);

            for (callee, region) in regions {
                match pipeline_bounds.get_mut(&callee) {
                    Some(existing) => existing.merge(&region),
                    None => {
                        pipeline_bounds.insert(callee, region);
                    }
                }
            }
        }

        pipeline_bounds
    }
}

/// Literal `(min, max)` of the user estimate on one pure dimension, if the
/// estimate exists and is literal.
fn estimate_endpoints(f: &Function, var: &str) -> Option<(i64, i64)> {
    for est in f.estimates() {
        if est.var == var {
            let min = est.min.as_int()?;
            let extent = est.extent.as_int()?;
            return Some((min, min + extent - 1));
        }
    }
    None
}

/// `[min, min + extent - 1]`, simplified.
pub(crate) fn rvar_interval(min: &ExprRef, extent: &ExprRef) -> Interval {
    Interval::new(
        simplify(min),
        simplify(&Expr::sub(Expr::add(min.clone(), extent.clone()), Expr::int(1))),
    )
}
