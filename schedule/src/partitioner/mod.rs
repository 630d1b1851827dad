//! Greedy fixpoint partitioner over fusion choices.
//!
//! Every stage starts in its own group. The partitioner then runs two
//! passes to a fixpoint: INLINE, which absorbs pure producers into their
//! consumers by expression substitution, and FAST_MEM, which merges a
//! producer into its sole consuming function at the granularity of a tile
//! sized for fast memory. Each step evaluates candidate merges with the
//! analytical cost model, takes the best non-negative one, and repeats
//! until no merge pays off.
//!
//! All search state lives in deterministic collections keyed by [`FStage`],
//! so two runs over the same pipeline produce the same schedule.

pub mod group;
pub mod tiling;

use std::collections::{BTreeMap, BTreeSet};

use mosaic_ir::bounds::{BBox, Interval};
use mosaic_ir::expr::Expr;
use mosaic_ir::func::Function;
use mosaic_ir::graph::{calls_in_definition, calls_in_function};

use crate::analysis::{rvar_interval, DependenceAnalysis, DimBounds, FStage};
use crate::cost::{Cost, CostModel};
use crate::target::MachineParams;

pub use group::{CachedBenefit, FusionChoice, Group, GroupAnalysis, Level, TileSizes};

pub struct Partitioner<'a> {
    pipeline_bounds: &'a BTreeMap<String, BBox>,
    arch: MachineParams,
    analysis: &'a DependenceAnalysis,
    cost_model: &'a CostModel,
    outputs: &'a [Function],

    groups: BTreeMap<FStage, Group>,
    group_costs: BTreeMap<FStage, GroupAnalysis>,
    /// Dependence edges between group keys: consumers of each group output.
    children: BTreeMap<FStage, BTreeSet<FStage>>,
    fusion_cache: BTreeMap<FusionChoice, CachedBenefit>,
    /// Functions absorbed by INLINE merges; these become `compute_inline`.
    inlined_functions: BTreeSet<String>,
}

impl<'a> Partitioner<'a> {
    pub fn new(
        pipeline_bounds: &'a BTreeMap<String, BBox>,
        arch: MachineParams,
        analysis: &'a DependenceAnalysis,
        cost_model: &'a CostModel,
        outputs: &'a [Function],
    ) -> Self {
        let mut part = Self {
            pipeline_bounds,
            arch,
            analysis,
            cost_model,
            outputs,
            groups: BTreeMap::new(),
            group_costs: BTreeMap::new(),
            children: BTreeMap::new(),
            fusion_cache: BTreeMap::new(),
            inlined_functions: BTreeSet::new(),
        };

        // One group per stage.
        for f in analysis.env().values() {
            for s in 0..f.num_stages() {
                let stg = FStage::new(f.clone(), s);
                part.groups.insert(stg.clone(), Group::new(stg.clone(), vec![stg]));
            }
        }

        // Consumers of each stage. Reading a function reads its final
        // state, so call edges always target the producer's last stage;
        // successive stages of one function are chained explicitly.
        for f in analysis.env().values() {
            for s in 0..f.num_stages() {
                let Ok(def) = f.definition(s) else { continue };
                let cons = FStage::new(f.clone(), s);
                for callee in calls_in_definition(&def) {
                    if callee == f.name() {
                        continue;
                    }
                    if let Some(prod_func) = analysis.env().get(&callee) {
                        let prod = FStage::last_stage(prod_func);
                        part.children.entry(prod).or_default().insert(cons.clone());
                    }
                }
                if s > 0 {
                    let prev = FStage::new(f.clone(), s - 1);
                    part.children.entry(prev).or_default().insert(cons.clone());
                }
            }
        }

        // Per-stage reuse along each dimension, against the stage's own
        // producer set.
        for f in analysis.env().values() {
            let producers = calls_in_function(f);
            for s in 0..f.num_stages() {
                let stg = FStage::new(f.clone(), s);
                let reuse = part.evaluate_reuse(&stg, &producers);
                tracing::debug!(stage = %stg, reuse = ?reuse, "stage reuse");
                if let Some(g) = part.groups.get_mut(&stg) {
                    g.reuse = reuse;
                }
            }
        }

        part
    }

    pub fn groups(&self) -> &BTreeMap<FStage, Group> {
        &self.groups
    }

    pub fn group_costs(&self) -> &BTreeMap<FStage, GroupAnalysis> {
        &self.group_costs
    }

    pub fn children(&self) -> &BTreeMap<FStage, BTreeSet<FStage>> {
        &self.children
    }

    /// Functions that will be scheduled as `compute_inline`.
    pub fn inlined_functions(&self) -> &BTreeSet<String> {
        &self.inlined_functions
    }

    pub fn arch(&self) -> &MachineParams {
        &self.arch
    }

    pub fn env(&self) -> &'a BTreeMap<String, Function> {
        self.analysis.env()
    }

    /// Full pipeline bounds of one stage: pure args from the pipeline
    /// bounds, reduction variables from their domains.
    pub fn get_bounds(&self, stg: &FStage) -> DimBounds {
        let mut bounds = DimBounds::new();
        let name = stg.name();
        let bx = self
            .pipeline_bounds
            .get(&name)
            .unwrap_or_else(|| panic!("no pipeline bounds for {name}"));
        for (arg, interval) in stg.func.args().into_iter().zip(bx.iter()) {
            bounds.insert(arg, interval.clone());
        }
        if let Ok(def) = stg.func.definition(stg.stage_num) {
            for rvar in def.schedule().rvars() {
                bounds.insert(rvar.var.clone(), rvar_interval(&rvar.min, &rvar.extent));
            }
        }
        bounds
    }

    /// Bounds of one tile. A dimension is tiled to `[0, size - 1]` only when
    /// its estimated extent fits at least two tiles; otherwise it keeps its
    /// full bound.
    pub fn get_bounds_from_tile_sizes(&self, stg: &FStage, tile_sizes: &TileSizes) -> DimBounds {
        let def_bounds = self.get_bounds(stg);
        let mut bounds = DimBounds::new();
        let Ok(def) = stg.func.definition(stg.stage_num) else {
            return bounds;
        };
        let dims = def.schedule().dims();
        for dim in &dims[..dims.len() - 1] {
            let Some(bound) = def_bounds.get(&dim.var) else { continue };
            let tiled = tile_sizes.get(&dim.var).copied().and_then(|size| {
                let extent = bound.extent()?;
                if extent >= 2 * size {
                    Some(Interval::new(Expr::int(0), Expr::int(size - 1)))
                } else {
                    None
                }
            });
            bounds.insert(dim.var.clone(), tiled.unwrap_or_else(|| bound.clone()));
        }
        bounds
    }

    /// Known extents of a stage's loop variables over the pipeline bounds.
    pub fn get_stage_estimates(&self, stg: &FStage) -> BTreeMap<String, i64> {
        self.get_bounds(stg)
            .into_iter()
            .filter_map(|(var, interval)| Some((var, interval.extent()?)))
            .collect()
    }

    /// Bytes of producer region shared between adjacent iterations of each
    /// dimension of `stg`, restricted to the given producer set. Evaluated
    /// with unit tiles on the pure dims, so the overlap of two adjacent
    /// points is measured directly.
    pub fn evaluate_reuse(&self, stg: &FStage, producers: &BTreeSet<String>) -> BTreeMap<String, Cost> {
        let mut reuse = BTreeMap::new();
        let Ok(def) = stg.func.definition(stg.stage_num) else {
            return reuse;
        };
        let pure_vars: BTreeSet<String> = stg.func.args().into_iter().collect();
        let dims = def.schedule().dims();

        let mut tile_sizes = TileSizes::new();
        for dim in &dims[..dims.len() - 1] {
            if pure_vars.contains(&dim.var) {
                tile_sizes.insert(dim.var.clone(), 1);
            }
        }

        let bounds = self.get_bounds_from_tile_sizes(stg, &tile_sizes);
        let overlaps = self.analysis.overlap_regions(&stg.func, stg.stage_num, &bounds);

        for (d, dim) in dims[..dims.len() - 1].iter().enumerate() {
            let mut total = Cost::ZERO;
            for (callee, region) in &overlaps[d] {
                if !producers.contains(callee) {
                    continue;
                }
                total += Cost::from_area(region.area());
            }
            reuse.insert(dim.var.clone(), total);
        }
        reuse
    }

    /// Analytical cost of one group: arithmetic, slow-memory traffic, and
    /// available tile parallelism.
    ///
    /// Loads are assumed to miss whenever the tile's intermediates overflow
    /// fast memory; intermediates are otherwise free. This is aggressive
    /// about the benefit of fusion but cheap to evaluate.
    pub fn analyze_group(&self, g: &Group) -> GroupAnalysis {
        let Ok(def) = g.output.func.definition(g.output.stage_num) else {
            return GroupAnalysis::UNKNOWN;
        };

        let group_mem = g.member_names();
        let mut group_inputs = BTreeSet::new();
        for stg in &g.members {
            let Ok(stg_def) = stg.func.definition(stg.stage_num) else { continue };
            for callee in calls_in_definition(&stg_def) {
                if !group_mem.contains(&callee) {
                    group_inputs.insert(callee);
                }
            }
        }

        // Tile count over the tiled pure dims.
        let stg_bounds = self.get_bounds(&g.output);
        let dims = def.schedule().dims();
        let mut estimate_tiles = Cost::Known(1);
        let mut per_tile_points = Cost::Known(1);
        for dim in &dims[..dims.len() - 1] {
            if let Some(&size) = g.tile_sizes.get(&dim.var) {
                match stg_bounds.get(&dim.var).and_then(Interval::extent) {
                    Some(extent) => {
                        let tiles = (extent + size - 1) / size;
                        estimate_tiles = estimate_tiles * Cost::Known(tiles.max(1));
                        per_tile_points = per_tile_points * Cost::Known(size);
                    }
                    None => estimate_tiles = Cost::Unknown,
                }
            }
        }
        tracing::trace!(group = %g.output, tiles = %estimate_tiles, points = %per_tile_points, "tile estimate");

        // Per-tile footprint of the whole pipeline slice feeding this
        // group, plus the output tile the group itself materializes.
        let tile_bounds = self.get_bounds_from_tile_sizes(&g.output, &g.tile_sizes);
        let mut footprint =
            self.analysis.regions_required_stage(&g.output.func, g.output.stage_num, &tile_bounds);
        let mut own_box = BBox::default();
        for arg in g.output.func.args() {
            match tile_bounds.get(&arg) {
                Some(interval) => own_box.push(interval.clone()),
                None => return GroupAnalysis::UNKNOWN,
            }
        }
        match footprint.get_mut(&g.output.name()) {
            Some(existing) => existing.merge(&own_box),
            None => {
                footprint.insert(g.output.name(), own_box);
            }
        }

        let mut group_reg = BTreeMap::new();
        let mut prod_reg = BTreeMap::new();
        let mut input_reg = BTreeMap::new();
        for (name, region) in footprint {
            if group_mem.contains(&name) {
                group_reg.insert(name, region);
            } else if group_inputs.contains(&name) {
                if self.analysis.env().contains_key(&name) {
                    prod_reg.insert(name, region);
                } else {
                    input_reg.insert(name, region);
                }
            }
        }

        let empty = BTreeSet::new();
        let tile_cost = self.cost_model.region_cost(&group_reg, &g.inlined);
        let tile_input_bytes = self.cost_model.region_size(&prod_reg, &empty)
            + self.cost_model.input_region_size(&input_reg);
        let tile_intermediate_bytes = self.cost_model.region_size(&group_reg, &g.inlined);

        let mut out_box = BBox::default();
        for arg in g.output.func.args() {
            match stg_bounds.get(&arg) {
                Some(interval) => out_box.push(interval.clone()),
                None => return GroupAnalysis::UNKNOWN,
            }
        }
        let out_cost = self.cost_model.stage_region_cost(
            &g.output.name(),
            g.output.stage_num,
            &out_box,
            &g.inlined,
        );

        let known = tile_cost.is_known()
            && tile_input_bytes.is_known()
            && tile_intermediate_bytes.is_known()
            && out_cost.is_known()
            && estimate_tiles.is_known();
        if !known {
            return GroupAnalysis::UNKNOWN;
        }

        let mut per_tile_mem = tile_input_bytes;
        let overflows = tile_intermediate_bytes
            .known()
            .is_some_and(|bytes| bytes as u64 > self.arch.fast_mem_size);
        if overflows {
            per_tile_mem += tile_cost.bytes;
        }

        GroupAnalysis {
            arith_cost: tile_cost.arith * estimate_tiles + out_cost.arith,
            mem_cost: per_tile_mem * estimate_tiles,
            parallelism: estimate_tiles,
        }
    }

    /// The combined cost a fusion decision optimizes: arithmetic plus
    /// memory traffic weighted by the machine's balance parameter.
    fn balanced_total(&self, analysis: &GroupAnalysis) -> Cost {
        analysis.arith_cost + Cost::Known(i64::from(self.arch.balance)) * analysis.mem_cost
    }

    /// Union of two groups, surviving output and inlined marks included.
    fn fuse_groups(prod: &Group, cons: &Group) -> Group {
        let mut fused = Group::new(
            cons.output.clone(),
            prod.members.iter().chain(cons.members.iter()).cloned().collect(),
        );
        fused.inlined = prod.inlined.union(&cons.inlined).cloned().collect();
        fused
    }

    fn prod_stage_groups(&self, prod: &str) -> Vec<Group> {
        let prod_f = &self.analysis.env()[prod];
        (0..prod_f.num_stages())
            .map(|s| {
                let key = FStage::new(prod_f.clone(), s);
                self.groups
                    .get(&key)
                    .unwrap_or_else(|| panic!("no group for producer stage {key}"))
                    .clone()
            })
            .collect()
    }

    /// Benefit of inlining `choice.prod` into the consumer group, measured
    /// by synthesizing the fused group with per-point tiles (size 1 on every
    /// pure dim of the consumer) and comparing balanced totals.
    pub fn evaluate_inline_choice(&self, choice: &FusionChoice) -> Cost {
        let prod_groups = self.prod_stage_groups(&choice.prod);
        let Some(cons) = self.groups.get(&choice.cons) else {
            return Cost::Unknown;
        };

        let mut fused = cons.clone();
        for prod_g in &prod_groups {
            fused = Self::fuse_groups(prod_g, &fused);
        }

        let mut tile_sizes = TileSizes::new();
        if let Ok(def) = cons.output.func.definition(cons.output.stage_num) {
            let pure_vars: BTreeSet<String> = cons.output.func.args().into_iter().collect();
            let dims = def.schedule().dims();
            for dim in &dims[..dims.len() - 1] {
                if pure_vars.contains(&dim.var) {
                    tile_sizes.insert(dim.var.clone(), 1);
                }
            }
        }
        fused.tile_sizes = tile_sizes;
        for prod_g in &prod_groups {
            for member in &prod_g.members {
                fused.inlined.insert(member.name());
            }
        }

        let mut unfused_total = Cost::ZERO;
        for prod_g in &prod_groups {
            unfused_total += self.balanced_total(&self.analyze_group(prod_g));
        }
        unfused_total += self.balanced_total(&self.analyze_group(cons));
        let fused_total = self.balanced_total(&self.analyze_group(&fused));

        let benefit = unfused_total - fused_total;
        tracing::debug!(choice = %choice, benefit = %benefit, "inline choice");
        benefit
    }

    /// Benefit of fusing `choice.prod` into the consumer group at tile
    /// granularity. Picks the best tile configuration for the synthesized
    /// fused group and records it on the choice.
    pub fn evaluate_fast_mem_choice(&self, choice: &mut FusionChoice) -> Cost {
        let prod_groups = self.prod_stage_groups(&choice.prod);
        let Some(cons) = self.groups.get(&choice.cons) else {
            return Cost::Unknown;
        };

        let mut fused = cons.clone();
        for prod_g in &prod_groups {
            fused = Self::fuse_groups(prod_g, &fused);
        }
        // Fused at the consumer's granularity: the producer's cost is
        // charged inside the consumers, its members stay materialized.
        fused.inlined.insert(choice.prod.clone());

        let (tile_sizes, fused_analysis) = self.find_best_tile_config(&fused);
        choice.tile_sizes = tile_sizes;

        let mut unfused_total = Cost::ZERO;
        for prod_g in &prod_groups {
            unfused_total += self.balanced_total(&self.analyze_group(prod_g));
        }
        unfused_total += self.balanced_total(&self.analyze_group(cons));
        let fused_total = self.balanced_total(&fused_analysis);

        let benefit = unfused_total - fused_total;
        tracing::debug!(choice = %choice, benefit = %benefit, "fast-mem choice");
        benefit
    }

    /// Aggregate inline benefit over every consumer of each candidate
    /// producer. Conservative: one unprofitable consumer disqualifies the
    /// candidate entirely.
    pub(crate) fn choose_candidate_fuse_inline(
        &mut self,
        cands: &[String],
    ) -> (Vec<FusionChoice>, Cost) {
        let mut best = (Vec::new(), Cost::Unknown);
        for prod_name in cands {
            let prod_f = &self.analysis.env()[prod_name];
            let prod = FStage::last_stage(prod_f);
            let Some(consumers) = self.children.get(&prod).cloned() else {
                continue;
            };

            let mut overall = Cost::ZERO;
            let mut choices = Vec::new();
            for cons in consumers {
                let cand = FusionChoice::new(prod_name.clone(), cons);
                let benefit = match self.fusion_cache.get(&cand) {
                    Some(cached) => cached.benefit,
                    None => {
                        let benefit = self.evaluate_inline_choice(&cand);
                        self.fusion_cache.insert(
                            cand.clone(),
                            CachedBenefit { benefit, tile_sizes: TileSizes::new() },
                        );
                        benefit
                    }
                };
                match benefit.known() {
                    Some(b) if b >= 0 => {
                        overall = overall + benefit;
                        choices.push(cand);
                    }
                    _ => {
                        overall = Cost::Unknown;
                        choices.clear();
                        break;
                    }
                }
            }

            if best.1 < overall {
                best = (choices, overall);
            }
        }
        best
    }

    /// Best single fast-mem merge among the candidate producer/consumer
    /// pairs.
    pub(crate) fn choose_candidate_fuse_fast_mem(
        &mut self,
        cands: &[(String, String)],
    ) -> Option<(FusionChoice, Cost)> {
        let mut best: Option<(FusionChoice, Cost)> = None;
        for (prod_name, cons_fn) in cands {
            let prod_f = &self.analysis.env()[prod_name];
            let prod = FStage::last_stage(prod_f);
            let Some(consumers) = self.children.get(&prod) else {
                continue;
            };
            let keys: Vec<FStage> =
                consumers.iter().filter(|s| s.name() == *cons_fn).cloned().collect();
            // The consuming function's stages must already share one group;
            // merging into one of several would strand the others' edges.
            if keys.len() != 1 {
                continue;
            }

            let mut cand = FusionChoice::new(prod_name.clone(), keys.into_iter().next().unwrap());
            let benefit = match self.fusion_cache.get(&cand) {
                Some(cached) => {
                    cand.tile_sizes = cached.tile_sizes.clone();
                    cached.benefit
                }
                None => {
                    let benefit = self.evaluate_fast_mem_choice(&mut cand);
                    self.fusion_cache.insert(
                        cand.clone(),
                        CachedBenefit { benefit, tile_sizes: cand.tile_sizes.clone() },
                    );
                    benefit
                }
            };

            let better = match &best {
                Some((_, best_benefit)) => *best_benefit < benefit,
                None => true,
            };
            if better {
                best = Some((cand, benefit));
            }
        }
        best
    }

    /// Current fusion-cache keys, for invariant checks.
    #[cfg(test)]
    pub(crate) fn fusion_cache_keys(&self) -> Vec<FusionChoice> {
        self.fusion_cache.keys().cloned().collect()
    }

    /// Remove every cache entry that refers to the absorbed producer or to
    /// a consumer group touched by a merge.
    fn invalidate_cache(&mut self, absorbed: &str, cons_keys: &[FStage]) {
        self.fusion_cache.retain(|key, _| {
            !(key.prod == absorbed
                || key.cons.name() == absorbed
                || cons_keys.iter().any(|c| *c == key.cons || key.prod == c.name()))
        });
    }

    /// Apply a FAST_MEM merge: splice every stage of the producer into the
    /// consumer group, mark the producer inlined for cost purposes, install
    /// the chosen tile sizes, rewire edges, and invalidate the cache.
    pub fn merge_groups(&mut self, choice: &FusionChoice) {
        let prod_f = self.analysis.env()[&choice.prod].clone();
        let cons_key = choice.cons.clone();

        for s in 0..prod_f.num_stages() {
            let cand_key = FStage::new(prod_f.clone(), s);
            let cand_group = self
                .groups
                .remove(&cand_key)
                .unwrap_or_else(|| panic!("merge of dissolved group {cand_key}"));
            let cons_group = self
                .groups
                .get_mut(&cons_key)
                .unwrap_or_else(|| panic!("merge into dissolved group {cons_key}"));
            cons_group.members.extend(cand_group.members);
            cons_group.inlined.insert(choice.prod.clone());

            self.children.remove(&cand_key);
            for consumers in self.children.values_mut() {
                if consumers.remove(&cand_key) {
                    consumers.insert(cons_key.clone());
                }
            }
        }

        if let Some(cons_group) = self.groups.get_mut(&cons_key) {
            cons_group.tile_sizes = choice.tile_sizes.clone();
        }

        self.invalidate_cache(&choice.prod, std::slice::from_ref(&cons_key));
    }

    /// Apply an INLINE merge: splice every stage of the producer into every
    /// consumer group of its final stage and mark the spliced functions
    /// inlined, both in the groups and globally for schedule emission.
    ///
    /// Applying the same producer twice is a no-op, so one call per
    /// consumer choice is safe.
    pub fn merge_groups_inline(&mut self, choice: &FusionChoice) {
        let prod_f = self.analysis.env()[&choice.prod].clone();
        let final_stage = FStage::last_stage(&prod_f);
        let cons_keys: Vec<FStage> = self
            .children
            .get(&final_stage)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        self.invalidate_cache(&choice.prod, &cons_keys);

        for s in 0..prod_f.num_stages() {
            let cand_key = FStage::new(prod_f.clone(), s);
            let Some(cand_group) = self.groups.remove(&cand_key) else {
                continue;
            };
            for cons_key in &cons_keys {
                let cons_group = self
                    .groups
                    .get_mut(cons_key)
                    .unwrap_or_else(|| panic!("inline into dissolved group {cons_key}"));
                cons_group.members.extend(cand_group.members.iter().cloned());
                for member in &cand_group.members {
                    cons_group.inlined.insert(member.name());
                }
            }
            for member in &cand_group.members {
                self.inlined_functions.insert(member.name());
            }

            self.children.remove(&cand_key);
            for consumers in self.children.values_mut() {
                if consumers.remove(&cand_key) {
                    consumers.extend(cons_keys.iter().cloned());
                }
            }
        }
    }

    /// Choose an initial tile configuration and cost for every group.
    pub fn initialize_groups_inline(&mut self) {
        let keys: Vec<FStage> = self.groups.keys().cloned().collect();
        for key in keys {
            let g = self.groups[&key].clone();
            let (config, analysis) = self.find_best_tile_config(&g);
            if let Some(g) = self.groups.get_mut(&key) {
                g.tile_sizes = config;
            }
            self.group_costs.insert(key, analysis);
        }
        self.log_pipeline_costs();
    }

    /// Merge groups at the given level until a full pass finds no
    /// profitable merge.
    pub fn group(&mut self, level: Level) {
        // Cached benefits are per level; an INLINE entry must not answer a
        // FAST_MEM query for the same producer/consumer pair.
        self.fusion_cache.clear();
        loop {
            let mut inline_cands: Vec<String> = Vec::new();
            let mut fast_mem_cands: Vec<(String, String)> = Vec::new();

            for stg in self.groups.keys() {
                let name = stg.name();
                // Outputs stay where they are, and only a function's final
                // stage represents it as a fusion candidate.
                if self.outputs.iter().any(|out| out.name() == name) {
                    continue;
                }
                if !stg.is_last_stage() {
                    continue;
                }
                let Some(consumers) = self.children.get(stg) else {
                    continue;
                };
                if consumers.is_empty() {
                    continue;
                }

                let child_funcs: BTreeSet<String> = consumers.iter().map(FStage::name).collect();
                // Reduction producers are never fused: INLINE cannot
                // substitute them, and tiling them beneath a consumer
                // re-runs the whole reduction per tile.
                if !self.analysis.env()[&name].is_pure() {
                    continue;
                }
                match level {
                    Level::FastMem => {
                        // A tiled merge needs a single consuming function;
                        // members cannot be computed at two locations.
                        if child_funcs.len() == 1 {
                            let cons = child_funcs.into_iter().next().unwrap();
                            fast_mem_cands.push((name, cons));
                        }
                    }
                    Level::Inline => inline_cands.push(name),
                }
            }

            let merged = match level {
                Level::Inline => {
                    tracing::debug!(candidates = ?inline_cands, "inline grouping pass");
                    let (choices, benefit) = self.choose_candidate_fuse_inline(&inline_cands);
                    if benefit.is_known() && !choices.is_empty() {
                        let prod = choices[0].prod.clone();
                        debug_assert!(choices.iter().all(|c| c.prod == prod));
                        for choice in &choices {
                            self.merge_groups_inline(choice);
                        }
                        true
                    } else {
                        false
                    }
                }
                Level::FastMem => {
                    tracing::debug!(candidates = ?fast_mem_cands, "fast-mem grouping pass");
                    match self.choose_candidate_fuse_fast_mem(&fast_mem_cands) {
                        Some((choice, benefit)) if benefit.known().is_some_and(|b| b >= 0) => {
                            self.merge_groups(&choice);
                            true
                        }
                        _ => false,
                    }
                }
            };
            if !merged {
                break;
            }
        }
        self.log_pipeline_costs();
    }

    fn log_pipeline_costs(&self) {
        let mut total_arith = Cost::ZERO;
        let mut total_mem = Cost::ZERO;
        for (stg, g) in &self.groups {
            let analysis = self.analyze_group(g);
            total_arith += analysis.arith_cost;
            total_mem += analysis.mem_cost;
            tracing::debug!(
                group = %stg,
                arith = %analysis.arith_cost,
                mem = %analysis.mem_cost,
                parallelism = %analysis.parallelism,
                "group cost"
            );
        }
        tracing::debug!(arith = %total_arith, mem = %total_mem, "pipeline cost");
    }
}
