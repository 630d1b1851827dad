//! Schedule emission.
//!
//! Walks the finalized groups and turns each grouping decision into
//! concrete schedule directives: `compute_inline` for functions absorbed by
//! INLINE merges, then per group a `compute_root` anchor, tile splits,
//! a reorder, vectorization of the innermost pure dimension, and enough
//! outer-loop parallelism to saturate the machine. Directives are applied
//! to the host's function handles and mirrored into a textual record.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use mosaic_ir::func::{can_parallelize_rvar, Function, OUTERMOST};

use crate::error::Result;
use crate::partitioner::{Group, Partitioner};
use crate::target::Target;

/// One loop of the schedule under construction, tracked through splits.
struct LoopVar {
    /// Current variable name, after any splits.
    var: String,
    /// The pre-split dimension this loop descends from; parallelizability
    /// of a reduction loop is a property of the original variable.
    origin: String,
    is_rvar: bool,
}

pub struct ScheduleEmitter<'a, 'b> {
    part: &'a Partitioner<'b>,
    target: Target,
}

impl<'a, 'b> ScheduleEmitter<'a, 'b> {
    pub fn new(part: &'a Partitioner<'b>, target: Target) -> Self {
        Self { part, target }
    }

    /// Emit the whole schedule: inlined functions first, then every group
    /// in stage order. Returns the textual record; the directives have been
    /// applied to the function handles as a side effect.
    pub fn generate(&self) -> Result<String> {
        let mut sched = String::new();

        for name in self.part.inlined_functions() {
            if let Some(f) = self.part.env().get(name) {
                f.compute_inline();
                sched.push_str(&format!("{name}.compute_inline();\n"));
            }
        }

        for g in self.part.groups().values() {
            sched.push_str(&self.schedule_group(g)?);
        }
        Ok(sched)
    }

    fn schedule_group(&self, g: &Group) -> Result<String> {
        let mut sched = String::new();
        let out_func: &Function = &g.output.func;
        let stage_num = g.output.stage_num;
        let handle = out_func.stage(stage_num);
        let label = handle.label();

        if stage_num == 0 {
            out_func.compute_root();
            sched.push_str(&format!("{label}.compute_root();\n"));
        }

        let def = out_func.definition(stage_num)?;
        let dims = def.schedule().dims().to_vec();
        let pure_vars: BTreeSet<String> = out_func.args().into_iter().collect();
        let prefix = format!("{}_{}", out_func.name(), stage_num);

        let mut estimates = self.part.get_stage_estimates(&g.output);

        // Tiling exists to hold a fused group's working set in fast memory.
        // A group whose only other members are functionally inlined has no
        // working set to hold, and a group that never absorbed anything
        // keeps its natural loops; their tile configurations only steered
        // the search.
        let materialized_members = g
            .member_names()
            .iter()
            .filter(|name| !self.part.inlined_functions().contains(*name))
            .count();
        let fused_group = materialized_members > 1;

        // Realize the tiling. Tiled dims contribute an inner and an outer
        // loop; a tile size of one keeps the dim as an outer; untiled dims
        // stay inner.
        let mut inner_loops: Vec<LoopVar> = Vec::new();
        let mut outer_loops: Vec<LoopVar> = Vec::new();
        let mut current_inner: BTreeMap<String, String> = BTreeMap::new();

        for dim in dims.iter().filter(|d| d.var != OUTERMOST) {
            let var = dim.var.clone();
            let is_rvar = !pure_vars.contains(&var);
            let tile_size = if fused_group { g.tile_sizes.get(&var).copied() } else { None };
            match tile_size {
                Some(t) if t > 1 => {
                    let inner = format!("{prefix}_{var}_i");
                    let outer = format!("{prefix}_{var}_o");
                    handle.split(&var, &outer, &inner, t)?;
                    sched.push_str(&format!("{label}.split({var}, {outer}, {inner}, {t});\n"));

                    if let Some(old) = estimates.remove(&var) {
                        estimates.insert(outer.clone(), (old + t - 1) / t);
                    }
                    estimates.insert(inner.clone(), t);

                    current_inner.insert(var.clone(), inner.clone());
                    inner_loops.push(LoopVar { var: inner, origin: var.clone(), is_rvar });
                    outer_loops.push(LoopVar { var: outer, origin: var, is_rvar });
                }
                Some(_) => {
                    current_inner.insert(var.clone(), var.clone());
                    outer_loops.push(LoopVar { var: var.clone(), origin: var, is_rvar });
                }
                None => {
                    current_inner.insert(var.clone(), var.clone());
                    inner_loops.push(LoopVar { var: var.clone(), origin: var, is_rvar });
                }
            }
        }

        if !outer_loops.is_empty() {
            let ordering: Vec<String> = inner_loops
                .iter()
                .chain(outer_loops.iter())
                .map(|lv| lv.var.clone())
                .collect();
            handle.reorder(&ordering)?;
            sched.push_str(&format!("{label}.reorder({});\n", ordering.iter().join(", ")));
        }

        // Vectorize the innermost pure dimension, in whatever form tiling
        // left it: the inner tile half when the dim was split, the dim
        // itself otherwise.
        let vec_candidate = dims
            .iter()
            .filter(|d| d.var != OUTERMOST)
            .find(|d| pure_vars.contains(&d.var))
            .and_then(|d| current_inner.get(&d.var).cloned());

        if let Some(cand) = vec_candidate {
            let vec_len = out_func
                .output_types()
                .iter()
                .map(|t| self.target.natural_vector_size(*t))
                .max()
                .unwrap_or(1);
            if estimates.get(&cand).copied().is_some_and(|est| est >= vec_len) {
                let vi = format!("{cand}_vi");
                let vo = format!("{cand}_vo");
                handle.split(&cand, &vo, &vi, vec_len)?;
                sched.push_str(&format!("{label}.split({cand}, {vo}, {vi}, {vec_len});\n"));
                handle.vectorize(&vi)?;
                sched.push_str(&format!("{label}.vectorize({vi});\n"));

                if let Some(old) = estimates.remove(&cand) {
                    estimates.insert(vo.clone(), (old + vec_len - 1) / vec_len);
                }
                estimates.insert(vi, vec_len);

                // The vectorized half leaves the loop pool; its remainder
                // takes the candidate's place.
                for lv in inner_loops.iter_mut().chain(outer_loops.iter_mut()) {
                    if lv.var == cand {
                        lv.var = vo.clone();
                    }
                }
            }
        }

        // Parallelize outermost-in until the machine is saturated, skipping
        // reduction loops that cannot be parallelized safely.
        let parallelism = i64::from(self.part.arch().parallelism);
        let mut def_par: i64 = 1;
        for lv in outer_loops.iter().rev().chain(inner_loops.iter().rev()) {
            if def_par > parallelism {
                break;
            }
            if lv.is_rvar && !can_parallelize_rvar(&lv.origin, &out_func.name(), &def) {
                continue;
            }
            match estimates.get(&lv.var).copied() {
                Some(est) => {
                    handle.parallel(&lv.var)?;
                    sched.push_str(&format!("{label}.parallel({});\n", lv.var));
                    def_par = def_par.saturating_mul(est.max(1));
                }
                None => break,
            }
        }
        if def_par < parallelism {
            tracing::warn!(
                stage = %label,
                achieved = def_par,
                target = parallelism,
                "insufficient parallelism"
            );
        }

        Ok(sched)
    }
}
