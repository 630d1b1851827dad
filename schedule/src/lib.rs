//! Auto-scheduler for mosaic pipelines.
//!
//! Given the output functions of a pipeline and a machine description,
//! [`generate_schedules`] decides, per stage, what it is fused with,
//! whether it is inlined or materialized at tile granularity, its tile
//! sizes, loop order, vectorized dimension, and parallelized outer loops,
//! then applies those decisions through the host's schedule handles.
//!
//! # Module Organization
//!
//! - [`cost`] - Per-point expression costs and the region cost model
//! - [`analysis`] - Dependence analysis: required regions and tile overlap
//! - [`partitioner`] - Greedy fixpoint search over fusion choices
//! - [`emitter`] - Lowering of grouping decisions to schedule directives
//! - [`target`] - Machine parameters
//!
//! The search is single-threaded and in-process; all mutable state lives in
//! the [`Partitioner`]. Deterministic collections keyed by stage identity
//! make two runs over the same pipeline produce the same schedule.

pub mod analysis;
pub mod cost;
pub mod emitter;
pub mod error;
pub mod partitioner;
pub mod target;

#[cfg(test)]
pub mod test;

use std::collections::BTreeMap;

use mosaic_ir::bounds::compute_function_value_bounds;
use mosaic_ir::func::Function;
use mosaic_ir::graph::{find_transitive_calls, realization_order};

pub use analysis::{DependenceAnalysis, DimBounds, FStage};
pub use cost::{expr_cost, Cost, CostModel, CostPair, CostVisitor};
pub use emitter::ScheduleEmitter;
pub use error::{Error, Result};
pub use partitioner::{FusionChoice, Group, GroupAnalysis, Level, Partitioner, TileSizes};
pub use target::{MachineParams, Target};

/// Auto-schedule a pipeline.
///
/// Validates the output estimates, infers pipeline bounds, runs the INLINE
/// and FAST_MEM grouping passes, and emits the schedule. Returns the
/// textual schedule record; the directives have also been applied to the
/// supplied function handles.
pub fn generate_schedules(outputs: &[Function], target: &Target) -> Result<String> {
    let mut env = BTreeMap::new();
    for out in outputs {
        env.extend(find_transitive_calls(out));
    }
    let order = realization_order(outputs, &env);
    tracing::debug!(order = ?order, "realization order");

    check_estimates_on_outputs(outputs)?;

    let func_val_bounds = compute_function_value_bounds(&order, &env);
    let analysis = DependenceAnalysis::new(env.clone(), func_val_bounds);

    let pipeline_bounds = analysis.get_pipeline_bounds(outputs);
    for (func, bx) in &pipeline_bounds {
        tracing::debug!(func = %func, bounds = ?bx, "pipeline bounds");
    }

    let cost_model = CostModel::new(&env);
    let mut part =
        Partitioner::new(&pipeline_bounds, target.params, &analysis, &cost_model, outputs);

    part.initialize_groups_inline();
    part.group(Level::Inline);
    part.group(Level::FastMem);

    let sched = ScheduleEmitter::new(&part, *target).generate()?;
    tracing::debug!(schedule = %sched, "generated schedule");
    Ok(sched)
}

/// Every output dimension must carry a literal estimate; scheduling cannot
/// start without them.
fn check_estimates_on_outputs(outputs: &[Function]) -> Result<()> {
    use crate::error::{
        MissingEstimateSnafu, NonLiteralEstimateSnafu, UnknownEstimateDimensionSnafu,
    };

    for out in outputs {
        let estimates = out.estimates();
        let args = out.args();
        for est in &estimates {
            snafu::ensure!(
                args.contains(&est.var),
                UnknownEstimateDimensionSnafu { func: out.name(), var: est.var.clone() }
            );
        }
        for arg in &args {
            let est = estimates.iter().find(|e| e.var == *arg).ok_or_else(|| {
                MissingEstimateSnafu { func: out.name(), var: arg.clone() }.build()
            })?;
            snafu::ensure!(
                est.min.as_int().is_some() && est.extent.as_int().is_some(),
                NonLiteralEstimateSnafu { func: out.name(), var: arg.clone() }
            );
        }
    }
    Ok(())
}
