//! Tile configuration generation and selection.

use std::collections::BTreeSet;

use crate::analysis::FStage;
use crate::partitioner::group::{Group, GroupAnalysis, TileSizes};
use crate::partitioner::Partitioner;

/// Candidate tile edge lengths, in extent units.
const SIZE_VARIANTS: [i64; 8] = [1, 4, 8, 16, 32, 64, 128, 256];

impl Partitioner<'_> {
    /// Canonical tile configurations for a stage, over its pure tile
    /// variables in dim order.
    ///
    /// Skewed configurations hold the outer dims at the largest variant and
    /// sweep the inner ones; square configurations use one size everywhere.
    /// The innermost dim is clamped up to 64 so vectorized loads always have
    /// room. The traversal order is deterministic: skewed before square,
    /// innermost-varying first.
    pub fn generate_tile_configs(&self, stg: &FStage) -> Vec<TileSizes> {
        let Ok(def) = stg.func.definition(stg.stage_num) else {
            return Vec::new();
        };
        let pure_vars: BTreeSet<String> = stg.func.args().into_iter().collect();
        let dims = def.schedule().dims();
        let tile_vars: Vec<String> = dims[..dims.len() - 1]
            .iter()
            .filter(|d| pure_vars.contains(&d.var))
            .map(|d| d.var.clone())
            .collect();

        let largest = SIZE_VARIANTS[SIZE_VARIANTS.len() - 1];
        let mut configs = Vec::new();

        for i in 0..tile_vars.len() {
            for &size in &SIZE_VARIANTS {
                let mut tiling = TileSizes::new();
                for (j, var) in tile_vars.iter().enumerate() {
                    let dim_size = if j < i {
                        if j == 0 {
                            size.max(64)
                        } else {
                            size
                        }
                    } else {
                        largest
                    };
                    tiling.insert(var.clone(), dim_size);
                }
                configs.push(tiling);
            }
        }

        for &size in &SIZE_VARIANTS {
            let mut tiling = TileSizes::new();
            for (j, var) in tile_vars.iter().enumerate() {
                tiling.insert(var.clone(), if j == 0 { size.max(64) } else { size });
            }
            configs.push(tiling);
        }

        configs
    }

    /// Search the configuration grid for the tiling of `g` that keeps the
    /// arithmetic cost from growing while strictly shrinking the memory
    /// cost, starting from no tiling at all.
    ///
    /// Ties keep the first-encountered configuration, so the result is
    /// deterministic. When every configuration is unanalyzable the no-tile
    /// configuration is returned with its (possibly unknown) analysis.
    pub fn find_best_tile_config(&self, g: &Group) -> (TileSizes, GroupAnalysis) {
        let mut no_tile = g.clone();
        no_tile.tile_sizes = TileSizes::new();

        let mut best_config = TileSizes::new();
        let mut best_analysis = self.analyze_group(&no_tile);
        if !best_analysis.arith_cost.is_known() {
            return (best_config, best_analysis);
        }

        for config in self.generate_tile_configs(&g.output) {
            let mut candidate = g.clone();
            candidate.tile_sizes = config.clone();
            let analysis = self.analyze_group(&candidate);
            if analysis.arith_cost.is_known()
                && analysis.mem_cost.is_known()
                && analysis.arith_cost <= best_analysis.arith_cost
                && analysis.mem_cost < best_analysis.mem_cost
            {
                best_config = config;
                best_analysis = analysis;
            }
        }

        (best_config, best_analysis)
    }
}
