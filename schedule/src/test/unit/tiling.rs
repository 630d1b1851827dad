use crate::analysis::FStage;
use crate::partitioner::TileSizes;
use crate::test::helpers::{blur_pipeline, pointwise_pipeline, reduction_pipeline, setup};

#[test]
fn two_dim_grid_has_skewed_then_square_configs() {
    let f = pointwise_pipeline();
    let s = setup(&[f.clone()]);
    let part = s.partitioner();

    let configs = part.generate_tile_configs(&FStage::new(f, 0));
    // 8 sizes x 2 skew positions, then 8 squares.
    assert_eq!(configs.len(), 24);

    // Skew position 0 holds everything at the largest variant.
    assert_eq!(configs[0], TileSizes::from([("x".into(), 256), ("y".into(), 256)]));
    // Skew position 1 sweeps the innermost dim, clamped up to 64.
    assert_eq!(configs[8], TileSizes::from([("x".into(), 64), ("y".into(), 256)]));
    assert_eq!(configs[15], TileSizes::from([("x".into(), 256), ("y".into(), 256)]));
    // Squares come last, with the innermost dim clamped the same way.
    assert_eq!(configs[16], TileSizes::from([("x".into(), 64), ("y".into(), 1)]));
    assert_eq!(configs[23], TileSizes::from([("x".into(), 256), ("y".into(), 256)]));
}

#[test]
fn reduction_vars_are_not_tile_vars() {
    let (r, out) = reduction_pipeline();
    let s = setup(&[out]);
    let part = s.partitioner();

    // Only the pure x participates; rv never appears in a config.
    for config in part.generate_tile_configs(&FStage::new(r, 1)) {
        assert!(config.contains_key("x"));
        assert!(!config.contains_key("rv"));
    }
}

#[test]
fn tiny_extents_are_left_untiled_in_tile_bounds() {
    let f = pointwise_pipeline();
    let s = setup(&[f.clone()]);
    let part = s.partitioner();
    let stg = FStage::new(f, 0);

    // 1024 >= 2 * 256: tiled to [0, 255].
    let bounds =
        part.get_bounds_from_tile_sizes(&stg, &TileSizes::from([("x".into(), 256)]));
    assert_eq!(bounds["x"].extent(), Some(256));
    assert_eq!(bounds["y"].extent(), Some(1024));

    // 1024 < 2 * 600: the dimension keeps its full bound.
    let bounds =
        part.get_bounds_from_tile_sizes(&stg, &TileSizes::from([("x".into(), 600)]));
    assert_eq!(bounds["x"].extent(), Some(1024));
}

#[test]
fn best_config_trades_nothing_on_arith_for_strictly_less_memory() {
    let (_, blur_y) = blur_pipeline();
    let s = setup(&[blur_y.clone()]);
    let part = s.partitioner();

    let g = &part.groups()[&FStage::new(blur_y, 0)];
    let untiled = part.analyze_group(g);
    let (config, best) = part.find_best_tile_config(g);

    assert!(!config.is_empty());
    assert!(best.arith_cost <= untiled.arith_cost);
    assert!(best.mem_cost < untiled.mem_cost);
}

#[test]
fn unanalyzable_groups_keep_the_no_tile_config() {
    use mosaic_dtype::DType;
    use mosaic_ir::expr::Expr;
    use mosaic_ir::Function;

    // No estimates: every extent is symbolic and no configuration can be
    // analyzed.
    let f = Function::new("f", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::image("input", DType::Float32, vec![Expr::var("x")])]).unwrap();

    let s = setup(&[f.clone()]);
    let part = s.partitioner();
    let g = &part.groups()[&FStage::new(f, 0)];

    let (config, analysis) = part.find_best_tile_config(g);
    assert!(config.is_empty());
    assert!(!analysis.is_known());
}
