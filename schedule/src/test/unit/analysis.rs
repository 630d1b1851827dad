use mosaic_dtype::DType;
use mosaic_ir::expr::Expr;
use mosaic_ir::func::Function;

use crate::analysis::DimBounds;
use crate::test::helpers::{blur_pipeline, producer_consumer_pipeline, reduction_pipeline, setup, x};

fn lit_bounds(vars: &[(&str, i64, i64)]) -> DimBounds {
    vars.iter()
        .map(|(v, lo, hi)| {
            ((*v).to_string(), mosaic_ir::Interval::new(Expr::int(*lo), Expr::int(*hi)))
        })
        .collect()
}

fn endpoints(bx: &mosaic_ir::BBox, dim: usize) -> (Option<i64>, Option<i64>) {
    (bx.0[dim].min.as_int(), bx.0[dim].max.as_int())
}

#[test]
fn stage_bounds_overlay_reduction_domains() {
    let (r, out) = reduction_pipeline();
    let s = setup(&[out]);

    let pure = lit_bounds(&[("x", 0, 1023)]);
    let bounds = s.analysis.get_stage_bounds(&r, 1, &pure);
    assert_eq!(bounds["x"].extent(), Some(1024));
    assert_eq!(bounds["rv"].extent(), Some(64));

    // The pure stage has no reduction variables to add.
    let bounds = s.analysis.get_stage_bounds(&r, 0, &pure);
    assert!(!bounds.contains_key("rv"));
}

#[test]
fn stencil_regions_grow_by_the_halo() {
    let (blur_x, blur_y) = blur_pipeline();
    let s = setup(&[blur_y.clone()]);

    let bounds = lit_bounds(&[("x", 0, 63), ("y", 0, 63)]);
    let regions = s.analysis.regions_required_stage(&blur_y, 0, &bounds);

    // blur_y reads blur_x one row up and down.
    let bx = &regions[&blur_x.name()];
    assert_eq!(endpoints(bx, 0), (Some(0), Some(63)));
    assert_eq!(endpoints(bx, 1), (Some(-1), Some(64)));

    // input inherits blur_x's column halo on top of that.
    let input = &regions["input"];
    assert_eq!(endpoints(input, 0), (Some(-1), Some(64)));
    assert_eq!(endpoints(input, 1), (Some(-1), Some(64)));
}

#[test]
fn unresolved_endpoints_fall_back_to_estimates() {
    // g is indexed at x + shift, where shift is a free symbol: the region
    // endpoints cannot resolve, so g's own estimates stand in.
    let g = Function::new("g", &["x"], vec![DType::Float32]);
    g.define(vec![Expr::image("input", DType::Float32, vec![x()])]).unwrap();
    g.set_estimate("x", 0, 512);

    let h = Function::new("h", &["x"], vec![DType::Float32]);
    h.define(vec![g.call(vec![Expr::add(x(), Expr::var("shift"))])]).unwrap();
    h.set_estimate("x", 0, 512);

    let s = setup(&[h.clone()]);
    let regions = s.analysis.regions_required_stage(&h, 0, &lit_bounds(&[("x", 0, 511)]));
    assert_eq!(endpoints(&regions[&g.name()], 0), (Some(0), Some(511)));
}

#[test]
fn redundant_regions_measure_adjacent_tile_overlap() {
    let (p, c) = producer_consumer_pipeline();
    let s = setup(&[c.clone()]);

    // A one-point tile of c reads p over [x, x+1]; the next tile starts
    // one over, so exactly one point of p is shared.
    let bounds = lit_bounds(&[("x", 0, 0)]);
    let overlaps = s.analysis.redundant_regions(&c, 0, "x", &bounds);
    assert_eq!(overlaps[&p.name()].area(), Some(1));
}

#[test]
fn exact_cover_has_no_overlap() {
    // q(x) = p2(x): the producer footprint shifts exactly with the tile,
    // so adjacent tiles share nothing.
    let p2 = Function::new("p2", &["x"], vec![DType::Float32]);
    p2.define(vec![Expr::image("input", DType::Float32, vec![x()])]).unwrap();
    let q = Function::new("q", &["x"], vec![DType::Float32]);
    q.define(vec![p2.call(vec![x()])]).unwrap();
    q.set_estimate("x", 0, 256);

    let s = setup(&[q.clone()]);
    let overlaps = s.analysis.redundant_regions(&q, 0, "x", &lit_bounds(&[("x", 0, 15)]));
    assert_eq!(overlaps[&p2.name()].area(), Some(0));
}

#[test]
fn overlap_regions_cover_every_dim_in_order() {
    let (_, blur_y) = blur_pipeline();
    let s = setup(&[blur_y.clone()]);

    let bounds = lit_bounds(&[("x", 0, 0), ("y", 0, 0)]);
    let overlaps = s.analysis.overlap_regions(&blur_y, 0, &bounds);
    assert_eq!(overlaps.len(), 2);

    // Along x a point tile of blur_y shares no blur_x columns; along y the
    // three-row window slides by one, keeping two rows.
    assert_eq!(overlaps[0]["blur_x"].area(), Some(0));
    assert_eq!(overlaps[1]["blur_x"].area(), Some(2));
}

#[test]
fn pipeline_bounds_union_outputs_and_dependencies() {
    let (blur_x, blur_y) = blur_pipeline();
    let s = setup(&[blur_y.clone()]);

    let by = &s.pipeline_bounds[&blur_y.name()];
    assert_eq!(endpoints(by, 0), (Some(0), Some(1023)));
    assert_eq!(endpoints(by, 1), (Some(0), Some(1023)));

    let bx = &s.pipeline_bounds[&blur_x.name()];
    assert_eq!(endpoints(bx, 0), (Some(0), Some(1023)));
    assert_eq!(endpoints(bx, 1), (Some(-1), Some(1024)));

    let input = &s.pipeline_bounds["input"];
    assert_eq!(endpoints(input, 0), (Some(-1), Some(1024)));
    assert_eq!(endpoints(input, 1), (Some(-1), Some(1024)));
}
