//! End-to-end scheduling scenarios through `generate_schedules`.

use crate::error::Error;
use crate::target::Target;
use crate::test::helpers::{
    blur_pipeline, multi_consumer_pipeline, pointwise_pipeline, producer_consumer_pipeline,
    reduction_pipeline,
};
use crate::generate_schedules;

#[test]
fn single_pointwise_output() {
    let f = pointwise_pipeline();
    let sched = generate_schedules(&[f], &Target::default()).unwrap();

    // No fusion candidates exist; the output is rooted, vectorized along
    // x, and parallelized along y.
    assert_eq!(
        sched,
        "f.compute_root();\n\
         f.split(x, x_vo, x_vi, 8);\n\
         f.vectorize(x_vi);\n\
         f.parallel(y);\n"
    );
}

#[test]
fn single_use_pointwise_producer_is_inlined() {
    let (p, c) = producer_consumer_pipeline();
    let sched = generate_schedules(&[c.clone()], &Target::default()).unwrap();

    assert!(sched.contains("p.compute_inline();"));
    assert!(!sched.contains("p.compute_root();"));
    // One rooted stage, vectorized along its innermost pure dim.
    assert!(sched.contains("c.compute_root();"));
    assert!(sched.contains("c.vectorize(x_vi);"));
    assert!(p.directives().contains(&"p.compute_inline();".to_string()));
}

#[test]
fn reductions_stay_at_root() {
    let (_r, out) = reduction_pipeline();
    let sched = generate_schedules(&[out], &Target::default()).unwrap();

    assert!(!sched.contains("r.compute_inline();"));
    assert!(sched.contains("r.compute_root();"));
    assert!(sched.contains("out.compute_root();"));
    // Both the pure stage and the update vectorize along x.
    assert!(sched.contains("r.split(x, x_vo, x_vi, 8);"));
    assert!(sched.contains("r.vectorize(x_vi);"));
    assert!(sched.contains("r.update(0).vectorize(x_vi);"));
    assert!(sched.contains("out.vectorize(x_vi);"));
}

#[test]
fn stencil_chain_fuses_at_tile_granularity() {
    let (blur_x, blur_y) = blur_pipeline();
    let sched = generate_schedules(&[blur_y], &Target::default()).unwrap();

    // blur_x is folded into blur_y's group for cost purposes but is not
    // functionally inlined, and no directives land on it.
    assert!(!sched.contains("blur_x.compute_inline();"));
    assert!(!sched.contains("blur_x.compute_root();"));
    assert!(blur_x.directives().is_empty());

    // A non-trivial tile from the configuration grid on both dims, with
    // the inner x half vectorized and the outer y loop parallelized.
    assert!(sched.contains("blur_y.compute_root();"));
    assert!(sched.contains("blur_y.split(x, blur_y_0_x_o, blur_y_0_x_i, 64);"));
    assert!(sched.contains("blur_y.split(y, blur_y_0_y_o, blur_y_0_y_i, 4);"));
    assert!(sched.contains(
        "blur_y.reorder(blur_y_0_x_i, blur_y_0_y_i, blur_y_0_x_o, blur_y_0_y_o);"
    ));
    assert!(sched.contains("blur_y.vectorize(blur_y_0_x_i_vi);"));
    assert!(sched.contains("blur_y.parallel(blur_y_0_y_o);"));
}

#[test]
fn multi_consumer_producer_is_not_tile_fused() {
    let (p, c1, c2) = multi_consumer_pipeline();
    let sched = generate_schedules(&[c1, c2], &Target::default()).unwrap();

    // Both outputs are scheduled independently.
    assert!(sched.contains("c1.compute_root();"));
    assert!(sched.contains("c2.compute_root();"));
    // p has more than one consuming function, so FAST_MEM cannot place it;
    // the INLINE pass is allowed to absorb it into both consumers.
    assert!(sched.contains("p.compute_inline();"));
    assert!(p.directives().contains(&"p.compute_inline();".to_string()));
}

#[test]
fn missing_estimates_fail_loudly() {
    use mosaic_dtype::DType;
    use mosaic_ir::expr::Expr;
    use mosaic_ir::Function;

    let f = Function::new("f", &["x", "y"], vec![DType::Float32]);
    f.define(vec![Expr::image(
        "input",
        DType::Float32,
        vec![Expr::var("x"), Expr::var("y")],
    )])
    .unwrap();
    f.set_estimate("x", 0, 1024);

    let err = generate_schedules(&[f], &Target::default()).unwrap_err();
    assert!(matches!(
        &err,
        Error::MissingEstimate { func, var } if func == "f" && var == "y"
    ));
    assert!(err.to_string().contains("missing an estimate for dimension y"));
}

#[test]
fn schedules_are_deterministic() {
    let (_, blur_y_a) = blur_pipeline();
    let (_, blur_y_b) = blur_pipeline();

    let a = generate_schedules(&[blur_y_a], &Target::default()).unwrap();
    let b = generate_schedules(&[blur_y_b], &Target::default()).unwrap();
    assert_eq!(a, b);
}
