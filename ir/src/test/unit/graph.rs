use mosaic_dtype::DType;

use crate::expr::Expr;
use crate::func::Function;
use crate::graph::{
    calls_in_function, find_direct_calls, find_transitive_calls, realization_order,
};

/// input -> blur_x -> blur_y, the usual separable stencil chain.
fn blur_chain() -> (Function, Function) {
    let blur_x = Function::new("blur_x", &["x", "y"], vec![DType::Float32]);
    blur_x
        .define(vec![Expr::add(
            Expr::image("input", DType::Float32, vec![Expr::var("x"), Expr::var("y")]),
            Expr::int(1),
        )])
        .unwrap();

    let blur_y = Function::new("blur_y", &["x", "y"], vec![DType::Float32]);
    blur_y
        .define(vec![Expr::add(
            blur_x.call(vec![Expr::var("x"), Expr::var("y")]),
            blur_x.call(vec![Expr::var("x"), Expr::add(Expr::var("y"), Expr::int(1))]),
        )])
        .unwrap();

    (blur_x, blur_y)
}

#[test]
fn calls_include_images_and_functions() {
    let (blur_x, blur_y) = blur_chain();
    let calls = calls_in_function(&blur_x);
    assert!(calls.contains("input"));

    let calls = calls_in_function(&blur_y);
    assert!(calls.contains("blur_x"));
    assert!(!calls.contains("input"));
}

#[test]
fn direct_calls_resolve_handles() {
    let (_, blur_y) = blur_chain();
    let direct = find_direct_calls(&blur_y);
    assert_eq!(direct.len(), 1);
    assert!(direct.contains_key("blur_x"));
}

#[test]
fn transitive_calls_build_the_environment() {
    let (_, blur_y) = blur_chain();
    let env = find_transitive_calls(&blur_y);
    assert_eq!(env.len(), 2);
    assert!(env.contains_key("blur_x"));
    assert!(env.contains_key("blur_y"));
}

#[test]
fn realization_order_puts_producers_first() {
    let (_, blur_y) = blur_chain();
    let env = find_transitive_calls(&blur_y);
    let order = realization_order(&[blur_y], &env);
    assert_eq!(order, vec!["blur_x", "blur_y"]);
}

#[test]
fn diamond_dependencies_are_ordered_once() {
    // p feeds both c1 and c2, which feed out.
    let p = Function::new("p", &["x"], vec![DType::Float32]);
    p.define(vec![Expr::image("input", DType::Float32, vec![Expr::var("x")])]).unwrap();

    let c1 = Function::new("c1", &["x"], vec![DType::Float32]);
    c1.define(vec![Expr::add(p.call(vec![Expr::var("x")]), Expr::int(1))]).unwrap();

    let c2 = Function::new("c2", &["x"], vec![DType::Float32]);
    c2.define(vec![Expr::mul(p.call(vec![Expr::var("x")]), Expr::int(2))]).unwrap();

    let out = Function::new("out", &["x"], vec![DType::Float32]);
    out.define(vec![Expr::add(
        c1.call(vec![Expr::var("x")]),
        c2.call(vec![Expr::var("x")]),
    )])
    .unwrap();

    let env = find_transitive_calls(&out);
    let order = realization_order(&[out], &env);
    assert_eq!(order, vec!["p", "c1", "c2", "out"]);
}

#[test]
fn self_references_do_not_appear_as_callees() {
    let acc = Function::new("acc", &["x"], vec![DType::Float32]);
    acc.define(vec![Expr::float(0.0)]).unwrap();
    acc.add_update(
        vec![Expr::var("x")],
        vec![Expr::add(acc.call(vec![Expr::var("x")]), Expr::float(1.0))],
        vec![],
    )
    .unwrap();

    assert!(find_direct_calls(&acc).is_empty());
    let env = find_transitive_calls(&acc);
    assert_eq!(env.len(), 1);
}
