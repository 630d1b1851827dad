use std::collections::BTreeMap;

use mosaic_dtype::DType;

use crate::expr::{substitute, BinaryOp, Expr};

#[test]
fn children_cover_all_operands() {
    let e = Expr::select(
        Expr::binary(BinaryOp::Lt, Expr::var("x"), Expr::int(4)),
        Expr::add(Expr::var("x"), Expr::int(1)),
        Expr::int(0),
    );
    assert_eq!(e.children().len(), 3);

    let call = Expr::image("input", DType::Float32, vec![Expr::var("x"), Expr::var("y")]);
    assert_eq!(call.children().len(), 2);
}

#[test]
fn predicate_ops_are_bool() {
    let cmp = Expr::binary(BinaryOp::Le, Expr::var("x"), Expr::int(3));
    assert_eq!(cmp.dtype(), DType::Bool);

    let arith = Expr::mul(Expr::float(2.0), Expr::float(3.0));
    assert_eq!(arith.dtype(), DType::Float32);

    let load = Expr::image("input", DType::UInt16, vec![Expr::var("x")]);
    assert_eq!(load.dtype(), DType::UInt16);
}

#[test]
fn substitute_replaces_free_vars() {
    let mut subs = BTreeMap::new();
    subs.insert("x".to_string(), Expr::add(Expr::var("xo"), Expr::var("xi")));

    let e = Expr::add(Expr::var("x"), Expr::var("y"));
    let out = substitute(&e, &subs);
    assert_eq!(out, Expr::add(Expr::add(Expr::var("xo"), Expr::var("xi")), Expr::var("y")));
}

#[test]
fn substitute_respects_let_shadowing() {
    let mut subs = BTreeMap::new();
    subs.insert("x".to_string(), Expr::int(7));

    // let x = y in x: the bound x must not be replaced.
    let e = Expr::let_("x", Expr::var("y"), Expr::var("x"));
    let out = substitute(&e, &subs);
    assert_eq!(out, Expr::let_("x", Expr::var("y"), Expr::var("x")));
}

#[test]
fn display_is_readable() {
    let e = Expr::add(
        Expr::image("input", DType::Float32, vec![Expr::sub(Expr::var("x"), Expr::int(1))]),
        Expr::int(1),
    );
    assert_eq!(e.to_string(), "(input((x - 1)) + 1)");
}
