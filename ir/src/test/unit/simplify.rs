use test_case::test_case;

use crate::expr::{BinaryOp, Expr, ExprRef};
use crate::simplify::simplify;

#[test_case(BinaryOp::Add, 3, 4, 7; "add")]
#[test_case(BinaryOp::Sub, 3, 4, -1; "sub")]
#[test_case(BinaryOp::Mul, 3, 4, 12; "mul")]
#[test_case(BinaryOp::Div, 9, 4, 2; "div")]
#[test_case(BinaryOp::Mod, 9, 4, 1; "modulo")]
#[test_case(BinaryOp::Min, 3, 4, 3; "min")]
#[test_case(BinaryOp::Max, 3, 4, 4; "max")]
#[test_case(BinaryOp::Lt, 3, 4, 1; "lt")]
#[test_case(BinaryOp::Ge, 3, 4, 0; "ge")]
fn integer_folding(op: BinaryOp, a: i64, b: i64, expected: i64) {
    let folded = simplify(&Expr::binary(op, Expr::int(a), Expr::int(b)));
    assert_eq!(folded.as_int(), Some(expected));
}

#[test]
fn identities() {
    let x = Expr::var("x");
    assert_eq!(simplify(&Expr::add(x.clone(), Expr::int(0))), x);
    assert_eq!(simplify(&Expr::mul(x.clone(), Expr::int(1))), x);
    assert_eq!(simplify(&Expr::mul(x.clone(), Expr::int(0))).as_int(), Some(0));
    assert_eq!(simplify(&Expr::sub(x.clone(), x.clone())).as_int(), Some(0));
    assert_eq!(simplify(&Expr::div(x.clone(), Expr::int(1))), x);
}

#[test]
fn additive_chains_fold() {
    // (x + 3) + 4 => x + 7
    let e = Expr::add(Expr::add(Expr::var("x"), Expr::int(3)), Expr::int(4));
    assert_eq!(simplify(&e), Expr::add(Expr::var("x"), Expr::int(7)));

    // (x - 2) + 5 => x + 3
    let e = Expr::add(Expr::sub(Expr::var("x"), Expr::int(2)), Expr::int(5));
    assert_eq!(simplify(&e), Expr::add(Expr::var("x"), Expr::int(3)));
}

#[test]
fn interval_endpoint_shape_folds() {
    // min + extent - 1 with literal min/extent, the shape every reduction
    // domain bound takes.
    let e = Expr::sub(Expr::add(Expr::int(0), Expr::int(64)), Expr::int(1));
    assert_eq!(simplify(&e).as_int(), Some(63));
}

#[test]
fn select_with_literal_condition() {
    let e = Expr::select(
        Expr::binary(BinaryOp::Lt, Expr::int(1), Expr::int(2)),
        Expr::var("a"),
        Expr::var("b"),
    );
    assert_eq!(simplify(&e), Expr::var("a"));
}

#[test]
fn cheap_lets_are_substituted() {
    let e = Expr::let_("t", Expr::int(5), Expr::add(Expr::var("t"), Expr::var("t")));
    assert_eq!(simplify(&e).as_int(), Some(10));
}

#[test]
fn division_by_zero_is_left_intact() {
    let e: ExprRef = Expr::div(Expr::int(4), Expr::int(0));
    let out = simplify(&e);
    assert_eq!(out.as_int(), None);
}
