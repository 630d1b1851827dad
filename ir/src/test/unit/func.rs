use mosaic_dtype::DType;

use crate::expr::Expr;
use crate::func::{can_parallelize_rvar, ForKind, Function, ReductionVariable, OUTERMOST};

fn dim_vars(f: &Function, stage: usize) -> Vec<String> {
    f.stage(stage).dims().unwrap().into_iter().map(|d| d.var).collect()
}

#[test]
fn pure_definition_dims_end_with_outermost() {
    let f = Function::new("f", &["x", "y"], vec![DType::Float32]);
    f.define(vec![Expr::image("input", DType::Float32, vec![Expr::var("x"), Expr::var("y")])])
        .unwrap();

    assert!(f.is_pure());
    assert_eq!(f.num_stages(), 1);
    assert_eq!(dim_vars(&f, 0), vec!["x", "y", OUTERMOST]);
}

#[test]
fn update_dims_append_rvars() {
    let f = Function::new("hist", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.add_update(
        vec![Expr::var("x")],
        vec![Expr::add(
            f.call(vec![Expr::var("x")]),
            Expr::image("input", DType::Float32, vec![Expr::var("x"), Expr::var("r")]),
        )],
        vec![ReductionVariable::new("r", 0, 64)],
    )
    .unwrap();

    assert!(!f.is_pure());
    assert_eq!(f.num_stages(), 2);
    assert_eq!(dim_vars(&f, 1), vec!["x", "r", OUTERMOST]);
    assert_eq!(f.definition(1).unwrap().schedule().rvars().len(), 1);
}

#[test]
fn split_replaces_dim_in_place() {
    let f = Function::new("f", &["x", "y"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();

    f.stage(0).split("x", "x_o", "x_i", 64).unwrap();
    assert_eq!(dim_vars(&f, 0), vec!["x_i", "x_o", "y", OUTERMOST]);

    // Splitting an unknown variable is an error.
    let err = f.stage(0).split("z", "z_o", "z_i", 8).unwrap_err();
    assert!(err.to_string().contains("no dimension named z"));
}

#[test]
fn reorder_moves_vars_within_their_slots() {
    let f = Function::new("f", &["x", "y"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.stage(0).split("x", "x_o", "x_i", 64).unwrap();
    f.stage(0).split("y", "y_o", "y_i", 64).unwrap();
    assert_eq!(dim_vars(&f, 0), vec!["x_i", "x_o", "y_i", "y_o", OUTERMOST]);

    f.stage(0)
        .reorder(&["x_i".into(), "y_i".into(), "x_o".into(), "y_o".into()])
        .unwrap();
    assert_eq!(dim_vars(&f, 0), vec!["x_i", "y_i", "x_o", "y_o", OUTERMOST]);
}

#[test]
fn vectorize_and_parallel_mark_loop_kinds() {
    let f = Function::new("f", &["x", "y"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.stage(0).vectorize("x").unwrap();
    f.stage(0).parallel("y").unwrap();

    let dims = f.stage(0).dims().unwrap();
    assert_eq!(dims[0].kind, ForKind::Vectorized);
    assert_eq!(dims[1].kind, ForKind::Parallel);
}

#[test]
fn directive_log_records_application_order() {
    let f = Function::new("out", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.compute_root();
    f.stage(0).split("x", "x_vo", "x_vi", 8).unwrap();
    f.stage(0).vectorize("x_vi").unwrap();

    assert_eq!(
        f.directives(),
        vec![
            "out.compute_root();",
            "out.split(x, x_vo, x_vi, 8);",
            "out.vectorize(x_vi);",
        ]
    );
}

#[test]
fn update_stages_are_labelled_as_updates() {
    let f = Function::new("acc", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.add_update(
        vec![Expr::var("x")],
        vec![Expr::add(f.call(vec![Expr::var("x")]), Expr::float(1.0))],
        vec![],
    )
    .unwrap();

    f.stage(1).vectorize("x").unwrap();
    assert_eq!(f.directives(), vec!["acc.update(0).vectorize(x);"]);
}

#[test]
fn rvar_parallelism_requires_distinct_writes() {
    // sum(x) += input(x, r): r does not index the write site, so
    // parallelizing it races.
    let f = Function::new("sum", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.add_update(
        vec![Expr::var("x")],
        vec![Expr::add(
            f.call(vec![Expr::var("x")]),
            Expr::image("input", DType::Float32, vec![Expr::var("x"), Expr::var("r")]),
        )],
        vec![ReductionVariable::new("r", 0, 64)],
    )
    .unwrap();

    let def = f.definition(1).unwrap();
    assert!(!can_parallelize_rvar("r", "sum", &def));
}

#[test]
fn rvar_parallelism_allows_scatter_to_distinct_sites() {
    // scatter(r) = input(r) writes one site per r value and never reads
    // itself, so r is parallel-safe.
    let f = Function::new("scatter", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.add_update(
        vec![Expr::var("r")],
        vec![Expr::image("input", DType::Float32, vec![Expr::var("r")])],
        vec![ReductionVariable::new("r", 0, 64)],
    )
    .unwrap();

    let def = f.definition(1).unwrap();
    assert!(can_parallelize_rvar("r", "scatter", &def));
}

#[test]
fn rvar_parallelism_rejects_cross_site_self_reads() {
    // shift(r) = shift(r - 1): reads a different site than it writes.
    let f = Function::new("shift", &["x"], vec![DType::Float32]);
    f.define(vec![Expr::float(0.0)]).unwrap();
    f.add_update(
        vec![Expr::var("r")],
        vec![f.call(vec![Expr::sub(Expr::var("r"), Expr::int(1))])],
        vec![ReductionVariable::new("r", 1, 63)],
    )
    .unwrap();

    let def = f.definition(1).unwrap();
    assert!(!can_parallelize_rvar("r", "shift", &def));
}
