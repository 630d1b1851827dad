//! Pipeline IR for the mosaic compiler.
//!
//! This crate is the host side of the auto-scheduler: the expression IR,
//! the symbolic machinery over it, and the function/schedule handles the
//! scheduler drives.
//!
//! # Module Organization
//!
//! - [`expr`] - Pre-lowering expressions and traversal
//! - [`simplify`] - Best-effort symbolic simplification
//! - [`bounds`] - Intervals, boxes, and `boxes_required` region inference
//! - [`func`] - Functions, stage definitions, and the schedule facade
//! - [`graph`] - Call discovery and realization order

pub mod bounds;
pub mod error;
pub mod expr;
pub mod func;
pub mod graph;
pub mod simplify;

#[cfg(test)]
pub mod test;

pub use bounds::{
    bounds_of_expr_in_scope, boxes_required, compute_function_value_bounds, BBox, FuncValueBounds,
    Interval,
};
pub use error::{Error, Result};
pub use expr::{substitute, BinaryOp, CallType, Expr, ExprRef, LoweredKind};
pub use func::{
    can_parallelize_rvar, Definition, Dim, Estimate, ForKind, Function, FunctionRef,
    ReductionVariable, Stage, StageSchedule, OUTERMOST,
};
pub use graph::{
    calls_in_definition, calls_in_function, find_calls_in_expr, find_direct_calls,
    find_transitive_calls, realization_order,
};
pub use simplify::simplify;
