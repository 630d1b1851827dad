//! Symbolic intervals, boxes, and region inference.
//!
//! An [`Interval`] is a closed range with symbolic endpoints; a [`BBox`] is
//! one interval per dimension. [`boxes_required`] walks an expression
//! evaluated over a scope of per-variable intervals and returns, for every
//! called function or image, the bounding box of the accesses into it. This
//! is the region-inference primitive the dependence analysis is built on.

use std::collections::BTreeMap;

use crate::expr::{BinaryOp, CallType, Expr, ExprRef};
use crate::simplify::simplify;

/// Closed range `[min, max]` with symbolic endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub min: ExprRef,
    pub max: ExprRef,
}

/// Conservative bounds on the values produced by each pipeline function,
/// keyed by function name. Consulted when a call result is used inside an
/// index expression.
pub type FuncValueBounds = BTreeMap<String, Interval>;

impl Interval {
    pub fn new(min: ExprRef, max: ExprRef) -> Self {
        Self { min, max }
    }

    /// The degenerate interval containing a single value.
    pub fn point(e: ExprRef) -> Self {
        Self { min: e.clone(), max: e }
    }

    /// Number of integers in the interval when both endpoints are literals:
    /// `max - min + 1`, or 0 for an empty interval. `None` when either
    /// endpoint is symbolic.
    pub fn extent(&self) -> Option<i64> {
        let (min, max) = (self.min.as_int()?, self.max.as_int()?);
        if min <= max {
            Some(max - min + 1)
        } else {
            Some(0)
        }
    }

    pub fn simplified(&self) -> Self {
        Self { min: simplify(&self.min), max: simplify(&self.max) }
    }

    /// Smallest interval containing both.
    pub fn hull(&self, other: &Self) -> Self {
        Self {
            min: fold_min(&self.min, &other.min),
            max: fold_max(&self.max, &other.max),
        }
    }

    /// Largest interval contained in both. May be empty (`min > max`).
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min: fold_max(&self.min, &other.min),
            max: fold_min(&self.max, &other.max),
        }
    }
}

/// `min(a, b)` folded to a literal when possible.
fn fold_min(a: &ExprRef, b: &ExprRef) -> ExprRef {
    if a == b {
        return a.clone();
    }
    simplify(&Expr::min(a.clone(), b.clone()))
}

/// `max(a, b)` folded to a literal when possible.
fn fold_max(a: &ExprRef, b: &ExprRef) -> ExprRef {
    if a == b {
        return a.clone();
    }
    simplify(&Expr::max(a.clone(), b.clone()))
}

/// Bounding box: one interval per dimension, innermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BBox(pub Vec<Interval>);

impl BBox {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self(intervals)
    }

    pub fn push(&mut self, interval: Interval) {
        self.0.push(interval);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.0.iter()
    }

    /// Number of points in the box: the product of the extents. Any unknown
    /// extent makes the area unknown unless another extent is zero, which
    /// forces the area to zero.
    pub fn area(&self) -> Option<i64> {
        let mut area: i64 = 1;
        for interval in &self.0 {
            match interval.extent() {
                Some(0) => return Some(0),
                Some(extent) => area = area.saturating_mul(extent),
                None => return None,
            }
        }
        Some(area)
    }

    /// Per-dimension hull with `other`. Ranks must match.
    pub fn merge(&mut self, other: &BBox) {
        debug_assert_eq!(self.0.len(), other.0.len(), "box rank mismatch in merge");
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a = a.hull(b);
        }
    }

    /// Per-dimension intersection with `other`. Ranks must match.
    pub fn intersect(&self, other: &BBox) -> BBox {
        debug_assert_eq!(self.0.len(), other.0.len(), "box rank mismatch in intersect");
        BBox(self.0.iter().zip(other.0.iter()).map(|(a, b)| a.intersect(b)).collect())
    }

    pub fn simplify(&mut self) {
        for interval in &mut self.0 {
            *interval = interval.simplified();
        }
    }
}

/// Interval of values an expression can take over a scope of per-variable
/// intervals.
///
/// The arithmetic is exact for addition and subtraction, handles
/// multiplication and division by literal factors with sign awareness, and
/// falls back to symbolic `min`/`max` corner expressions otherwise. An
/// endpoint that stays non-literal is how "unknown" propagates; callers
/// never see a separate sentinel here.
pub fn bounds_of_expr_in_scope(
    e: &ExprRef,
    scope: &BTreeMap<String, Interval>,
    value_bounds: &FuncValueBounds,
) -> Interval {
    match e.as_ref() {
        Expr::IntImm(_) | Expr::UIntImm(_) | Expr::FloatImm(_) | Expr::StrImm(_) => {
            Interval::point(e.clone())
        }
        Expr::Var(name) => match scope.get(name) {
            Some(interval) => interval.clone(),
            None => Interval::point(e.clone()),
        },
        Expr::Cast { value, .. } => bounds_of_expr_in_scope(value, scope, value_bounds),
        Expr::Binary { op, a, b } => {
            let ia = bounds_of_expr_in_scope(a, scope, value_bounds);
            let ib = bounds_of_expr_in_scope(b, scope, value_bounds);
            bounds_of_binary(*op, &ia, &ib, e)
        }
        Expr::Not(_) => bool_bounds(),
        Expr::Select { then_case, else_case, .. } => {
            let it = bounds_of_expr_in_scope(then_case, scope, value_bounds);
            let ie = bounds_of_expr_in_scope(else_case, scope, value_bounds);
            it.hull(&ie)
        }
        Expr::Let { name, value, body } => {
            let value_interval = bounds_of_expr_in_scope(value, scope, value_bounds);
            let mut inner = scope.clone();
            inner.insert(name.clone(), value_interval);
            bounds_of_expr_in_scope(body, &inner, value_bounds)
        }
        Expr::Call { name, call_type, .. } => match call_type {
            CallType::Pipeline => match value_bounds.get(name) {
                Some(interval) => interval.clone(),
                None => Interval::point(e.clone()),
            },
            _ => Interval::point(e.clone()),
        },
        Expr::Lowered(kind) => {
            unreachable!("post-lowering node {kind:?} reached bounds inference")
        }
    }
}

fn bool_bounds() -> Interval {
    Interval::new(Expr::int(0), Expr::int(1))
}

fn bounds_of_binary(op: BinaryOp, ia: &Interval, ib: &Interval, e: &ExprRef) -> Interval {
    match op {
        BinaryOp::Add => Interval::new(
            simplify(&Expr::add(ia.min.clone(), ib.min.clone())),
            simplify(&Expr::add(ia.max.clone(), ib.max.clone())),
        ),
        BinaryOp::Sub => Interval::new(
            simplify(&Expr::sub(ia.min.clone(), ib.max.clone())),
            simplify(&Expr::sub(ia.max.clone(), ib.min.clone())),
        ),
        BinaryOp::Mul => {
            if let Some(c) = point_literal(ib) {
                scale(ia, c, BinaryOp::Mul)
            } else if let Some(c) = point_literal(ia) {
                scale(ib, c, BinaryOp::Mul)
            } else {
                corners(ia, ib, BinaryOp::Mul)
            }
        }
        BinaryOp::Div => {
            if let Some(c) = point_literal(ib) {
                if c != 0 {
                    scale(ia, c, BinaryOp::Div)
                } else {
                    Interval::point(e.clone())
                }
            } else {
                corners(ia, ib, BinaryOp::Div)
            }
        }
        BinaryOp::Mod => match point_literal(ib) {
            // A C-style remainder by a positive literal lands in [0, c-1]
            // for the non-negative numerators index arithmetic produces.
            Some(c) if c > 0 => Interval::new(Expr::int(0), Expr::int(c - 1)),
            _ => Interval::point(e.clone()),
        },
        BinaryOp::Min => Interval::new(fold_min(&ia.min, &ib.min), fold_min(&ia.max, &ib.max)),
        BinaryOp::Max => Interval::new(fold_max(&ia.min, &ib.min), fold_max(&ia.max, &ib.max)),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::And
        | BinaryOp::Or => bool_bounds(),
    }
}

/// The single literal value of a degenerate interval, if it is one.
fn point_literal(i: &Interval) -> Option<i64> {
    let (min, max) = (i.min.as_int()?, i.max.as_int()?);
    if min == max {
        Some(min)
    } else {
        None
    }
}

/// Scale an interval by a literal factor, swapping endpoints for negatives.
fn scale(i: &Interval, c: i64, op: BinaryOp) -> Interval {
    let factor = Expr::int(c);
    let lo = simplify(&Expr::binary(op, i.min.clone(), factor.clone()));
    let hi = simplify(&Expr::binary(op, i.max.clone(), factor));
    if c < 0 {
        Interval::new(hi, lo)
    } else {
        Interval::new(lo, hi)
    }
}

/// All four endpoint combinations, folded into min/max expressions.
fn corners(ia: &Interval, ib: &Interval, op: BinaryOp) -> Interval {
    let products = [
        simplify(&Expr::binary(op, ia.min.clone(), ib.min.clone())),
        simplify(&Expr::binary(op, ia.min.clone(), ib.max.clone())),
        simplify(&Expr::binary(op, ia.max.clone(), ib.min.clone())),
        simplify(&Expr::binary(op, ia.max.clone(), ib.max.clone())),
    ];
    let min = products.iter().skip(1).fold(products[0].clone(), |acc, p| fold_min(&acc, p));
    let max = products.iter().skip(1).fold(products[0].clone(), |acc, p| fold_max(&acc, p));
    Interval::new(min, max)
}

/// Conservative bounds on the values each pipeline function can produce,
/// computed producers-first so downstream functions can fold their
/// producers' bounds in.
///
/// Only literal bounds are recorded: over an unconstrained argument scope
/// most value expressions stay symbolic, and a symbolic bound referencing
/// free variables would claim more than is known. Constant-valued stages
/// (reduction initializers, lookup tables) are the ones that matter here,
/// since they are what data-dependent indices tend to read.
pub fn compute_function_value_bounds(
    order: &[String],
    env: &BTreeMap<String, crate::func::Function>,
) -> FuncValueBounds {
    let mut bounds = FuncValueBounds::new();
    let empty_scope = BTreeMap::new();
    for name in order {
        let Some(f) = env.get(name) else { continue };
        let mut func_interval: Option<Interval> = None;
        for stage in 0..f.num_stages() {
            let Ok(def) = f.definition(stage) else { continue };
            for value in def.values() {
                let interval = bounds_of_expr_in_scope(value, &empty_scope, &bounds);
                func_interval = Some(match func_interval {
                    Some(existing) => existing.hull(&interval),
                    None => interval,
                });
            }
        }
        if let Some(interval) = func_interval {
            if interval.min.as_int().is_some() && interval.max.as_int().is_some() {
                bounds.insert(name.clone(), interval);
            }
        }
    }
    bounds
}

/// Regions of every called function or image required to evaluate `e` over
/// `scope`.
///
/// For each `Pipeline` or `Image` call, every argument is bounded in scope
/// and the resulting per-dimension intervals are hull-merged into that
/// callee's box. Arguments are recursed into, so nested calls contribute
/// their own regions too.
pub fn boxes_required(
    e: &ExprRef,
    scope: &BTreeMap<String, Interval>,
    value_bounds: &FuncValueBounds,
) -> BTreeMap<String, BBox> {
    let mut regions = BTreeMap::new();
    collect_boxes(e, scope, value_bounds, &mut regions);
    regions
}

fn collect_boxes(
    e: &ExprRef,
    scope: &BTreeMap<String, Interval>,
    value_bounds: &FuncValueBounds,
    regions: &mut BTreeMap<String, BBox>,
) {
    if let Expr::Call { name, call_type, args, .. } = e.as_ref() {
        if matches!(call_type, CallType::Pipeline | CallType::Image) {
            let mut required = BBox::default();
            for arg in args {
                required.push(bounds_of_expr_in_scope(arg, scope, value_bounds).simplified());
            }
            match regions.get_mut(name) {
                Some(existing) => existing.merge(&required),
                None => {
                    regions.insert(name.clone(), required);
                }
            }
        }
    }
    for child in e.children() {
        collect_boxes(child, scope, value_bounds, regions);
    }
}
