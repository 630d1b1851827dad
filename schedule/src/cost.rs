//! Arithmetic and memory cost model.
//!
//! [`CostVisitor`] walks one expression and counts operations and bytes
//! loaded for a single point of evaluation. [`CostModel`] scales those
//! per-point costs to regions, optionally rewriting expressions to reflect
//! inlined producers, and measures working-set footprints.
//!
//! Costs live in the saturating [`Cost`] domain: a region whose bounds never
//! resolved to literals has `Unknown` area, and `Unknown` absorbs through
//! every sum and product. The partitioner treats an `Unknown` benefit as
//! strictly worse than any finite one, so unanalyzable choices are simply
//! never taken.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::rc::Rc;

use mosaic_dtype::DType;
use mosaic_ir::bounds::{BBox, Interval};
use mosaic_ir::expr::{CallType, Expr, ExprRef};
use mosaic_ir::func::Function;
use mosaic_ir::graph::{find_calls_in_expr, find_direct_calls, realization_order};
use mosaic_ir::simplify::simplify;
use mosaic_ir::substitute;
use smallvec::SmallVec;

/// Penalty for calling an opaque extern stage. There is no visibility into
/// its cost, so it is priced high enough that fusing across an extern
/// boundary never looks attractive.
pub const EXTERN_CALL_PENALTY: i64 = 999;

/// A cost that may be unknown.
///
/// `Unknown` is absorptive in arithmetic and sorts below every known value,
/// so an unanalyzable choice loses every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Unknown,
    Known(i64),
}

impl Cost {
    pub const ZERO: Cost = Cost::Known(0);

    pub fn from_area(area: Option<i64>) -> Self {
        match area {
            Some(v) => Self::Known(v),
            None => Self::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn known(self) -> Option<i64> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Unknown, Self::Unknown) => std::cmp::Ordering::Equal,
            (Self::Unknown, Self::Known(_)) => std::cmp::Ordering::Less,
            (Self::Known(_), Self::Unknown) => std::cmp::Ordering::Greater,
            (Self::Known(a), Self::Known(b)) => a.cmp(b),
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Self::Known(a), Self::Known(b)) => Self::Known(a.saturating_add(b)),
            _ => Self::Unknown,
        }
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        *self = *self + rhs;
    }
}

impl Sub for Cost {
    type Output = Cost;

    fn sub(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Self::Known(a), Self::Known(b)) => Self::Known(a.saturating_sub(b)),
            _ => Self::Unknown,
        }
    }
}

impl Mul for Cost {
    type Output = Cost;

    fn mul(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Self::Known(a), Self::Known(b)) => Self::Known(a.saturating_mul(b)),
            _ => Self::Unknown,
        }
    }
}

impl From<i64> for Cost {
    fn from(v: i64) -> Self {
        Self::Known(v)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => f.write_str("?"),
        }
    }
}

/// Paired arithmetic and memory costs of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostPair {
    pub arith: Cost,
    pub bytes: Cost,
}

impl CostPair {
    pub const ZERO: CostPair = CostPair { arith: Cost::ZERO, bytes: Cost::ZERO };
    pub const UNKNOWN: CostPair = CostPair { arith: Cost::Unknown, bytes: Cost::Unknown };

    pub fn is_known(self) -> bool {
        self.arith.is_known() && self.bytes.is_known()
    }
}

impl AddAssign for CostPair {
    fn add_assign(&mut self, rhs: CostPair) {
        self.arith += rhs.arith;
        self.bytes += rhs.bytes;
    }
}

/// Counts operations and bytes loaded for one point of evaluation.
///
/// Only pre-lowering expressions are costable; reaching a lowered node here
/// is a contract violation and aborts.
#[derive(Debug, Default)]
pub struct CostVisitor {
    pub ops: i64,
    pub byte_loads: i64,
}

impl CostVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit(&mut self, e: &ExprRef) {
        match e.as_ref() {
            Expr::IntImm(_)
            | Expr::UIntImm(_)
            | Expr::FloatImm(_)
            | Expr::StrImm(_)
            | Expr::Var(_) => {}
            Expr::Cast { value, .. } => {
                self.visit(value);
                self.ops += 1;
            }
            Expr::Binary { a, b, .. } => {
                self.visit(a);
                self.visit(b);
                self.ops += 1;
            }
            Expr::Not(value) => {
                self.visit(value);
                self.ops += 1;
            }
            Expr::Select { cond, then_case, else_case } => {
                self.visit(cond);
                self.visit(then_case);
                self.visit(else_case);
                self.ops += 1;
            }
            // Binding itself is free; let-folding is the simplifier's job.
            Expr::Let { value, body, .. } => {
                self.visit(value);
                self.visit(body);
            }
            Expr::Call { call_type, dtype, args, .. } => {
                match call_type {
                    CallType::Pipeline | CallType::Image => {
                        self.byte_loads += i64::from(dtype.bytes());
                    }
                    CallType::Extern => self.ops += EXTERN_CALL_PENALTY,
                    CallType::Intrinsic => self.ops += 1,
                }
                for arg in args {
                    self.visit(arg);
                }
            }
            Expr::Lowered(kind) => {
                panic!("post-lowering node {kind:?} reached the cost visitor")
            }
        }
    }
}

/// Cost of one expression at one point: `(ops, bytes_loaded)`.
pub fn expr_cost(e: &ExprRef) -> (i64, i64) {
    let mut visitor = CostVisitor::new();
    visitor.visit(e);
    (visitor.ops, visitor.byte_loads)
}

/// Per-stage point costs: one `(ops, bytes)` row per stage of a function.
pub type FuncCost = SmallVec<[(i64, i64); 2]>;

/// Region cost and working-set model over a pipeline environment.
pub struct CostModel {
    env: BTreeMap<String, Function>,
    /// Per-point cost of every stage of every function, without inlining.
    func_cost: BTreeMap<String, FuncCost>,
    /// External image inputs and their element types.
    inputs: BTreeMap<String, DType>,
}

impl CostModel {
    pub fn new(env: &BTreeMap<String, Function>) -> Self {
        let mut model = Self { env: env.clone(), func_cost: BTreeMap::new(), inputs: BTreeMap::new() };
        let empty = BTreeSet::new();
        for (name, f) in env {
            let cost = model.get_func_cost(f, &empty);
            for (stage, row) in cost.iter().enumerate() {
                tracing::debug!(func = %name, stage, ops = row.0, bytes = row.1, "stage point cost");
            }
            model.func_cost.insert(name.clone(), cost);
            collect_image_inputs(f, &mut model.inputs);
        }
        model
    }

    /// The external image inputs seen anywhere in the pipeline.
    pub fn inputs(&self) -> &BTreeMap<String, DType> {
        &self.inputs
    }

    /// Per-point cost rows for a function; element 0 is the pure definition,
    /// element `k >= 1` update `k`. Update rows include the left-hand-side
    /// index arithmetic.
    pub fn get_func_cost(&self, f: &Function, inlines: &BTreeSet<String>) -> FuncCost {
        let mut rows = FuncCost::new();

        let mut ops = 0i64;
        let mut loads = 0i64;
        for value in f.values() {
            let (o, l) = expr_cost(&self.perform_inline(&value, inlines));
            ops += o;
            loads += l;
        }
        rows.push((ops, loads));

        for update in f.updates() {
            let mut ops = 0i64;
            let mut loads = 0i64;
            for e in update.values().iter().chain(update.args().iter()) {
                let (o, l) = expr_cost(&self.perform_inline(e, inlines));
                ops += o;
                loads += l;
            }
            rows.push((ops, loads));
        }
        rows
    }

    /// Substitute calls to inlined pure functions with their definitions,
    /// repeatedly, until no inlinable call remains. Reduction stages and
    /// tuple-valued functions are never inlined.
    pub fn perform_inline(&self, e: &ExprRef, inlines: &BTreeSet<String>) -> ExprRef {
        if inlines.is_empty() {
            return e.clone();
        }
        let mut expr = e.clone();
        loop {
            let mut calls = BTreeSet::new();
            find_calls_in_expr(&expr, &mut calls);
            let target = calls.into_iter().find(|name| {
                inlines.contains(name)
                    && self
                        .env
                        .get(name)
                        .is_some_and(|f| f.is_pure() && f.values().len() == 1)
            });
            match target {
                Some(name) => expr = inline_function(&expr, &self.env[&name]),
                None => break,
            }
        }
        expr
    }

    /// Cost of evaluating stage `(func, stage)` over a region box aligned to
    /// the function's pure args.
    pub fn stage_region_cost(
        &self,
        func: &str,
        stage: usize,
        region: &BBox,
        inlines: &BTreeSet<String>,
    ) -> CostPair {
        let Some(f) = self.env.get(func) else {
            return CostPair::UNKNOWN;
        };
        let Ok(def) = f.definition(stage) else {
            return CostPair::UNKNOWN;
        };

        // Costing updates over the pure bounds assumes the pure domain is
        // shared across all updates, which can overestimate.
        let args = f.args();
        debug_assert_eq!(args.len(), region.len(), "region rank mismatch for {func}");
        let mut bounds: BTreeMap<String, Interval> = args
            .iter()
            .cloned()
            .zip(region.iter().cloned())
            .collect();
        for rvar in def.schedule().rvars() {
            bounds.insert(
                rvar.var.clone(),
                Interval::new(
                    simplify(&rvar.min),
                    simplify(&Expr::sub(
                        Expr::add(rvar.min.clone(), rvar.extent.clone()),
                        Expr::int(1),
                    )),
                ),
            );
        }

        let mut stage_box = BBox::default();
        let dims = def.schedule().dims();
        for dim in &dims[..dims.len() - 1] {
            match bounds.get(&dim.var) {
                Some(interval) => stage_box.push(interval.clone()),
                None => return CostPair::UNKNOWN,
            }
        }

        let area = match stage_box.area() {
            Some(area) => area,
            None => return CostPair::UNKNOWN,
        };

        let rows;
        let cost = if inlines.is_empty() {
            &self.func_cost[func]
        } else {
            rows = self.get_func_cost(f, inlines);
            &rows
        };
        let (ops, loads) = cost[stage];
        CostPair {
            arith: Cost::Known(area.saturating_mul(ops)),
            bytes: Cost::Known(area.saturating_mul(loads)),
        }
    }

    /// Cost of evaluating every stage of a function over a region.
    pub fn func_region_cost(&self, func: &str, region: &BBox, inlines: &BTreeSet<String>) -> CostPair {
        let Some(f) = self.env.get(func) else {
            return CostPair::UNKNOWN;
        };
        let mut total = CostPair::ZERO;
        for stage in 0..f.num_stages() {
            let stage_cost = self.stage_region_cost(func, stage, region, inlines);
            if !stage_cost.is_known() {
                return CostPair::UNKNOWN;
            }
            total += stage_cost;
        }
        total
    }

    /// Cost of a set of regions. Inlined pure functions are skipped: their
    /// cost is already accounted inside their consumers' rewritten
    /// expressions.
    pub fn region_cost(
        &self,
        regions: &BTreeMap<String, BBox>,
        inlines: &BTreeSet<String>,
    ) -> CostPair {
        let mut total = CostPair::ZERO;
        for (func, region) in regions {
            if inlines.contains(func) && self.env.get(func).is_some_and(Function::is_pure) {
                continue;
            }
            let cost = self.func_region_cost(func, region, inlines);
            if !cost.is_known() {
                return CostPair::UNKNOWN;
            }
            total += cost;
        }
        total
    }

    /// Bytes of one value of a function: the sum over tuple components.
    fn func_value_size(f: &Function) -> i64 {
        f.output_types().iter().map(|t| i64::from(t.bytes())).sum()
    }

    /// Allocation size of one function's region.
    pub fn func_region_size(&self, func: &str, region: &BBox) -> Cost {
        let Some(f) = self.env.get(func) else {
            return Cost::Unknown;
        };
        match region.area() {
            Some(area) => Cost::Known(area.saturating_mul(Self::func_value_size(f))),
            None => Cost::Unknown,
        }
    }

    /// Working-set high-water mark of a set of regions.
    ///
    /// Walks the regions in realization order, allocating each function's
    /// bytes when it is produced and freeing a producer once its last
    /// in-set consumer has been visited. Inlined pure functions occupy no
    /// storage.
    pub fn region_size(&self, regions: &BTreeMap<String, BBox>, inlined: &BTreeSet<String>) -> Cost {
        let mut num_consumers: BTreeMap<String, i64> =
            regions.keys().map(|f| (f.clone(), 0)).collect();
        for func in regions.keys() {
            let Some(f) = self.env.get(func) else { continue };
            for producer in find_direct_calls(f).keys() {
                if let Some(count) = num_consumers.get_mut(producer) {
                    *count += 1;
                }
            }
        }

        let outs: Vec<Function> = num_consumers
            .iter()
            .filter(|(_, count)| **count == 0)
            .filter_map(|(name, _)| self.env.get(name).cloned())
            .collect();
        let order = realization_order(&outs, &self.env);

        let mut func_sizes = BTreeMap::new();
        for (func, region) in regions {
            let size = if inlined.contains(func)
                && self.env.get(func).is_some_and(Function::is_pure)
            {
                Cost::ZERO
            } else {
                self.func_region_size(func, region)
            };
            match size.known() {
                Some(bytes) => {
                    func_sizes.insert(func.clone(), bytes);
                }
                None => return Cost::Unknown,
            }
        }

        let mut working_set: i64 = 0;
        let mut live: i64 = 0;
        for func in &order {
            if let Some(size) = func_sizes.get(func) {
                live += size;
            }
            working_set = working_set.max(live);
            let Some(f) = self.env.get(func) else { continue };
            for producer in find_direct_calls(f).keys() {
                if let Some(count) = num_consumers.get_mut(producer) {
                    *count -= 1;
                    if *count == 0 {
                        live -= func_sizes[producer];
                    }
                }
            }
        }
        Cost::Known(working_set)
    }

    /// Bytes of an external input's region.
    pub fn input_region_size_one(&self, input: &str, region: &BBox) -> Cost {
        let Some(dtype) = self.inputs.get(input) else {
            return Cost::Unknown;
        };
        match region.area() {
            Some(area) => Cost::Known(area.saturating_mul(i64::from(dtype.bytes()))),
            None => Cost::Unknown,
        }
    }

    /// Total bytes of a set of external input regions.
    pub fn input_region_size(&self, regions: &BTreeMap<String, BBox>) -> Cost {
        let mut total = Cost::ZERO;
        for (input, region) in regions {
            let size = self.input_region_size_one(input, region);
            if !size.is_known() {
                return Cost::Unknown;
            }
            total += size;
        }
        total
    }
}

/// Replace every call to `f` in `e` with `f`'s definition, with the pure
/// variables substituted by the call arguments.
fn inline_function(e: &ExprRef, f: &Function) -> ExprRef {
    let name = f.name();
    let body = f.values().swap_remove(0);
    let params = f.args();
    rebuild_inlined(e, &name, &body, &params)
}

fn rebuild_inlined(e: &ExprRef, name: &str, body: &ExprRef, params: &[String]) -> ExprRef {
    if let Expr::Call { name: callee, call_type: CallType::Pipeline, args, .. } = e.as_ref() {
        if callee == name {
            let args: Vec<ExprRef> =
                args.iter().map(|a| rebuild_inlined(a, name, body, params)).collect();
            let subs: BTreeMap<String, ExprRef> =
                params.iter().cloned().zip(args.into_iter()).collect();
            return substitute(body, &subs);
        }
    }
    match e.as_ref() {
        Expr::Cast { dtype, value } => Expr::cast(*dtype, rebuild_inlined(value, name, body, params)),
        Expr::Binary { op, a, b } => Expr::binary(
            *op,
            rebuild_inlined(a, name, body, params),
            rebuild_inlined(b, name, body, params),
        ),
        Expr::Not(value) => Rc::new(Expr::Not(rebuild_inlined(value, name, body, params))),
        Expr::Select { cond, then_case, else_case } => Expr::select(
            rebuild_inlined(cond, name, body, params),
            rebuild_inlined(then_case, name, body, params),
            rebuild_inlined(else_case, name, body, params),
        ),
        Expr::Let { name: var, value, body: let_body } => Expr::let_(
            var.clone(),
            rebuild_inlined(value, name, body, params),
            rebuild_inlined(let_body, name, body, params),
        ),
        Expr::Call { name: callee, call_type, dtype, args, func } => Rc::new(Expr::Call {
            name: callee.clone(),
            call_type: *call_type,
            dtype: *dtype,
            args: args.iter().map(|a| rebuild_inlined(a, name, body, params)).collect(),
            func: func.clone(),
        }),
        _ => e.clone(),
    }
}

/// Record the element type of every external image loaded by a function.
fn collect_image_inputs(f: &Function, inputs: &mut BTreeMap<String, DType>) {
    for stage in 0..f.num_stages() {
        if let Ok(def) = f.definition(stage) {
            for e in def.values().iter().chain(def.args().iter()) {
                collect_image_inputs_in(e, inputs);
            }
        }
    }
}

fn collect_image_inputs_in(e: &ExprRef, inputs: &mut BTreeMap<String, DType>) {
    if let Expr::Call { name, call_type: CallType::Image, dtype, .. } = e.as_ref() {
        inputs.insert(name.clone(), *dtype);
    }
    for child in e.children() {
        collect_image_inputs_in(child, inputs);
    }
}
