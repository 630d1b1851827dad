//! Pipeline functions, stage definitions, and schedule handles.
//!
//! A [`Function`] is a named pipeline node with a pure definition and an
//! ordered list of update definitions. Handles are cheap clones over shared
//! contents, so the scheduler can pass them around freely while the schedule
//! facade mutates loop structure in place.
//!
//! Scheduling state lives in each definition's [`StageSchedule`]: the
//! ordered loop dimension list (innermost first, with a trailing
//! `__outermost` marker) and the reduction variables. Directives applied
//! through [`Function`] and [`Stage`] rewrite the dim list and append to a
//! per-function textual log that hosts and tests can inspect.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use mosaic_dtype::DType;

use crate::error::{
    AlreadyDefinedSnafu, DuplicateReorderVarSnafu, Result, StageOutOfRangeSnafu,
    UnknownDimensionSnafu, UpdateBeforeDefinitionSnafu,
};
use crate::expr::{CallType, Expr, ExprRef};

/// Name of the implicit outermost loop that closes every dim list.
pub const OUTERMOST: &str = "__outermost";

/// How a loop dimension is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForKind {
    Serial,
    Vectorized,
    Parallel,
}

/// One loop dimension of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Dim {
    pub var: String,
    pub kind: ForKind,
}

impl Dim {
    fn serial(var: impl Into<String>) -> Self {
        Self { var: var.into(), kind: ForKind::Serial }
    }
}

/// A reduction variable with its domain `[min, min + extent - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionVariable {
    pub var: String,
    pub min: ExprRef,
    pub extent: ExprRef,
}

impl ReductionVariable {
    pub fn new(var: impl Into<String>, min: i64, extent: i64) -> Self {
        Self { var: var.into(), min: Expr::int(min), extent: Expr::int(extent) }
    }
}

/// A user-supplied size estimate on an output dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub var: String,
    pub min: ExprRef,
    pub extent: ExprRef,
}

/// Loop structure of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSchedule {
    dims: Vec<Dim>,
    rvars: Vec<ReductionVariable>,
}

impl StageSchedule {
    /// Ordered dim list, innermost first, ending with [`OUTERMOST`].
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn rvars(&self) -> &[ReductionVariable] {
        &self.rvars
    }
}

/// One definition of a function: the pure definition or one update.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    args: Vec<ExprRef>,
    values: Vec<ExprRef>,
    schedule: StageSchedule,
}

impl Definition {
    /// Left-hand-side index expressions.
    pub fn args(&self) -> &[ExprRef] {
        &self.args
    }

    /// Value expressions, one per tuple component.
    pub fn values(&self) -> &[ExprRef] {
        &self.values
    }

    pub fn schedule(&self) -> &StageSchedule {
        &self.schedule
    }
}

#[derive(Debug)]
struct FuncContents {
    name: String,
    args: Vec<String>,
    output_types: Vec<DType>,
    init: Option<Definition>,
    updates: Vec<Definition>,
    estimates: Vec<Estimate>,
    directives: Vec<String>,
    /// Strong handles to non-self callees, so a pipeline stays alive as long
    /// as any of its consumers does.
    callees: Vec<Function>,
}

/// Weak reference to a function, embedded in call expressions.
///
/// Weak so that self-referential updates (`f(x) = f(x) + ...`) do not keep
/// their own function alive through its definition.
#[derive(Clone)]
pub struct FunctionRef(Weak<RefCell<FuncContents>>);

impl FunctionRef {
    pub fn upgrade(&self) -> Option<Function> {
        self.0.upgrade().map(|contents| Function { contents })
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(func) => write!(f, "FunctionRef({})", func.name()),
            None => f.write_str("FunctionRef(<dropped>)"),
        }
    }
}

/// Handle to a pipeline function.
#[derive(Clone)]
pub struct Function {
    contents: Rc<RefCell<FuncContents>>,
}

impl Function {
    pub fn new(name: impl Into<String>, args: &[&str], output_types: Vec<DType>) -> Self {
        Self {
            contents: Rc::new(RefCell::new(FuncContents {
                name: name.into(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
                output_types,
                init: None,
                updates: Vec::new(),
                estimates: Vec::new(),
                directives: Vec::new(),
                callees: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        self.contents.borrow().name.clone()
    }

    /// Pure variable names, in order (innermost first).
    pub fn args(&self) -> Vec<String> {
        self.contents.borrow().args.clone()
    }

    pub fn output_types(&self) -> Vec<DType> {
        self.contents.borrow().output_types.clone()
    }

    /// A function is pure when it has no update definitions.
    pub fn is_pure(&self) -> bool {
        self.contents.borrow().updates.is_empty()
    }

    /// Number of stages: the pure definition plus every update.
    pub fn num_stages(&self) -> usize {
        1 + self.contents.borrow().updates.len()
    }

    /// Value expressions of the pure definition.
    pub fn values(&self) -> Vec<ExprRef> {
        self.contents
            .borrow()
            .init
            .as_ref()
            .map(|def| def.values.clone())
            .unwrap_or_default()
    }

    pub fn updates(&self) -> Vec<Definition> {
        self.contents.borrow().updates.clone()
    }

    /// The definition of stage `stage_num` (0 = pure, `k >= 1` = update
    /// `k - 1`).
    pub fn definition(&self, stage_num: usize) -> Result<Definition> {
        let contents = self.contents.borrow();
        if stage_num == 0 {
            contents.init.clone().ok_or_else(|| {
                UpdateBeforeDefinitionSnafu { func: contents.name.clone() }.build()
            })
        } else {
            contents.updates.get(stage_num - 1).cloned().ok_or_else(|| {
                StageOutOfRangeSnafu {
                    func: contents.name.clone(),
                    stage_num,
                    num_stages: 1 + contents.updates.len(),
                }
                .build()
            })
        }
    }

    pub fn estimates(&self) -> Vec<Estimate> {
        self.contents.borrow().estimates.clone()
    }

    /// Attach a literal size estimate to an output dimension.
    pub fn set_estimate(&self, var: impl Into<String>, min: i64, extent: i64) {
        self.contents.borrow_mut().estimates.push(Estimate {
            var: var.into(),
            min: Expr::int(min),
            extent: Expr::int(extent),
        });
    }

    /// Give the function its pure definition. Dims are the pure args plus
    /// the trailing outermost marker.
    pub fn define(&self, values: Vec<ExprRef>) -> Result<()> {
        {
            let contents = self.contents.borrow();
            snafu::ensure!(contents.init.is_none(), AlreadyDefinedSnafu { func: contents.name.clone() });
        }
        self.register_callees(&values);
        let mut contents = self.contents.borrow_mut();
        let args: Vec<ExprRef> = contents.args.iter().map(|a| Expr::var(a.as_str())).collect();
        let mut dims: Vec<Dim> = contents.args.iter().map(|a| Dim::serial(a.as_str())).collect();
        dims.push(Dim::serial(OUTERMOST));
        contents.init = Some(Definition {
            args,
            values,
            schedule: StageSchedule { dims, rvars: Vec::new() },
        });
        Ok(())
    }

    /// Append an update definition. Dims are the pure args, then the
    /// update's reduction variables, then the outermost marker.
    pub fn add_update(
        &self,
        lhs_args: Vec<ExprRef>,
        values: Vec<ExprRef>,
        rvars: Vec<ReductionVariable>,
    ) -> Result<()> {
        {
            let contents = self.contents.borrow();
            snafu::ensure!(
                contents.init.is_some(),
                UpdateBeforeDefinitionSnafu { func: contents.name.clone() }
            );
        }
        self.register_callees(&lhs_args);
        self.register_callees(&values);
        let mut contents = self.contents.borrow_mut();
        let mut dims: Vec<Dim> = contents.args.iter().map(|a| Dim::serial(a.as_str())).collect();
        dims.extend(rvars.iter().map(|r| Dim::serial(r.var.as_str())));
        dims.push(Dim::serial(OUTERMOST));
        contents.updates.push(Definition {
            args: lhs_args,
            values,
            schedule: StageSchedule { dims, rvars },
        });
        Ok(())
    }

    /// Build a call to this function at the given index expressions.
    pub fn call(&self, args: Vec<ExprRef>) -> ExprRef {
        let contents = self.contents.borrow();
        Rc::new(Expr::Call {
            name: contents.name.clone(),
            call_type: CallType::Pipeline,
            dtype: contents.output_types[0],
            args,
            func: Some(FunctionRef(Rc::downgrade(&self.contents))),
        })
    }

    /// Direct non-self callees, in first-seen order.
    pub fn callees(&self) -> Vec<Function> {
        self.contents.borrow().callees.clone()
    }

    fn register_callees(&self, exprs: &[ExprRef]) {
        let own_name = self.name();
        for e in exprs {
            self.register_callees_in(e, &own_name);
        }
    }

    fn register_callees_in(&self, e: &ExprRef, own_name: &str) {
        if let Expr::Call { name, call_type: CallType::Pipeline, func: Some(func), .. } = e.as_ref()
        {
            if name != own_name {
                if let Some(callee) = func.upgrade() {
                    let mut contents = self.contents.borrow_mut();
                    if !contents.callees.iter().any(|c| c.name() == *name) {
                        contents.callees.push(callee);
                    }
                }
            }
        }
        for child in e.children() {
            self.register_callees_in(child, own_name);
        }
    }

    // Schedule facade.

    pub fn compute_root(&self) {
        let line = format!("{}.compute_root();", self.name());
        self.contents.borrow_mut().directives.push(line);
    }

    pub fn compute_inline(&self) {
        let line = format!("{}.compute_inline();", self.name());
        self.contents.borrow_mut().directives.push(line);
    }

    /// Handle for applying directives to one stage.
    pub fn stage(&self, stage_num: usize) -> Stage {
        Stage { func: self.clone(), stage_num }
    }

    /// Applied directives, in application order.
    pub fn directives(&self) -> Vec<String> {
        self.contents.borrow().directives.clone()
    }

    fn log(&self, line: String) {
        self.contents.borrow_mut().directives.push(line);
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.contents, &other.contents)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name())
    }
}

/// Handle to one stage of a function, for directive application.
#[derive(Clone)]
pub struct Stage {
    func: Function,
    stage_num: usize,
}

impl Stage {
    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn stage_num(&self) -> usize {
        self.stage_num
    }

    /// How this stage is addressed in the textual schedule: the function
    /// name for the pure definition, `name.update(k - 1)` for update `k`.
    pub fn label(&self) -> String {
        if self.stage_num == 0 {
            self.func.name()
        } else {
            format!("{}.update({})", self.func.name(), self.stage_num - 1)
        }
    }

    /// Current dim list of this stage.
    pub fn dims(&self) -> Result<Vec<Dim>> {
        Ok(self.func.definition(self.stage_num)?.schedule.dims)
    }

    /// Split `var` into `outer * factor + inner`. The inner variable takes
    /// `var`'s position in the loop order; the outer lands just outside it.
    pub fn split(&self, var: &str, outer: &str, inner: &str, factor: i64) -> Result<()> {
        self.with_dims(|dims| {
            let pos = find_dim(dims, var)?;
            let kind = dims[pos].kind;
            dims[pos] = Dim { var: inner.to_string(), kind };
            dims.insert(pos + 1, Dim { var: outer.to_string(), kind });
            Ok(())
        })?;
        self.func.log(format!("{}.split({var}, {outer}, {inner}, {factor});", self.label()));
        Ok(())
    }

    /// Reposition the listed variables so they occur in the given order
    /// (innermost first) within the slots they currently occupy.
    pub fn reorder(&self, order: &[String]) -> Result<()> {
        self.with_dims(|dims| {
            let mut positions = Vec::with_capacity(order.len());
            for var in order {
                let pos = find_dim(dims, var)?;
                if positions.contains(&pos) {
                    return DuplicateReorderVarSnafu {
                        func: String::new(),
                        stage: String::new(),
                        var: var.clone(),
                    }
                    .fail();
                }
                positions.push(pos);
            }
            let moved: Vec<Dim> = positions.iter().map(|&p| dims[p].clone()).collect();
            let mut slots = positions.clone();
            slots.sort_unstable();
            for (slot, dim) in slots.into_iter().zip(moved) {
                dims[slot] = dim;
            }
            Ok(())
        })?;
        self.func.log(format!("{}.reorder({});", self.label(), order.join(", ")));
        Ok(())
    }

    pub fn vectorize(&self, var: &str) -> Result<()> {
        self.set_kind(var, ForKind::Vectorized)?;
        self.func.log(format!("{}.vectorize({var});", self.label()));
        Ok(())
    }

    pub fn parallel(&self, var: &str) -> Result<()> {
        self.set_kind(var, ForKind::Parallel)?;
        self.func.log(format!("{}.parallel({var});", self.label()));
        Ok(())
    }

    fn set_kind(&self, var: &str, kind: ForKind) -> Result<()> {
        self.with_dims(|dims| {
            let pos = find_dim(dims, var)?;
            dims[pos].kind = kind;
            Ok(())
        })
    }

    fn with_dims<T>(&self, f: impl FnOnce(&mut Vec<Dim>) -> Result<T>) -> Result<T> {
        let mut contents = self.func.contents.borrow_mut();
        let (name, num_stages) = (contents.name.clone(), 1 + contents.updates.len());
        let def = if self.stage_num == 0 {
            contents.init.as_mut()
        } else {
            contents.updates.get_mut(self.stage_num - 1)
        };
        let def = def.ok_or_else(|| {
            StageOutOfRangeSnafu { func: name.clone(), stage_num: self.stage_num, num_stages }
                .build()
        })?;
        f(&mut def.schedule.dims).map_err(|e| contextualize(e, &name, self.stage_num))
    }
}

fn find_dim(dims: &[Dim], var: &str) -> Result<usize> {
    dims.iter().position(|d| d.var == var).ok_or_else(|| {
        UnknownDimensionSnafu { func: String::new(), stage: String::new(), var: var.to_string() }
            .build()
    })
}

/// Fill in the function/stage names that `find_dim` cannot see.
fn contextualize(e: crate::error::Error, func: &str, stage_num: usize) -> crate::error::Error {
    use crate::error::Error;
    let stage = if stage_num == 0 { "pure".to_string() } else { format!("update({})", stage_num - 1) };
    match e {
        Error::UnknownDimension { var, .. } => {
            Error::UnknownDimension { func: func.to_string(), stage, var }
        }
        Error::DuplicateReorderVar { var, .. } => {
            Error::DuplicateReorderVar { func: func.to_string(), stage, var }
        }
        other => other,
    }
}

/// Whether a reduction variable can be parallelized without a race.
///
/// Conservative: distinct values of `var` must write distinct sites (the
/// variable appears verbatim as one of the left-hand-side arguments), and
/// every recursive load of the function inside the update must read exactly
/// the site being written.
pub fn can_parallelize_rvar(var: &str, func: &str, def: &Definition) -> bool {
    let writes_distinct = def
        .args()
        .iter()
        .any(|arg| matches!(arg.as_ref(), Expr::Var(v) if v == var));
    if !writes_distinct {
        return false;
    }
    def.values().iter().all(|value| self_reads_match(value, func, def.args()))
}

fn self_reads_match(e: &ExprRef, func: &str, lhs: &[ExprRef]) -> bool {
    if let Expr::Call { name, call_type: CallType::Pipeline, args, .. } = e.as_ref() {
        if name == func && args.as_slice() != lhs {
            return false;
        }
    }
    e.children().into_iter().all(|child| self_reads_match(child, func, lhs))
}
