//! Pipeline expressions.
//!
//! Pre-lowering scalar expressions over pure variables, reduction variables,
//! and calls into other pipeline stages or input images. The scheduler
//! consumes these read-only: it walks them for costs, call discovery, and
//! symbolic bounds. Nodes that only exist after lowering (loads, stores,
//! loops, allocations) are represented by the [`Expr::Lowered`] sentinel so
//! that reaching one can be reported as a contract violation instead of
//! silently producing garbage costs.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use mosaic_dtype::DType;
use smallvec::SmallVec;

use crate::func::FunctionRef;

/// Shared expression handle.
///
/// Expressions form trees (DAGs after substitution) and are immutable once
/// built. `Rc` keeps the IR single-threaded by design, matching the rest of
/// the scheduler.
pub type ExprRef = Rc<Expr>;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Comparison and logical operators produce booleans.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::And | Self::Or
        )
    }
}

/// What a call refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Another function in the pipeline.
    Pipeline,
    /// An external input image.
    Image,
    /// An opaque extern stage with no cost visibility.
    Extern,
    /// A known intrinsic with unit cost.
    Intrinsic,
}

/// Post-lowering node kinds that must never reach the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoweredKind {
    Load,
    Store,
    For,
    Realize,
    Allocate,
    Provide,
    Free,
    Block,
    IfThenElse,
    Evaluate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntImm(i64),
    UIntImm(u64),
    FloatImm(f64),
    StrImm(String),
    Var(String),
    Cast {
        dtype: DType,
        value: ExprRef,
    },
    Binary {
        op: BinaryOp,
        a: ExprRef,
        b: ExprRef,
    },
    Not(ExprRef),
    Select {
        cond: ExprRef,
        then_case: ExprRef,
        else_case: ExprRef,
    },
    Let {
        name: String,
        value: ExprRef,
        body: ExprRef,
    },
    Call {
        name: String,
        call_type: CallType,
        dtype: DType,
        args: Vec<ExprRef>,
        /// Resolved handle for pipeline calls; `None` for images, externs,
        /// and intrinsics. Weak so that self-referential updates do not keep
        /// their own function alive.
        func: Option<FunctionRef>,
    },
    /// Sentinel for IR that only exists after lowering.
    Lowered(LoweredKind),
}

impl Expr {
    /// All direct children, in evaluation order.
    pub fn children(&self) -> SmallVec<[&ExprRef; 4]> {
        match self {
            Self::IntImm(_)
            | Self::UIntImm(_)
            | Self::FloatImm(_)
            | Self::StrImm(_)
            | Self::Var(_)
            | Self::Lowered(_) => SmallVec::new(),
            Self::Cast { value, .. } | Self::Not(value) => SmallVec::from_slice(&[value]),
            Self::Binary { a, b, .. } => SmallVec::from_slice(&[a, b]),
            Self::Select { cond, then_case, else_case } => {
                SmallVec::from_slice(&[cond, then_case, else_case])
            }
            Self::Let { value, body, .. } => SmallVec::from_slice(&[value, body]),
            Self::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Result type of this expression.
    ///
    /// Loop indices and immediates are 32-bit; calls and casts carry their
    /// own type. This is only consulted for byte widths, so the integer
    /// width conventions are inconsequential as long as they are stable.
    pub fn dtype(&self) -> DType {
        match self {
            Self::IntImm(_) | Self::Var(_) => DType::Int32,
            Self::UIntImm(_) => DType::UInt32,
            Self::FloatImm(_) => DType::Float32,
            Self::StrImm(_) | Self::Lowered(_) => DType::Handle,
            Self::Cast { dtype, .. } | Self::Call { dtype, .. } => *dtype,
            Self::Binary { op, a, .. } => {
                if op.is_predicate() {
                    DType::Bool
                } else {
                    a.dtype()
                }
            }
            Self::Not(_) => DType::Bool,
            Self::Select { then_case, .. } => then_case.dtype(),
            Self::Let { body, .. } => body.dtype(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::IntImm(v) => Some(*v),
            _ => None,
        }
    }

    // Constructor shorthands.

    pub fn int(v: i64) -> ExprRef {
        Rc::new(Self::IntImm(v))
    }

    pub fn float(v: f64) -> ExprRef {
        Rc::new(Self::FloatImm(v))
    }

    pub fn var(name: impl Into<String>) -> ExprRef {
        Rc::new(Self::Var(name.into()))
    }

    pub fn cast(dtype: DType, value: ExprRef) -> ExprRef {
        Rc::new(Self::Cast { dtype, value })
    }

    pub fn binary(op: BinaryOp, a: ExprRef, b: ExprRef) -> ExprRef {
        Rc::new(Self::Binary { op, a, b })
    }

    pub fn add(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Add, a, b)
    }

    pub fn sub(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Mul, a, b)
    }

    pub fn div(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Div, a, b)
    }

    pub fn min(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Min, a, b)
    }

    pub fn max(a: ExprRef, b: ExprRef) -> ExprRef {
        Self::binary(BinaryOp::Max, a, b)
    }

    pub fn select(cond: ExprRef, then_case: ExprRef, else_case: ExprRef) -> ExprRef {
        Rc::new(Self::Select { cond, then_case, else_case })
    }

    pub fn let_(name: impl Into<String>, value: ExprRef, body: ExprRef) -> ExprRef {
        Rc::new(Self::Let { name: name.into(), value, body })
    }

    /// A load from an external input image.
    pub fn image(name: impl Into<String>, dtype: DType, args: Vec<ExprRef>) -> ExprRef {
        Rc::new(Self::Call { name: name.into(), call_type: CallType::Image, dtype, args, func: None })
    }

    /// A call to an opaque extern stage.
    pub fn extern_call(name: impl Into<String>, dtype: DType, args: Vec<ExprRef>) -> ExprRef {
        Rc::new(Self::Call { name: name.into(), call_type: CallType::Extern, dtype, args, func: None })
    }

    /// A call to a known intrinsic.
    pub fn intrinsic(name: impl Into<String>, dtype: DType, args: Vec<ExprRef>) -> ExprRef {
        Rc::new(Self::Call {
            name: name.into(),
            call_type: CallType::Intrinsic,
            dtype,
            args,
            func: None,
        })
    }
}

/// Replace free occurrences of variables with the mapped expressions.
///
/// `Let` bindings shadow: a bound name is not substituted inside its body.
pub fn substitute(e: &ExprRef, subs: &BTreeMap<String, ExprRef>) -> ExprRef {
    if subs.is_empty() {
        return e.clone();
    }
    match e.as_ref() {
        Expr::Var(name) => match subs.get(name) {
            Some(replacement) => replacement.clone(),
            None => e.clone(),
        },
        Expr::IntImm(_)
        | Expr::UIntImm(_)
        | Expr::FloatImm(_)
        | Expr::StrImm(_)
        | Expr::Lowered(_) => e.clone(),
        Expr::Cast { dtype, value } => Expr::cast(*dtype, substitute(value, subs)),
        Expr::Binary { op, a, b } => Expr::binary(*op, substitute(a, subs), substitute(b, subs)),
        Expr::Not(value) => Rc::new(Expr::Not(substitute(value, subs))),
        Expr::Select { cond, then_case, else_case } => Expr::select(
            substitute(cond, subs),
            substitute(then_case, subs),
            substitute(else_case, subs),
        ),
        Expr::Let { name, value, body } => {
            let new_value = substitute(value, subs);
            let new_body = if subs.contains_key(name) {
                let mut inner = subs.clone();
                inner.remove(name);
                substitute(body, &inner)
            } else {
                substitute(body, subs)
            };
            Expr::let_(name.clone(), new_value, new_body)
        }
        Expr::Call { name, call_type, dtype, args, func } => Rc::new(Expr::Call {
            name: name.clone(),
            call_type: *call_type,
            dtype: *dtype,
            args: args.iter().map(|a| substitute(a, subs)).collect(),
            func: func.clone(),
        }),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntImm(v) => write!(f, "{v}"),
            Self::UIntImm(v) => write!(f, "{v}u"),
            Self::FloatImm(v) => write!(f, "{v}f"),
            Self::StrImm(s) => write!(f, "{s:?}"),
            Self::Var(name) => f.write_str(name),
            Self::Cast { dtype, value } => write!(f, "{dtype}({value})"),
            Self::Binary { op, a, b } => {
                let sym = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "%",
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "&&",
                    BinaryOp::Or => "||",
                    BinaryOp::Min => return write!(f, "min({a}, {b})"),
                    BinaryOp::Max => return write!(f, "max({a}, {b})"),
                };
                write!(f, "({a} {sym} {b})")
            }
            Self::Not(value) => write!(f, "!{value}"),
            Self::Select { cond, then_case, else_case } => {
                write!(f, "select({cond}, {then_case}, {else_case})")
            }
            Self::Let { name, value, body } => write!(f, "(let {name} = {value} in {body})"),
            Self::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Lowered(kind) => write!(f, "<lowered {kind:?}>"),
        }
    }
}
