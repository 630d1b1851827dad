//! Best-effort symbolic simplification.
//!
//! The bounds machinery builds interval endpoints like `(min + extent) - 1`
//! and the cost model needs to know when those are integer literals. This
//! pass folds integer arithmetic, applies the usual algebraic identities,
//! and re-associates additive chains of literals. Anything it cannot reduce
//! is returned intact; downstream code treats non-literal endpoints as
//! unknown extents.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::expr::{substitute, BinaryOp, Expr, ExprRef};

pub fn simplify(e: &ExprRef) -> ExprRef {
    match e.as_ref() {
        Expr::IntImm(_)
        | Expr::UIntImm(_)
        | Expr::FloatImm(_)
        | Expr::StrImm(_)
        | Expr::Var(_)
        | Expr::Lowered(_) => e.clone(),
        Expr::Cast { dtype, value } => {
            let value = simplify(value);
            Expr::cast(*dtype, value)
        }
        Expr::Binary { op, a, b } => simplify_binary(*op, &simplify(a), &simplify(b)),
        Expr::Not(value) => {
            let value = simplify(value);
            match value.as_int() {
                Some(v) => Expr::int((v == 0) as i64),
                None => Rc::new(Expr::Not(value)),
            }
        }
        Expr::Select { cond, then_case, else_case } => {
            let cond = simplify(cond);
            let then_case = simplify(then_case);
            let else_case = simplify(else_case);
            match cond.as_int() {
                Some(0) => else_case,
                Some(_) => then_case,
                None => Expr::select(cond, then_case, else_case),
            }
        }
        Expr::Let { name, value, body } => {
            let value = simplify(value);
            // Cheap bindings are substituted away; let-folding beyond that
            // is out of scope for the scheduler.
            if matches!(value.as_ref(), Expr::IntImm(_) | Expr::FloatImm(_) | Expr::Var(_)) {
                let mut subs = BTreeMap::new();
                subs.insert(name.clone(), value);
                simplify(&substitute(body, &subs))
            } else {
                Expr::let_(name.clone(), value, simplify(body))
            }
        }
        Expr::Call { name, call_type, dtype, args, func } => Rc::new(Expr::Call {
            name: name.clone(),
            call_type: *call_type,
            dtype: *dtype,
            args: args.iter().map(simplify).collect(),
            func: func.clone(),
        }),
    }
}

fn simplify_binary(op: BinaryOp, a: &ExprRef, b: &ExprRef) -> ExprRef {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if let Some(folded) = fold_int(op, x, y) {
            return Expr::int(folded);
        }
    }

    match op {
        BinaryOp::Add => {
            if a.as_int() == Some(0) {
                return b.clone();
            }
            if b.as_int() == Some(0) {
                return a.clone();
            }
            // (x + c1) + c2 => x + (c1 + c2), so chained offsets fold.
            if let Some(c2) = b.as_int() {
                if let Expr::Binary { op: BinaryOp::Add, a: x, b: c1 } = a.as_ref() {
                    if let Some(c1) = c1.as_int() {
                        return simplify_binary(BinaryOp::Add, x, &Expr::int(c1 + c2));
                    }
                }
                if let Expr::Binary { op: BinaryOp::Sub, a: x, b: c1 } = a.as_ref() {
                    if let Some(c1) = c1.as_int() {
                        return simplify_binary(BinaryOp::Add, x, &Expr::int(c2 - c1));
                    }
                }
            }
            Expr::add(a.clone(), b.clone())
        }
        BinaryOp::Sub => {
            if b.as_int() == Some(0) {
                return a.clone();
            }
            if a == b {
                return Expr::int(0);
            }
            // Route x - c through the additive folder.
            if let Some(c) = b.as_int() {
                return simplify_binary(BinaryOp::Add, a, &Expr::int(-c));
            }
            Expr::sub(a.clone(), b.clone())
        }
        BinaryOp::Mul => {
            if a.as_int() == Some(0) || b.as_int() == Some(0) {
                return Expr::int(0);
            }
            if a.as_int() == Some(1) {
                return b.clone();
            }
            if b.as_int() == Some(1) {
                return a.clone();
            }
            Expr::mul(a.clone(), b.clone())
        }
        BinaryOp::Div => {
            if b.as_int() == Some(1) {
                return a.clone();
            }
            Expr::div(a.clone(), b.clone())
        }
        BinaryOp::Min | BinaryOp::Max => {
            if a == b {
                return a.clone();
            }
            Expr::binary(op, a.clone(), b.clone())
        }
        _ => Expr::binary(op, a.clone(), b.clone()),
    }
}

/// Integer folding for one operator. `None` when the operation is undefined
/// (division by zero) so the node is left intact.
fn fold_int(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    let v = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0 {
                return None;
            }
            a % b
        }
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::Eq => (a == b) as i64,
        BinaryOp::Ne => (a != b) as i64,
        BinaryOp::Lt => (a < b) as i64,
        BinaryOp::Le => (a <= b) as i64,
        BinaryOp::Gt => (a > b) as i64,
        BinaryOp::Ge => (a >= b) as i64,
        BinaryOp::And => ((a != 0) && (b != 0)) as i64,
        BinaryOp::Or => ((a != 0) || (b != 0)) as i64,
    };
    Some(v)
}
