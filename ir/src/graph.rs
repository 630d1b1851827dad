//! Call-graph discovery and realization order.
//!
//! The scheduler's environment is the set of functions reachable from the
//! pipeline outputs. Discovery walks the resolved call handles embedded in
//! expressions; ordering is a deterministic DFS post-order so producers
//! always precede their consumers and two runs see identical orders.

use std::collections::{BTreeMap, BTreeSet};

use crate::expr::{CallType, Expr, ExprRef};
use crate::func::Function;

/// Collect the names of all pipeline and image calls in an expression.
pub fn find_calls_in_expr(e: &ExprRef, calls: &mut BTreeSet<String>) {
    if let Expr::Call { name, call_type, .. } = e.as_ref() {
        if matches!(call_type, CallType::Pipeline | CallType::Image) {
            calls.insert(name.clone());
        }
    }
    for child in e.children() {
        find_calls_in_expr(child, calls);
    }
}

/// Names of all pipeline and image calls made anywhere in a function's
/// definitions, including update left-hand sides.
pub fn calls_in_function(f: &Function) -> BTreeSet<String> {
    let mut calls = BTreeSet::new();
    for stage in 0..f.num_stages() {
        if let Ok(def) = f.definition(stage) {
            for e in def.values().iter().chain(def.args().iter()) {
                find_calls_in_expr(e, &mut calls);
            }
        }
    }
    calls
}

/// Names of the calls made by one stage's definition.
pub fn calls_in_definition(def: &crate::func::Definition) -> BTreeSet<String> {
    let mut calls = BTreeSet::new();
    for e in def.values().iter().chain(def.args().iter()) {
        find_calls_in_expr(e, &mut calls);
    }
    calls
}

/// Pipeline functions called directly by `f`, keyed by name.
pub fn find_direct_calls(f: &Function) -> BTreeMap<String, Function> {
    f.callees().into_iter().map(|callee| (callee.name(), callee)).collect()
}

/// All pipeline functions reachable from `f`, including `f` itself.
pub fn find_transitive_calls(f: &Function) -> BTreeMap<String, Function> {
    let mut env = BTreeMap::new();
    let mut pending = vec![f.clone()];
    while let Some(func) = pending.pop() {
        let name = func.name();
        if env.contains_key(&name) {
            continue;
        }
        pending.extend(func.callees());
        env.insert(name, func);
    }
    env
}

/// Topological order over `env`: producers first, outputs last.
///
/// Callees are visited in name order, so the result is deterministic for a
/// given pipeline. Pipelines are DAGs; a cycle is an internal error.
pub fn realization_order(outputs: &[Function], env: &BTreeMap<String, Function>) -> Vec<String> {
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    let mut in_progress = BTreeSet::new();
    for out in outputs {
        visit(&out.name(), env, &mut visited, &mut in_progress, &mut order);
    }
    order
}

fn visit(
    name: &str,
    env: &BTreeMap<String, Function>,
    visited: &mut BTreeSet<String>,
    in_progress: &mut BTreeSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(name) {
        return;
    }
    let Some(func) = env.get(name) else {
        return;
    };
    assert!(in_progress.insert(name.to_string()), "pipeline call graph has a cycle at {name}");
    let callees: BTreeSet<String> = func.callees().iter().map(Function::name).collect();
    for callee in &callees {
        visit(callee, env, visited, in_progress, order);
    }
    in_progress.remove(name);
    visited.insert(name.to_string());
    order.push(name.to_string());
}
