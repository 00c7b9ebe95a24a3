//! Concolic translation of a path into constraints
//!
//! Walks an enumerated path with two stores side by side: a symbolic store
//! mapping variables to linear expressions or formulas over the inputs, and
//! a concrete shadow store seeded with input values. Linear integer
//! arithmetic is modelled exactly. Non-linear products, division by
//! non-constant values and opaque calls are replaced by their shadow value,
//! and each such concretisation is counted in `approximations`.
//!
//! [`translate_pinned`] seeds the shadow store from a concrete run and adds
//! equality constraints pinning every concretised operand to its seeded
//! value. A non-linear product keeps its right operand symbolic, scaled by
//! the pinned left one.

use pmetric_core::{
    Assignment, BinaryOp, CmpOp, Domain, Expr, Formula, LinearExpr, PathConstraintSet, UnaryOp,
    Value,
};
use std::collections::HashMap;
use thiserror::Error;

use crate::cfg::{ControlFlowGraph, NodeKind};
use crate::interp;
use crate::paths::ExecutionPath;

/// The path uses something the constraint language cannot express
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ModelGap(pub String);

/// Symbolic value of a variable or expression
#[derive(Clone, Debug, PartialEq)]
pub enum SymValue {
    Int(LinearExpr),
    Bool(Formula),
}

struct State {
    symbolic: HashMap<String, SymValue>,
    shadow: HashMap<String, Value>,
    approximations: usize,
    pinned: bool,
    /// Pins collected since the last branch
    pins: Vec<Formula>,
}

/// Translate the branch decisions of `path` into a constraint set.
///
/// `seed` supplies shadow values for the inputs; missing inputs take their
/// domain default.
pub fn translate(
    cfg: &ControlFlowGraph,
    path: &ExecutionPath,
    seed: &Assignment,
) -> Result<PathConstraintSet, ModelGap> {
    translate_with(cfg, path, seed, false)
}

/// Like [`translate`], with concretised operands pinned to their values
/// under `seed`. Pins are attached to the decision of the branch that
/// follows them.
pub fn translate_pinned(
    cfg: &ControlFlowGraph,
    path: &ExecutionPath,
    seed: &Assignment,
) -> Result<PathConstraintSet, ModelGap> {
    translate_with(cfg, path, seed, true)
}

fn translate_with(
    cfg: &ControlFlowGraph,
    path: &ExecutionPath,
    seed: &Assignment,
    pinned: bool,
) -> Result<PathConstraintSet, ModelGap> {
    let mut state = State {
        symbolic: HashMap::new(),
        shadow: HashMap::new(),
        approximations: 0,
        pinned,
        pins: Vec::new(),
    };
    for input in cfg.inputs() {
        let symbolic = match input.domain {
            Domain::Int { .. } => SymValue::Int(LinearExpr::var(input.name.clone())),
            Domain::Bool => SymValue::Bool(Formula::var(input.name.clone())),
        };
        let shadow = seed
            .get(&input.name)
            .copied()
            .unwrap_or_else(|| input.domain.default_value());
        state.symbolic.insert(input.name.clone(), symbolic);
        state.shadow.insert(input.name.clone(), shadow);
    }

    let mut constraints = PathConstraintSet::new(cfg.inputs().to_vec());
    let mut decisions = path.decisions.iter().enumerate();

    for &node in &path.steps {
        match &cfg.node(node).kind {
            NodeKind::Entry { .. } | NodeKind::Return { .. } | NodeKind::Raise { .. } => {}
            NodeKind::Assign { target, value, .. } => {
                let (symbolic, shadow) = state.eval(value)?;
                state.symbolic.insert(target.clone(), symbolic);
                state.shadow.insert(target.clone(), shadow);
            }
            NodeKind::Branch { cond, .. } => {
                let Some((index, decision)) = decisions.next() else {
                    return Err(ModelGap(format!("path has no decision for node {}", node)));
                };
                if decision.node != node {
                    return Err(ModelGap(format!(
                        "decision {} refers to node {}, path visits node {}",
                        index, decision.node, node
                    )));
                }
                let SymValue::Bool(formula) = state.eval(cond)?.0 else {
                    return Err(ModelGap(format!("condition {} is not boolean", cond)));
                };
                let formula = if decision.taken {
                    formula
                } else {
                    Formula::not(formula)
                };
                for pin in state.pins.drain(..) {
                    constraints.push(index, pin);
                }
                constraints.push(index, formula);
            }
        }
    }

    constraints.approximations = state.approximations;
    Ok(constraints)
}

impl State {
    fn eval(&mut self, expr: &Expr) -> Result<(SymValue, Value), ModelGap> {
        match expr {
            Expr::Int(v) => Ok((SymValue::Int(LinearExpr::constant(*v)), Value::Int(*v))),
            Expr::Bool(b) => Ok((SymValue::Bool(Formula::Const(*b)), Value::Bool(*b))),
            Expr::Var(name) => {
                let symbolic = self.symbolic.get(name).cloned();
                let shadow = self.shadow.get(name).copied();
                symbolic
                    .zip(shadow)
                    .ok_or_else(|| ModelGap(format!("variable '{}' read before assignment", name)))
            }
            Expr::Unary { op, operand } => {
                let (symbolic, shadow) = self.eval(operand)?;
                match (op, symbolic, shadow) {
                    (UnaryOp::Neg, SymValue::Int(e), Value::Int(v)) => {
                        let e = e.scale(-1).ok_or_else(|| overflow(expr))?;
                        let v = v.checked_neg().ok_or_else(|| overflow(expr))?;
                        Ok((SymValue::Int(e), Value::Int(v)))
                    }
                    (UnaryOp::Not, SymValue::Bool(f), Value::Bool(b)) => {
                        Ok((SymValue::Bool(Formula::not(f)), Value::Bool(!b)))
                    }
                    _ => Err(ModelGap(format!("type error in {}", expr))),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let (ls, lv) = self.eval(lhs)?;
                let (rs, rv) = self.eval(rhs)?;
                let shadow = interp::apply_binary(*op, lv, rv).ok_or_else(|| {
                    ModelGap(format!("{} fails under the shadow values", expr))
                })?;
                let symbolic = self.binary(*op, (ls, lv), (rs, rv), shadow, expr)?;
                Ok((symbolic, shadow))
            }
            Expr::Call { function, args } => {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    match self.eval(arg)? {
                        (SymValue::Int(e), Value::Int(v)) => operands.push((e, v)),
                        _ => return Err(ModelGap(format!("type error in {}", expr))),
                    }
                }
                let values: Vec<i64> = operands.iter().map(|(_, v)| *v).collect();
                let shadow = interp::call(*function, &values).map_err(ModelGap)?;
                let Value::Int(v) = shadow else {
                    return Err(ModelGap(format!("type error in {}", expr)));
                };
                if operands.iter().any(|(e, _)| !e.is_constant()) {
                    self.approximations += 1;
                    for (e, value) in &operands {
                        self.pin(e, *value, expr)?;
                    }
                }
                Ok((SymValue::Int(LinearExpr::constant(v)), shadow))
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        (lhs, lv): (SymValue, Value),
        (rhs, rv): (SymValue, Value),
        shadow: Value,
        expr: &Expr,
    ) -> Result<SymValue, ModelGap> {
        match (lhs, rhs) {
            (SymValue::Int(l), SymValue::Int(r)) => {
                let linear = |e: Option<LinearExpr>| e.map(SymValue::Int).ok_or_else(|| overflow(expr));
                match op {
                    BinaryOp::Add => linear(l.add(&r)),
                    BinaryOp::Sub => linear(l.sub(&r)),
                    BinaryOp::Mul if r.is_constant() => linear(l.scale(r.constant)),
                    BinaryOp::Mul if l.is_constant() => linear(r.scale(l.constant)),
                    BinaryOp::Mul if self.pinned => {
                        let Value::Int(left) = lv else {
                            return Err(ModelGap(format!("type error in {}", expr)));
                        };
                        self.approximations += 1;
                        self.pin(&l, left, expr)?;
                        linear(r.scale(left))
                    }
                    BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                        let (Value::Int(v), Value::Int(left), Value::Int(right)) = (shadow, lv, rv)
                        else {
                            return Err(ModelGap(format!("type error in {}", expr)));
                        };
                        if !(l.is_constant() && r.is_constant()) {
                            self.approximations += 1;
                            self.pin(&l, left, expr)?;
                            self.pin(&r, right, expr)?;
                        }
                        Ok(SymValue::Int(LinearExpr::constant(v)))
                    }
                    BinaryOp::Eq => compare(l, r, CmpOp::Eq, expr),
                    BinaryOp::Ne => compare(l, r, CmpOp::Ne, expr),
                    BinaryOp::Lt => compare(l, r, CmpOp::Lt, expr),
                    BinaryOp::Le => compare(l, r, CmpOp::Le, expr),
                    BinaryOp::Gt => compare(l, r, CmpOp::Gt, expr),
                    BinaryOp::Ge => compare(l, r, CmpOp::Ge, expr),
                    BinaryOp::And | BinaryOp::Or => Err(ModelGap(format!("type error in {}", expr))),
                }
            }
            (SymValue::Bool(l), SymValue::Bool(r)) => match op {
                BinaryOp::And => Ok(SymValue::Bool(Formula::and(vec![l, r]))),
                BinaryOp::Or => Ok(SymValue::Bool(Formula::or(vec![l, r]))),
                BinaryOp::Eq => Ok(SymValue::Bool(iff(l, r))),
                BinaryOp::Ne => Ok(SymValue::Bool(Formula::not(iff(l, r)))),
                _ => Err(ModelGap(format!("type error in {}", expr))),
            },
            _ => Err(ModelGap(format!("type error in {}", expr))),
        }
    }

    /// Record `e == value` when pinning and `e` depends on an input
    fn pin(&mut self, e: &LinearExpr, value: i64, expr: &Expr) -> Result<(), ModelGap> {
        if !self.pinned || e.is_constant() {
            return Ok(());
        }
        let SymValue::Bool(formula) = compare(e.clone(), LinearExpr::constant(value), CmpOp::Eq, expr)?
        else {
            return Err(ModelGap(format!("type error in {}", expr)));
        };
        self.pins.push(formula);
        Ok(())
    }
}

fn compare(l: LinearExpr, r: LinearExpr, op: CmpOp, expr: &Expr) -> Result<SymValue, ModelGap> {
    let diff = l.sub(&r).ok_or_else(|| overflow(expr))?;
    Formula::compare(diff, op)
        .map(SymValue::Bool)
        .ok_or_else(|| overflow(expr))
}

fn iff(l: Formula, r: Formula) -> Formula {
    Formula::or(vec![
        Formula::and(vec![l.clone(), r.clone()]),
        Formula::and(vec![Formula::not(l), Formula::not(r)]),
    ])
}

fn overflow(expr: &Expr) -> ModelGap {
    ModelGap(format!("integer overflow in {}", expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathExplorer;
    use pmetric_core::{OpaqueFn, Routine, Stmt};
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn first_path(routine: &Routine) -> (ControlFlowGraph, ExecutionPath) {
        let cfg = ControlFlowGraph::build(routine).unwrap();
        let path = PathExplorer::new(&cfg, 3).paths().next().unwrap();
        (cfg, path)
    }

    fn ints(pairs: &[(&str, i64)]) -> Assignment {
        pairs
            .iter()
            .map(|(n, v)| ((*n).to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn linear_conditions_are_exact() {
        // y = 2x + 1; if y > 7
        let routine = Routine::new("lin")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::assign("y", x().mul(Expr::int(2)).add(Expr::int(1))),
                Stmt::if_then(Expr::var("y").gt(Expr::int(7)), vec![Stmt::ret(Expr::int(1))]),
                Stmt::ret(Expr::int(0)),
            ]);
        let (cfg, path) = first_path(&routine);
        let set = translate(&cfg, &path, &Assignment::new()).unwrap();

        assert_eq!(set.approximations, 0);
        assert_eq!(set.constraints.len(), 1);
        assert_eq!(set.constraints[0].decision, 0);
        assert!(set.is_satisfied_by(&ints(&[("x", 4)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 3)])));
    }

    #[test]
    fn false_branch_is_negated() {
        let routine = Routine::new("neg")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![Stmt::if_else(
                x().ge(Expr::int(5)),
                vec![Stmt::ret(Expr::int(1))],
                vec![Stmt::ret(Expr::int(0))],
            )]);
        let cfg = ControlFlowGraph::build(&routine).unwrap();
        let else_path = PathExplorer::new(&cfg, 3).paths().nth(1).unwrap();
        let set = translate(&cfg, &else_path, &Assignment::new()).unwrap();
        assert!(set.is_satisfied_by(&ints(&[("x", 4)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 5)])));
    }

    #[test]
    fn loop_condition_retranslated_each_iteration() {
        let routine = Routine::new("count")
            .input("x", Domain::int(0, 10))
            .with_body(vec![Stmt::while_loop(
                x().gt(Expr::int(0)),
                vec![Stmt::assign("x", x().sub(Expr::int(1)))],
            )]);
        let cfg = ControlFlowGraph::build(&routine).unwrap();
        // [true, true, false]: exactly two iterations
        let path = PathExplorer::new(&cfg, 3).paths().nth(1).unwrap();
        let set = translate(&cfg, &path, &Assignment::new()).unwrap();
        assert_eq!(set.constraints.len(), 3);
        assert!(set.is_satisfied_by(&ints(&[("x", 2)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 1)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 3)])));
    }

    #[test]
    fn non_linear_terms_are_concretised() {
        let routine = Routine::new("square")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::if_then(x().mul(x()).gt(Expr::int(50)), vec![Stmt::ret(Expr::int(1))]),
                Stmt::if_then(
                    Expr::call(OpaqueFn::Abs, vec![x()]).equals(Expr::int(3)),
                    vec![Stmt::ret(Expr::int(2))],
                ),
                Stmt::ret(Expr::int(0)),
            ]);
        let cfg = ControlFlowGraph::build(&routine).unwrap();
        for path in PathExplorer::new(&cfg, 3).paths() {
            let set = translate(&cfg, &path, &ints(&[("x", 2)])).unwrap();
            assert!(set.approximations >= 1);
        }
    }

    #[test]
    fn pinned_product_keeps_one_operand_symbolic() {
        let routine = Routine::new("product")
            .input("x", Domain::int(-10, 10))
            .input("y", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::if_then(x().mul(Expr::var("y")).gt(Expr::int(10)), vec![Stmt::ret(Expr::int(1))]),
                Stmt::ret(Expr::int(0)),
            ]);
        let (cfg, path) = first_path(&routine);
        let seed = ints(&[("x", -10), ("y", -10)]);

        // unpinned: the product is the constant 100
        let loose = translate(&cfg, &path, &seed).unwrap();
        assert_eq!(loose.constraints.len(), 1);
        assert!(loose.is_satisfied_by(&ints(&[("x", 0), ("y", 0)])));

        // pinned: x == -10 and -10 * y > 10
        let set = translate_pinned(&cfg, &path, &seed).unwrap();
        assert_eq!(set.approximations, 1);
        assert_eq!(set.constraints.len(), 2);
        assert!(set.constraints.iter().all(|c| c.decision == 0));
        assert!(set.is_satisfied_by(&ints(&[("x", -10), ("y", -2)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", -10), ("y", -1)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", -9), ("y", -2)])));
    }

    #[test]
    fn pinned_calls_fix_their_arguments() {
        let routine = Routine::new("near")
            .input("x", Domain::int(0, 20))
            .with_body(vec![
                Stmt::assign("d", Expr::call(OpaqueFn::Abs, vec![x().sub(Expr::int(10))])),
                Stmt::if_then(Expr::var("d").lt(Expr::int(2)), vec![Stmt::ret(Expr::int(1))]),
                Stmt::ret(Expr::int(0)),
            ]);
        let (cfg, path) = first_path(&routine);
        let set = translate_pinned(&cfg, &path, &ints(&[("x", 11)])).unwrap();
        assert_eq!(set.approximations, 1);
        assert!(set.is_satisfied_by(&ints(&[("x", 11)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 10)])));
    }

    #[test]
    fn constant_folding_is_not_an_approximation() {
        let routine = Routine::new("fold")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::assign("k", Expr::int(12).div(Expr::int(4))),
                Stmt::if_then(x().gt(Expr::var("k")), vec![Stmt::ret(Expr::int(1))]),
                Stmt::ret(Expr::int(0)),
            ]);
        let (cfg, path) = first_path(&routine);
        let set = translate(&cfg, &path, &Assignment::new()).unwrap();
        assert_eq!(set.approximations, 0);
        assert!(set.is_satisfied_by(&ints(&[("x", 4)])));
        assert!(!set.is_satisfied_by(&ints(&[("x", 3)])));
    }

    #[test]
    fn boolean_inputs_are_symbolic() {
        let routine = Routine::new("flag")
            .input("f", Domain::Bool)
            .input("x", Domain::int(0, 5))
            .with_body(vec![Stmt::if_then(
                Expr::var("f").and(x().equals(Expr::int(2))),
                vec![Stmt::ret(Expr::int(1))],
            )]);
        let (cfg, path) = first_path(&routine);
        let set = translate(&cfg, &path, &Assignment::new()).unwrap();
        let good = Assignment::new()
            .with("f", Value::Bool(true))
            .with("x", Value::Int(2));
        let bad = Assignment::new()
            .with("f", Value::Bool(false))
            .with("x", Value::Int(2));
        assert!(set.is_satisfied_by(&good));
        assert!(!set.is_satisfied_by(&bad));
    }

    #[test]
    fn type_error_is_a_model_gap() {
        let routine = Routine::new("bad")
            .input("f", Domain::Bool)
            .with_body(vec![Stmt::if_then(
                Expr::var("f").gt(Expr::int(0)),
                vec![Stmt::ret(Expr::int(1))],
            )]);
        let (cfg, path) = first_path(&routine);
        assert!(translate(&cfg, &path, &Assignment::new()).is_err());
    }

    #[test]
    fn shadow_division_by_zero_is_a_model_gap() {
        let routine = Routine::new("div")
            .input("x", Domain::int(-5, 5))
            .with_body(vec![Stmt::if_then(
                Expr::int(10).div(x()).gt(Expr::int(2)),
                vec![Stmt::ret(Expr::int(1))],
            )]);
        let (cfg, path) = first_path(&routine);
        let err = translate(&cfg, &path, &ints(&[("x", 0)])).unwrap_err();
        assert!(err.0.contains("fails under the shadow values"));
        assert!(translate(&cfg, &path, &ints(&[("x", 2)])).is_ok());
    }
}
