//! Concrete execution of a control-flow graph
//!
//! Used to replay solver models and probe inputs. Execution is bounded by a
//! step budget ("fuel") so that non-terminating inputs still yield an
//! observation.

use pmetric_core::{Assignment, BinaryOp, Expr, OpaqueFn, UnaryOp, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cfg::{ControlFlowGraph, NodeId, NodeKind};
use crate::paths::PathSignature;

/// How a concrete run ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Outcome {
    Returned { value: Option<Value> },
    Raised { message: String },
    /// Runtime error: division by zero, overflow, type error
    Fault { reason: String },
    FuelExhausted,
}

/// Observation of one concrete run
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    pub decisions: Vec<(NodeId, bool)>,
    /// Terminal node reached, `None` after a fault or fuel exhaustion
    pub terminal: Option<NodeId>,
    pub outcome: Outcome,
}

impl Execution {
    pub fn signature(&self) -> PathSignature {
        PathSignature {
            decisions: self.decisions.clone(),
            terminal: self.terminal,
        }
    }
}

/// Run the graph on concrete inputs for at most `fuel` node visits
pub fn execute(cfg: &ControlFlowGraph, inputs: &Assignment, fuel: usize) -> Execution {
    let mut store: HashMap<String, Value> = inputs
        .iter()
        .map(|(name, value)| (name.clone(), *value))
        .collect();
    let mut decisions = Vec::new();
    let mut node = cfg.entry();

    for _ in 0..fuel {
        match &cfg.node(node).kind {
            NodeKind::Entry { next } => node = *next,
            NodeKind::Assign { target, value, next } => match eval(value, &store) {
                Ok(v) => {
                    store.insert(target.clone(), v);
                    node = *next;
                }
                Err(reason) => return fault(decisions, reason),
            },
            NodeKind::Branch {
                cond,
                on_true,
                on_false,
                ..
            } => match eval(cond, &store) {
                Ok(Value::Bool(taken)) => {
                    decisions.push((node, taken));
                    node = if taken { *on_true } else { *on_false };
                }
                Ok(Value::Int(_)) => {
                    return fault(decisions, format!("condition {} is not boolean", cond))
                }
                Err(reason) => return fault(decisions, reason),
            },
            NodeKind::Return { value } => {
                let value = match value.as_ref().map(|e| eval(e, &store)).transpose() {
                    Ok(v) => v,
                    Err(reason) => return fault(decisions, reason),
                };
                return Execution {
                    decisions,
                    terminal: Some(node),
                    outcome: Outcome::Returned { value },
                };
            }
            NodeKind::Raise { message } => {
                return Execution {
                    decisions,
                    terminal: Some(node),
                    outcome: Outcome::Raised {
                        message: message.clone(),
                    },
                };
            }
        }
    }

    Execution {
        decisions,
        terminal: None,
        outcome: Outcome::FuelExhausted,
    }
}

fn fault(decisions: Vec<(NodeId, bool)>, reason: String) -> Execution {
    Execution {
        decisions,
        terminal: None,
        outcome: Outcome::Fault { reason },
    }
}

/// Evaluate an expression against a concrete store
pub fn eval(expr: &Expr, store: &HashMap<String, Value>) -> Result<Value, String> {
    match expr {
        Expr::Int(v) => Ok(Value::Int(*v)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => store
            .get(name)
            .copied()
            .ok_or_else(|| format!("variable '{}' read before assignment", name)),
        Expr::Unary { op, operand } => {
            let v = eval(operand, store)?;
            match (op, v) {
                (UnaryOp::Neg, Value::Int(i)) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow".to_string()),
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                _ => Err(format!("type error in {}", expr)),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, store)?;
            let r = eval(rhs, store)?;
            apply_binary(*op, l, r).ok_or_else(|| binary_error(*op, l, r, expr))
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|a| match eval(a, store)? {
                    Value::Int(i) => Ok(i),
                    Value::Bool(_) => Err(format!("{} expects integer arguments", function.name())),
                })
                .collect::<Result<Vec<i64>, String>>()?;
            call(*function, &values)
        }
    }
}

/// Apply an opaque function, mapping failure to a runtime error message
pub fn call(function: OpaqueFn, args: &[i64]) -> Result<Value, String> {
    function
        .apply(args)
        .map(Value::Int)
        .ok_or_else(|| format!("{} failed on {:?}", function.name(), args))
}

/// Concrete semantics of binary operators; `None` on runtime error
pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int),
            BinaryOp::Div => a.checked_div(b).map(Value::Int),
            BinaryOp::Rem => a.checked_rem(b).map(Value::Int),
            BinaryOp::Eq => Some(Value::Bool(a == b)),
            BinaryOp::Ne => Some(Value::Bool(a != b)),
            BinaryOp::Lt => Some(Value::Bool(a < b)),
            BinaryOp::Le => Some(Value::Bool(a <= b)),
            BinaryOp::Gt => Some(Value::Bool(a > b)),
            BinaryOp::Ge => Some(Value::Bool(a >= b)),
            BinaryOp::And | BinaryOp::Or => None,
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And => Some(Value::Bool(a && b)),
            BinaryOp::Or => Some(Value::Bool(a || b)),
            BinaryOp::Eq => Some(Value::Bool(a == b)),
            BinaryOp::Ne => Some(Value::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn binary_error(op: BinaryOp, lhs: Value, rhs: Value, expr: &Expr) -> String {
    match (op, rhs) {
        (BinaryOp::Div | BinaryOp::Rem, Value::Int(0)) => "division by zero".to_string(),
        _ if matches!((lhs, rhs), (Value::Int(_), Value::Int(_)))
            && !op.is_comparison()
            && !op.is_logical() =>
        {
            "integer overflow".to_string()
        }
        _ => format!("type error in {}", expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmetric_core::{Domain, Routine, Stmt};
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn with_x(v: i64) -> Assignment {
        Assignment::new().with("x", Value::Int(v))
    }

    fn classify() -> ControlFlowGraph {
        let routine = Routine::new("classify")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::if_then(x().lt(Expr::int(0)), vec![Stmt::raise("negative")]),
                Stmt::assign("y", Expr::int(100).div(x())),
                Stmt::ret(Expr::var("y")),
            ]);
        ControlFlowGraph::build(&routine).unwrap()
    }

    #[test]
    fn returns_value() {
        let run = execute(&classify(), &with_x(4), 100);
        assert_eq!(
            run.outcome,
            Outcome::Returned {
                value: Some(Value::Int(25))
            }
        );
        assert!(run.terminal.is_some());
        assert_eq!(run.decisions.len(), 1);
        assert!(!run.decisions[0].1);
    }

    #[test]
    fn raises() {
        let run = execute(&classify(), &with_x(-1), 100);
        assert_eq!(
            run.outcome,
            Outcome::Raised {
                message: "negative".into()
            }
        );
    }

    #[test]
    fn division_by_zero_faults() {
        let run = execute(&classify(), &with_x(0), 100);
        assert_eq!(
            run.outcome,
            Outcome::Fault {
                reason: "division by zero".into()
            }
        );
        assert_eq!(run.terminal, None);
    }

    #[test]
    fn fuel_bounds_infinite_loops() {
        let routine = Routine::new("spin")
            .input("x", Domain::int(0, 10))
            .with_body(vec![Stmt::while_loop(Expr::bool(true), vec![])]);
        let cfg = ControlFlowGraph::build(&routine).unwrap();
        let run = execute(&cfg, &with_x(1), 50);
        assert_eq!(run.outcome, Outcome::FuelExhausted);
        assert_eq!(run.terminal, None);
    }

    #[test]
    fn overflow_faults() {
        let mut store = HashMap::new();
        store.insert("x".to_string(), Value::Int(i64::MAX));
        let err = eval(&x().add(Expr::int(1)), &store).unwrap_err();
        assert_eq!(err, "integer overflow");
    }

    #[test]
    fn type_errors_fault() {
        let mut store = HashMap::new();
        store.insert("x".to_string(), Value::Bool(true));
        assert!(eval(&x().add(Expr::int(1)), &store)
            .unwrap_err()
            .starts_with("type error"));
    }

    #[test]
    fn truncating_division_semantics() {
        let store = HashMap::new();
        assert_eq!(
            eval(&Expr::int(-7).div(Expr::int(2)), &store),
            Ok(Value::Int(-3))
        );
        assert_eq!(
            eval(&Expr::int(-7).rem(Expr::int(2)), &store),
            Ok(Value::Int(-1))
        );
    }
}
