//! Constraint-programming backend (feature `cp-solver`)
//!
//! Posts conjunctive path constraints to the Pumpkin CP solver. Each input
//! becomes a bounded integer (booleans are `0..=1`) and each literal a
//! linear (in)equality. Disjunctions and values outside the 32-bit range are
//! reported as `Unknown` so the engine falls back to probing.

use pmetric_core::{
    Assignment, Atom, CmpOp, ConstraintSolver, Domain, Formula, PathConstraintSet, SolverError,
    SolverOutcome, Value,
};
use pumpkin_solver::constraints as cp;
use pumpkin_solver::results::{ProblemSolution, SatisfactionResult};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{AffineView, DomainId, TransformableVariable};
use pumpkin_solver::Solver;
use std::collections::BTreeMap;
use std::time::Duration;

/// Satisfiability checks through the Pumpkin CP solver
#[derive(Debug, Clone, Default)]
pub struct CpSolver;

impl CpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintSolver for CpSolver {
    fn name(&self) -> &str {
        "pumpkin"
    }

    fn solve(
        &self,
        constraints: &PathConstraintSet,
        timeout: Duration,
    ) -> Result<SolverOutcome, SolverError> {
        let conjunction = constraints.conjunction();
        if !conjunction.is_conjunctive() {
            return Ok(SolverOutcome::Unknown(
                "disjunctive constraints are not supported by the CP backend".into(),
            ));
        }

        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();

        let mut vars: BTreeMap<&str, (DomainId, bool)> = BTreeMap::new();
        for input in &constraints.variables {
            let (lo, hi, is_bool) = match input.domain {
                Domain::Int { min, max } => match (i32::try_from(min), i32::try_from(max)) {
                    (Ok(lo), Ok(hi)) => (lo, hi, false),
                    _ => {
                        return Ok(SolverOutcome::Unknown(format!(
                            "domain of '{}' exceeds the 32-bit range",
                            input.name
                        )))
                    }
                },
                Domain::Bool => (0, 1, true),
            };
            vars.insert(input.name.as_str(), (solver.new_bounded_integer(lo, hi), is_bool));
        }

        let literals: Vec<&Formula> = match &conjunction {
            Formula::And(parts) => parts.iter().collect(),
            other => vec![other],
        };
        for literal in literals {
            let (rel, terms, rhs) = match lower(&vars, literal) {
                Ok(Lowered::Trivial(true)) => continue,
                Ok(Lowered::Trivial(false)) => return Ok(SolverOutcome::Unsatisfiable),
                Ok(Lowered::Linear { rel, terms, rhs }) => (rel, terms, rhs),
                Err(reason) => return Ok(SolverOutcome::Unknown(reason)),
            };
            let constraint = match rel {
                Relation::Eq => cp::equals(terms, rhs, tag),
                Relation::Ne => cp::not_equals(terms, rhs, tag),
                Relation::Le => cp::less_than_or_equals(terms, rhs, tag),
                Relation::Ge => cp::greater_than_or_equals(terms, rhs, tag),
            };
            // A root-level conflict means the constraints are already contradictory
            if solver.add_constraint(constraint).post().is_err() {
                return Ok(SolverOutcome::Unsatisfiable);
            }
        }

        let mut brancher = solver.default_brancher();
        let mut termination = TimeBudget::starting_now(timeout);
        let outcome = match solver.satisfy(&mut brancher, &mut termination) {
            SatisfactionResult::Satisfiable(solution) => {
                let mut model = Assignment::new();
                for (name, (var, is_bool)) in &vars {
                    let value = solution.get_integer_value(*var);
                    let value = if *is_bool {
                        Value::Bool(value != 0)
                    } else {
                        Value::Int(i64::from(value))
                    };
                    model.insert(*name, value);
                }
                SolverOutcome::Satisfiable(model)
            }
            SatisfactionResult::Unsatisfiable => SolverOutcome::Unsatisfiable,
            SatisfactionResult::Unknown => SolverOutcome::Unknown("solver timeout".into()),
        };
        Ok(outcome)
    }
}

/// A literal lowered to `Σ c·x rel rhs`
enum Lowered {
    Trivial(bool),
    Linear {
        rel: Relation,
        terms: Vec<AffineView<DomainId>>,
        rhs: i32,
    },
}

#[derive(Clone, Copy)]
enum Relation {
    Eq,
    Ne,
    Le,
    Ge,
}

fn lower(vars: &BTreeMap<&str, (DomainId, bool)>, literal: &Formula) -> Result<Lowered, String> {
    let (formula, holds) = match literal {
        Formula::Not(inner) => (inner.as_ref(), false),
        other => (other, true),
    };

    match formula {
        Formula::Const(b) => Ok(Lowered::Trivial(*b == holds)),
        Formula::Var(name) => {
            let (var, _) = vars
                .get(name.as_str())
                .ok_or_else(|| format!("unknown boolean '{}'", name))?;
            Ok(Lowered::Linear {
                rel: Relation::Eq,
                terms: vec![var.scaled(1)],
                rhs: i32::from(holds),
            })
        }
        Formula::Atom(atom) => {
            let (terms, rhs) = linear_terms(vars, atom)?;
            let (rel, rhs) = match (atom.op, holds) {
                (CmpOp::Eq, true) => (Relation::Eq, rhs),
                (CmpOp::Eq, false) => (Relation::Ne, rhs),
                (_, true) => (Relation::Le, rhs),
                (_, false) => (
                    Relation::Ge,
                    rhs.checked_add(1)
                        .ok_or_else(|| "constant exceeds the 32-bit range".to_string())?,
                ),
            };
            Ok(Lowered::Linear { rel, terms, rhs })
        }
        _ => Err(format!("non-literal constraint {}", literal)),
    }
}

/// `Σ c·x` terms and the right-hand side of `Σ c·x op -constant`
fn linear_terms(
    vars: &BTreeMap<&str, (DomainId, bool)>,
    atom: &Atom,
) -> Result<(Vec<AffineView<DomainId>>, i32), String> {
    let mut terms = Vec::with_capacity(atom.expr.coeffs.len());
    for (name, coeff) in &atom.expr.coeffs {
        let (var, _) = vars
            .get(name.as_str())
            .ok_or_else(|| format!("unknown variable '{}'", name))?;
        let coeff = i32::try_from(*coeff).map_err(|_| format!("coefficient of '{}' exceeds the 32-bit range", name))?;
        terms.push(var.scaled(coeff));
    }
    let rhs = atom
        .expr
        .constant
        .checked_neg()
        .and_then(|c| i32::try_from(c).ok())
        .ok_or_else(|| "constant exceeds the 32-bit range".to_string())?;
    Ok((terms, rhs))
}
