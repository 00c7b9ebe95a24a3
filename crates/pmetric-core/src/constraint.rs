//! Path-constraint language and the solver boundary
//!
//! Branch conditions collected along a path are translated into boolean
//! combinations of linear integer atoms over the routine inputs. Atoms are
//! kept in a canonical `expr <= 0` / `expr == 0` form so that a condition
//! and its negation map onto the same atom, which lets the BDD skeleton
//! check spot contradictions syntactically.

use crate::routine::{Domain, InputDecl, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Linear expressions
// ============================================================================

/// `Σ coeff·var + constant` over integer inputs
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinearExpr {
    /// Non-zero coefficients, keyed by variable name
    pub coeffs: BTreeMap<String, i64>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(name.into(), 1);
        Self {
            coeffs,
            constant: 0,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// `Some((var, coeff))` when exactly one variable occurs
    pub fn single_var(&self) -> Option<(&str, i64)> {
        if self.coeffs.len() == 1 {
            self.coeffs.iter().next().map(|(v, c)| (v.as_str(), *c))
        } else {
            None
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.coeffs.keys().map(String::as_str)
    }

    /// Checked sum; `None` on overflow
    pub fn add(&self, other: &LinearExpr) -> Option<LinearExpr> {
        let mut coeffs = self.coeffs.clone();
        for (var, c) in &other.coeffs {
            let entry = coeffs.entry(var.clone()).or_insert(0);
            *entry = entry.checked_add(*c)?;
        }
        coeffs.retain(|_, c| *c != 0);
        Some(LinearExpr {
            coeffs,
            constant: self.constant.checked_add(other.constant)?,
        })
    }

    pub fn sub(&self, other: &LinearExpr) -> Option<LinearExpr> {
        self.add(&other.scale(-1)?)
    }

    pub fn scale(&self, factor: i64) -> Option<LinearExpr> {
        if factor == 0 {
            return Some(LinearExpr::constant(0));
        }
        let mut coeffs = BTreeMap::new();
        for (var, c) in &self.coeffs {
            coeffs.insert(var.clone(), c.checked_mul(factor)?);
        }
        Some(LinearExpr {
            coeffs,
            constant: self.constant.checked_mul(factor)?,
        })
    }

    pub fn offset(&self, delta: i64) -> Option<LinearExpr> {
        Some(LinearExpr {
            coeffs: self.coeffs.clone(),
            constant: self.constant.checked_add(delta)?,
        })
    }

    /// Evaluate under an assignment; `None` if a variable is missing or not an integer
    pub fn eval(&self, assignment: &Assignment) -> Option<i128> {
        let mut total = i128::from(self.constant);
        for (var, c) in &self.coeffs {
            let value = assignment.get_int(var)?;
            total = total.checked_add(i128::from(*c) * i128::from(value))?;
        }
        Some(total)
    }

    fn leading_coeff(&self) -> Option<i64> {
        self.coeffs.values().next().copied()
    }

    fn coeff_gcd(&self) -> i64 {
        self.coeffs
            .values()
            .fold(0u64, |g, c| gcd(g, c.unsigned_abs()))
            .try_into()
            .unwrap_or(1)
    }

    fn divide_coeffs(&self, g: i64) -> BTreeMap<String, i64> {
        self.coeffs
            .iter()
            .map(|(v, c)| (v.clone(), c / g))
            .collect()
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b) + i64::from(a.rem_euclid(b) != 0)
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, c) in &self.coeffs {
            let magnitude = c.unsigned_abs();
            if first {
                if *c < 0 {
                    write!(f, "-")?;
                }
            } else if *c < 0 {
                write!(f, " - ")?;
            } else {
                write!(f, " + ")?;
            }
            if magnitude == 1 {
                write!(f, "{}", var)?;
            } else {
                write!(f, "{}*{}", magnitude, var)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", self.constant.unsigned_abs())
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Atoms and formulas
// ============================================================================

/// Comparison of an expression against zero
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Canonical linear atom `expr op 0`, with `op` either `Le` or `Eq`.
///
/// Coefficients are divided by their gcd and the leading coefficient is
/// positive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Atom {
    pub expr: LinearExpr,
    pub op: CmpOp,
}

impl Atom {
    pub fn holds(&self, assignment: &Assignment) -> Option<bool> {
        let value = self.expr.eval(assignment)?;
        Some(match self.op {
            CmpOp::Eq => value == 0,
            _ => value <= 0,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} 0", self.expr, self.op.symbol())
    }
}

/// Boolean combination of linear atoms and boolean inputs
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    Const(bool),
    /// A boolean input variable
    Var(String),
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// Build `expr op 0` in canonical form; `None` if normalisation overflows
    pub fn compare(expr: LinearExpr, op: CmpOp) -> Option<Formula> {
        match op {
            CmpOp::Le => canonical_le(expr),
            CmpOp::Lt => canonical_le(expr.offset(1)?),
            CmpOp::Gt => Some(Formula::not(canonical_le(expr)?)),
            CmpOp::Ge => Some(Formula::not(canonical_le(expr.offset(1)?)?)),
            CmpOp::Eq => canonical_eq(expr),
            CmpOp::Ne => Some(Formula::not(canonical_eq(expr)?)),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Formula::Var(name.into())
    }

    pub fn not(formula: Formula) -> Self {
        match formula {
            Formula::Const(b) => Formula::Const(!b),
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    pub fn and(parts: Vec<Formula>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::Const(true) => {}
                Formula::Const(false) => return Formula::Const(false),
                Formula::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::Const(true),
            1 => flat.pop().unwrap_or(Formula::Const(true)),
            _ => Formula::And(flat),
        }
    }

    pub fn or(parts: Vec<Formula>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::Const(false) => {}
                Formula::Const(true) => return Formula::Const(true),
                Formula::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::Const(false),
            1 => flat.pop().unwrap_or(Formula::Const(false)),
            _ => Formula::Or(flat),
        }
    }

    /// Evaluate under an assignment; `None` if a variable is unbound or mistyped
    pub fn eval(&self, assignment: &Assignment) -> Option<bool> {
        match self {
            Formula::Const(b) => Some(*b),
            Formula::Var(name) => assignment.get_bool(name),
            Formula::Atom(atom) => atom.holds(assignment),
            Formula::Not(inner) => inner.eval(assignment).map(|b| !b),
            Formula::And(parts) => {
                for part in parts {
                    if !part.eval(assignment)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Formula::Or(parts) => {
                for part in parts {
                    if part.eval(assignment)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
        }
    }

    /// Distinct atoms in first-occurrence order
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.walk(&mut |f| {
            if let Formula::Atom(atom) = f {
                if !out.contains(&atom) {
                    out.push(atom);
                }
            }
        });
        out
    }

    /// Boolean input variables referenced directly
    pub fn bool_vars(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |f| {
            if let Formula::Var(name) = f {
                out.insert(name.as_str());
            }
        });
        out
    }

    /// True when the formula is a conjunction of (possibly negated) atoms and variables
    pub fn is_conjunctive(&self) -> bool {
        match self {
            Formula::Const(_) | Formula::Var(_) | Formula::Atom(_) => true,
            Formula::Not(inner) => matches!(**inner, Formula::Var(_) | Formula::Atom(_)),
            Formula::And(parts) => parts.iter().all(Formula::is_conjunctive),
            Formula::Or(_) => false,
        }
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Formula)) {
        visit(self);
        match self {
            Formula::Not(inner) => inner.walk(visit),
            Formula::And(parts) | Formula::Or(parts) => {
                for part in parts {
                    part.walk(visit);
                }
            }
            Formula::Const(_) | Formula::Var(_) | Formula::Atom(_) => {}
        }
    }
}

fn canonical_le(expr: LinearExpr) -> Option<Formula> {
    if expr.is_constant() {
        return Some(Formula::Const(expr.constant <= 0));
    }
    let g = expr.coeff_gcd();
    let expr = if g > 1 {
        LinearExpr {
            coeffs: expr.divide_coeffs(g),
            constant: ceil_div(expr.constant, g),
        }
    } else {
        expr
    };
    if expr.leading_coeff().is_some_and(|c| c < 0) {
        // e <= 0  <=>  !(-e + 1 <= 0)
        let flipped = expr.scale(-1)?.offset(1)?;
        return Some(Formula::not(Formula::Atom(Atom {
            expr: flipped,
            op: CmpOp::Le,
        })));
    }
    Some(Formula::Atom(Atom {
        expr,
        op: CmpOp::Le,
    }))
}

fn canonical_eq(expr: LinearExpr) -> Option<Formula> {
    if expr.is_constant() {
        return Some(Formula::Const(expr.constant == 0));
    }
    let g = expr.coeff_gcd();
    if g > 1 && expr.constant % g != 0 {
        return Some(Formula::Const(false));
    }
    let expr = if g > 1 {
        LinearExpr {
            coeffs: expr.divide_coeffs(g),
            constant: expr.constant / g,
        }
    } else {
        expr
    };
    let expr = if expr.leading_coeff().is_some_and(|c| c < 0) {
        expr.scale(-1)?
    } else {
        expr
    };
    Some(Formula::Atom(Atom {
        expr,
        op: CmpOp::Eq,
    }))
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Const(b) => write!(f, "{}", b),
            Formula::Var(name) => write!(f, "{}", name),
            Formula::Atom(atom) => write!(f, "{}", atom),
            Formula::Not(inner) => write!(f, "!({})", inner),
            Formula::And(parts) | Formula::Or(parts) => {
                let joiner = if matches!(self, Formula::And(_)) { " && " } else { " || " };
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Constraint sets
// ============================================================================

/// The formula contributed by one branch decision of a path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathConstraint {
    /// Index into the path's decision list
    pub decision: usize,
    pub formula: Formula,
}

/// Everything a solver needs to find inputs driving one path
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathConstraintSet {
    /// Input variables in declaration order, with their domains
    pub variables: Vec<InputDecl>,
    pub constraints: Vec<PathConstraint>,
    /// Number of operations concretised instead of modelled
    pub approximations: usize,
}

impl PathConstraintSet {
    pub fn new(variables: Vec<InputDecl>) -> Self {
        Self {
            variables,
            constraints: Vec::new(),
            approximations: 0,
        }
    }

    pub fn push(&mut self, decision: usize, formula: Formula) {
        self.constraints.push(PathConstraint { decision, formula });
    }

    pub fn domain_of(&self, name: &str) -> Option<Domain> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.domain)
    }

    /// Conjunction of every constraint
    pub fn conjunction(&self) -> Formula {
        Formula::and(self.constraints.iter().map(|c| c.formula.clone()).collect())
    }

    /// True when the assignment is in-domain and satisfies every constraint
    pub fn is_satisfied_by(&self, assignment: &Assignment) -> bool {
        let in_domain = self.variables.iter().all(|v| {
            assignment
                .get(&v.name)
                .is_some_and(|value| v.domain.contains(value))
        });
        in_domain
            && self
                .constraints
                .iter()
                .all(|c| c.formula.eval(assignment) == Some(true))
    }
}

/// Concrete values for the input variables
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(BTreeMap<String, Value>);

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_int)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Solver boundary
// ============================================================================

/// Answer to a satisfiability query
#[derive(Clone, Debug, PartialEq)]
pub enum SolverOutcome {
    Satisfiable(Assignment),
    Unsatisfiable,
    /// The solver gave up (timeout, budget, unsupported constraint)
    Unknown(String),
}

/// Solver configuration failure; fatal to the whole exploration
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("{0}")]
    Unavailable(String),
}

/// A decision procedure over path constraints
pub trait ConstraintSolver {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Find an in-domain assignment satisfying every constraint, within `timeout`
    fn solve(
        &self,
        constraints: &PathConstraintSet,
        timeout: Duration,
    ) -> Result<SolverOutcome, SolverError>;
}
