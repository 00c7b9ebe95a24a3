//! Finite-domain decision procedure
//!
//! The default [`ConstraintSolver`]. It is deliberately narrow:
//!
//! 1. Top-level literals over a single variable (`a·x + c <= 0`, `a·x + c == 0`
//!    and their negations) narrow that variable's interval or exclude a value.
//!    This step is exact.
//! 2. Whatever remains is checked by enumeration. If the product of the
//!    remaining variables' domains fits the budget the search is exhaustive
//!    and a miss proves unsatisfiability; otherwise only boundary candidates
//!    are tried and a miss is `Unknown`.

use pmetric_core::{
    Assignment, Atom, CmpOp, ConstraintSolver, Domain, Formula, PathConstraintSet, SolverError,
    SolverOutcome, Value,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Default number of assignments examined per query
pub const DEFAULT_ENUMERATION_BUDGET: u64 = 200_000;

/// Interval-narrowing plus bounded enumeration over declared input domains
#[derive(Debug, Clone)]
pub struct DomainSolver {
    enumeration_budget: u64,
}

impl DomainSolver {
    pub fn new() -> Self {
        Self {
            enumeration_budget: DEFAULT_ENUMERATION_BUDGET,
        }
    }

    pub fn with_budget(enumeration_budget: u64) -> Self {
        Self { enumeration_budget }
    }
}

impl Default for DomainSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSolver for DomainSolver {
    fn name(&self) -> &str {
        "domain"
    }

    fn solve(
        &self,
        constraints: &PathConstraintSet,
        timeout: Duration,
    ) -> Result<SolverOutcome, SolverError> {
        let deadline = Instant::now().checked_add(timeout);
        Ok(self.solve_inner(constraints, deadline))
    }
}

// ============================================================================
// Domains
// ============================================================================

#[derive(Debug, Clone)]
struct IntDomain {
    lo: i128,
    hi: i128,
    excluded: BTreeSet<i128>,
}

impl IntDomain {
    fn new(min: i64, max: i64) -> Self {
        Self {
            lo: i128::from(min),
            hi: i128::from(max),
            excluded: BTreeSet::new(),
        }
    }

    fn at_most(&mut self, bound: i128) {
        self.hi = self.hi.min(bound);
    }

    fn at_least(&mut self, bound: i128) {
        self.lo = self.lo.max(bound);
    }

    /// Move the bounds past excluded values
    fn tighten(&mut self) {
        while self.lo <= self.hi && self.excluded.contains(&self.lo) {
            self.lo += 1;
        }
        while self.lo <= self.hi && self.excluded.contains(&self.hi) {
            self.hi -= 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    fn contains(&self, v: i128) -> bool {
        self.lo <= v && v <= self.hi && !self.excluded.contains(&v)
    }

    fn size(&self) -> u128 {
        if self.is_empty() {
            return 0;
        }
        let inside = self.excluded.range(self.lo..=self.hi).count() as u128;
        (self.hi - self.lo + 1) as u128 - inside
    }

    /// Allowed value closest to zero, preferring the non-negative side
    fn preferred(&self) -> Option<i64> {
        let start = 0i128.clamp(self.lo, self.hi.max(self.lo));
        for k in 0..=(self.excluded.len() as i128 + 1) {
            for v in [start + k, start - k] {
                if self.contains(v) {
                    return i64::try_from(v).ok();
                }
            }
        }
        None
    }

    fn values(&self) -> impl Iterator<Item = i64> + '_ {
        (self.lo..=self.hi)
            .filter(|v| !self.excluded.contains(v))
            .filter_map(|v| i64::try_from(v).ok())
    }
}

fn floor_div(n: i128, d: i128) -> i128 {
    if d > 0 {
        n.div_euclid(d)
    } else {
        (-n).div_euclid(-d)
    }
}

fn ceil_div(n: i128, d: i128) -> i128 {
    -floor_div(-n, d)
}

// ============================================================================
// Solving
// ============================================================================

struct Domains<'a> {
    ints: BTreeMap<&'a str, IntDomain>,
    bools: BTreeMap<&'a str, Option<bool>>,
}

impl<'a> Domains<'a> {
    fn new(constraints: &'a PathConstraintSet) -> Self {
        let mut ints = BTreeMap::new();
        let mut bools = BTreeMap::new();
        for input in &constraints.variables {
            match input.domain {
                Domain::Int { min, max } => {
                    ints.insert(input.name.as_str(), IntDomain::new(min, max));
                }
                Domain::Bool => {
                    bools.insert(input.name.as_str(), None);
                }
            }
        }
        Self { ints, bools }
    }

    /// Apply a literal if it is directly narrowable; `Some(false)` on a conflict
    fn narrow(&mut self, literal: &Formula) -> Option<bool> {
        match literal {
            Formula::Const(b) => Some(*b),
            Formula::Var(name) => self.fix_bool(name, true),
            Formula::Atom(atom) => self.narrow_atom(atom, true),
            Formula::Not(inner) => match inner.as_ref() {
                Formula::Var(name) => self.fix_bool(name, false),
                Formula::Atom(atom) => self.narrow_atom(atom, false),
                _ => None,
            },
            _ => None,
        }
    }

    fn fix_bool(&mut self, name: &str, value: bool) -> Option<bool> {
        let slot = self.bools.get_mut(name)?;
        match slot {
            Some(existing) => Some(*existing == value),
            None => {
                *slot = Some(value);
                Some(true)
            }
        }
    }

    fn narrow_atom(&mut self, atom: &Atom, holds: bool) -> Option<bool> {
        let (var, a) = atom.expr.single_var()?;
        let domain = self.ints.get_mut(var)?;
        let a = i128::from(a);
        let c = i128::from(atom.expr.constant);

        match (atom.op, holds) {
            (CmpOp::Eq, true) => {
                if (-c) % a != 0 {
                    return Some(false);
                }
                let v = -c / a;
                domain.at_least(v);
                domain.at_most(v);
            }
            (CmpOp::Eq, false) => {
                if (-c) % a == 0 {
                    domain.excluded.insert(-c / a);
                }
            }
            // a·x + c <= 0
            (_, true) => {
                if a > 0 {
                    domain.at_most(floor_div(-c, a));
                } else {
                    domain.at_least(ceil_div(-c, a));
                }
            }
            // a·x + c >= 1
            (_, false) => {
                if a > 0 {
                    domain.at_least(ceil_div(1 - c, a));
                } else {
                    domain.at_most(floor_div(1 - c, a));
                }
            }
        }
        domain.tighten();
        Some(!domain.is_empty())
    }

    /// Every variable at its preferred value
    fn baseline(&self) -> Option<Assignment> {
        let mut assignment = Assignment::new();
        for (name, domain) in &self.ints {
            assignment.insert(*name, Value::Int(domain.preferred()?));
        }
        for (name, fixed) in &self.bools {
            assignment.insert(*name, Value::Bool(fixed.unwrap_or(false)));
        }
        Some(assignment)
    }
}

impl DomainSolver {
    fn solve_inner(&self, constraints: &PathConstraintSet, deadline: Option<Instant>) -> SolverOutcome {
        let conjunction = constraints.conjunction();
        let literals: Vec<&Formula> = match &conjunction {
            Formula::And(parts) => parts.iter().collect(),
            other => vec![other],
        };

        let mut domains = Domains::new(constraints);
        let mut residual = Vec::new();
        for literal in literals {
            match domains.narrow(literal) {
                Some(true) => {}
                Some(false) => return SolverOutcome::Unsatisfiable,
                None => residual.push(literal),
            }
        }
        if domains.ints.values().any(IntDomain::is_empty) {
            return SolverOutcome::Unsatisfiable;
        }

        let Some(baseline) = domains.baseline() else {
            return SolverOutcome::Unsatisfiable;
        };
        if residual.is_empty() {
            return if constraints.is_satisfied_by(&baseline) {
                SolverOutcome::Satisfiable(baseline)
            } else {
                SolverOutcome::Unknown("narrowed model fails validation".into())
            };
        }

        // Variables the residual constraints mention
        let mut int_vars = BTreeSet::new();
        let mut bool_vars = BTreeSet::new();
        for formula in &residual {
            for atom in formula.atoms() {
                int_vars.extend(atom.expr.vars().filter(|v| domains.ints.contains_key(v)));
            }
            bool_vars.extend(formula.bool_vars().into_iter().filter(|v| domains.bools.contains_key(v)));
        }

        let space = int_vars
            .iter()
            .map(|v| domains.ints[v].size())
            .chain(bool_vars.iter().map(|v| if domains.bools[v].is_some() { 1 } else { 2 }))
            .fold(1u128, u128::saturating_mul);
        let exhaustive = space <= u128::from(self.enumeration_budget);

        let mut axes: Vec<(&str, Vec<Value>)> = Vec::new();
        for &var in &int_vars {
            let domain = &domains.ints[var];
            let values: Vec<Value> = if exhaustive {
                domain.values().map(Value::Int).collect()
            } else {
                candidates(var, domain, &residual, &baseline)
                    .into_iter()
                    .map(Value::Int)
                    .collect()
            };
            axes.push((var, values));
        }
        for &var in &bool_vars {
            let values = match domains.bools[var] {
                Some(b) => vec![Value::Bool(b)],
                None => vec![Value::Bool(false), Value::Bool(true)],
            };
            axes.push((var, values));
        }

        match search(&axes, &baseline, &residual, self.enumeration_budget, deadline) {
            Search::Found(model) => {
                if constraints.is_satisfied_by(&model) {
                    SolverOutcome::Satisfiable(model)
                } else {
                    SolverOutcome::Unknown("enumerated model fails validation".into())
                }
            }
            Search::Exhausted if exhaustive => SolverOutcome::Unsatisfiable,
            Search::Exhausted | Search::OutOfBudget => {
                SolverOutcome::Unknown("no model among boundary candidates".into())
            }
            Search::TimedOut => SolverOutcome::Unknown("solver timeout".into()),
        }
    }
}

/// Boundary values of `var` for each residual atom, plus its domain edges
fn candidates(var: &str, domain: &IntDomain, residual: &[&Formula], baseline: &Assignment) -> Vec<i64> {
    let mut points: BTreeSet<i128> = BTreeSet::new();
    points.extend([domain.lo, domain.lo + 1, domain.hi - 1, domain.hi]);
    if let Some(p) = domain.preferred() {
        points.insert(i128::from(p));
    }

    for formula in residual {
        for atom in formula.atoms() {
            let Some(&a) = atom.expr.coeffs.get(var) else {
                continue;
            };
            // Value of the rest of the expression with everything else at baseline
            let mut rest = i128::from(atom.expr.constant);
            let mut known = true;
            for (other, c) in &atom.expr.coeffs {
                if other == var {
                    continue;
                }
                match baseline.get_int(other) {
                    Some(v) => rest += i128::from(*c) * i128::from(v),
                    None => known = false,
                }
            }
            if !known {
                continue;
            }
            let a = i128::from(a);
            let root = floor_div(-rest, a);
            points.extend([root - 1, root, root + 1, root + 2]);
        }
    }

    points
        .into_iter()
        .filter(|v| domain.contains(*v))
        .filter_map(|v| i64::try_from(v).ok())
        .collect()
}

enum Search {
    Found(Assignment),
    Exhausted,
    OutOfBudget,
    TimedOut,
}

/// Odometer enumeration of the cartesian product of `axes`
fn search(
    axes: &[(&str, Vec<Value>)],
    baseline: &Assignment,
    residual: &[&Formula],
    budget: u64,
    deadline: Option<Instant>,
) -> Search {
    if axes.iter().any(|(_, values)| values.is_empty()) {
        return Search::Exhausted;
    }

    let mut index = vec![0usize; axes.len()];
    let mut examined: u64 = 0;
    loop {
        if examined >= budget {
            return Search::OutOfBudget;
        }
        if examined % 4096 == 0 && deadline.is_some_and(|d| Instant::now() >= d) {
            return Search::TimedOut;
        }
        examined += 1;

        let mut model = baseline.clone();
        for ((name, values), i) in axes.iter().zip(&index) {
            model.insert(*name, values[*i]);
        }
        if residual.iter().all(|f| f.eval(&model) == Some(true)) {
            return Search::Found(model);
        }

        // Advance the odometer
        let mut axis = 0;
        loop {
            if axis == axes.len() {
                return Search::Exhausted;
            }
            index[axis] += 1;
            if index[axis] < axes[axis].1.len() {
                break;
            }
            index[axis] = 0;
            axis += 1;
        }
    }
}
