//! Exploration driver
//!
//! Enumerates the paths of a routine and resolves each one:
//!
//! - translate the branch decisions into a [`PathConstraintSet`]
//! - reject propositionally contradictory sets with the BDD skeleton check
//! - ask the [`ConstraintSolver`] for a model and replay it concretely
//! - when concretisation got in the way, re-translate once from a concrete
//!   seed with the concretised operands pinned
//! - fall back to probing when the solver cannot decide or the model
//!   does not follow the path
//!
//! A replay that follows a different path than intended is not an error.
//! The observed path is recorded as a divergence-seeded test case and later
//! paths with the same signature are reported as covered by it.

use pmetric_core::{
    Assignment, ConstraintSolver, ExplorationError, PathConstraintSet, Routine, SolverOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bdd;
use crate::cfg::ControlFlowGraph;
use crate::domain::DomainSolver;
use crate::interp::{self, Execution, Outcome};
use crate::paths::{ExecutionPath, PathExplorer, PathId, PathSignature, DEFAULT_UNROLL_BOUND};
use crate::probe::{self, ProbeConfig};
use crate::symbolic;

// ============================================================================
// Configuration
// ============================================================================

/// Global bound on one exploration run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExplorationBudget {
    /// Maximum number of paths resolved; `None` for unbounded
    pub max_paths: Option<usize>,
    /// Wall-clock limit; `None` for unbounded
    pub max_duration: Option<Duration>,
}

impl ExplorationBudget {
    pub fn new() -> Self {
        Self {
            max_paths: Some(256),
            max_duration: Some(Duration::from_secs(10)),
        }
    }

    /// No path or time limit; enumeration is still finite through loop unrolling
    pub fn unbounded() -> Self {
        Self {
            max_paths: None,
            max_duration: None,
        }
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }
}

impl Default for ExplorationBudget {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine tuning knobs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Loop iterations explored per loop entry
    pub unroll_bound: usize,
    /// Per-query solver timeout, capped by the remaining budget
    pub solver_timeout: Duration,
    /// Pseudo-random probe runs per undecided path
    pub probe_attempts: usize,
    pub seed: u64,
    /// Node visits allowed per concrete run
    pub replay_fuel: usize,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self {
            unroll_bound: DEFAULT_UNROLL_BOUND,
            solver_timeout: Duration::from_secs(1),
            probe_attempts: 32,
            seed: 0,
            replay_fuel: 10_000,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Results
// ============================================================================

/// How a test case's inputs were found
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CaseOrigin {
    /// Solver model, confirmed by replay
    Solver,
    /// Boundary or pseudo-random probing
    Probe,
    /// Replay of the model for `diverged_at` followed another path
    DivergenceSeeded { diverged_at: PathId },
}

/// Concrete inputs with the outcome observed when running them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConcreteTestCase {
    pub id: usize,
    /// Enumerated path this case covers; `None` for a seeded case whose
    /// path was never enumerated
    pub path_id: Option<PathId>,
    pub inputs: Assignment,
    pub outcome: Outcome,
    pub origin: CaseOrigin,
}

/// Resolution of one enumerated path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PathStatus {
    /// Covered by the test case with this id
    Feasible { case: usize },
    Infeasible,
    /// Neither solving nor probing settled the path
    Indeterminate { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathReport {
    pub path: ExecutionPath,
    pub status: PathStatus,
    /// Operations concretised while translating the path
    pub approximations: usize,
    /// Rendered constraints in decision order
    pub constraints: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub explored: usize,
    pub feasible: usize,
    pub infeasible: usize,
    pub indeterminate: usize,
    /// Solver models whose replay followed another path
    pub divergences: usize,
    /// Divergence-seeded cases whose path was never enumerated
    pub unmatched_seeds: usize,
    /// The budget ran out before every path was resolved
    pub truncated: bool,
}

/// Output of one `generate_tests` run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestGeneration {
    pub routine: String,
    pub test_cases: Vec<ConcreteTestCase>,
    pub paths: Vec<PathReport>,
    pub coverage: CoverageSummary,
}

// ============================================================================
// Engine
// ============================================================================

/// Concolic test generator over a pluggable solver
#[derive(Debug, Clone)]
pub struct SymbolicEngine<S = DomainSolver> {
    solver: S,
    options: EngineOptions,
}

impl SymbolicEngine<DomainSolver> {
    pub fn new() -> Self {
        Self::with_solver(DomainSolver::new())
    }
}

impl Default for SymbolicEngine<DomainSolver> {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate tests with the default solver and options
pub fn generate_tests(
    routine: &Routine,
    budget: &ExplorationBudget,
) -> Result<TestGeneration, ExplorationError> {
    SymbolicEngine::new().generate_tests(routine, budget)
}

/// Mutable state of one run
struct Exploration {
    test_cases: Vec<ConcreteTestCase>,
    reports: Vec<PathReport>,
    /// Signature -> id of the case covering it
    covered: HashMap<PathSignature, usize>,
    /// Signature -> index of a report not (yet) feasible
    unresolved: HashMap<PathSignature, usize>,
    divergences: usize,
}

impl Exploration {
    fn add_case(
        &mut self,
        path_id: Option<PathId>,
        signature: PathSignature,
        inputs: Assignment,
        outcome: Outcome,
        origin: CaseOrigin,
    ) -> usize {
        let id = self.test_cases.len();
        self.test_cases.push(ConcreteTestCase {
            id,
            path_id,
            inputs,
            outcome,
            origin,
        });
        self.covered.insert(signature, id);
        id
    }

    /// Record the path a diverging replay actually followed
    fn seed(&mut self, diverged_at: PathId, inputs: Assignment, run: Execution) {
        let signature = run.signature();
        if self.covered.contains_key(&signature) {
            return;
        }
        let earlier = self.unresolved.remove(&signature);
        let path_id = earlier.map(|index| self.reports[index].path.id);
        let case = self.add_case(
            path_id,
            signature,
            inputs,
            run.outcome,
            CaseOrigin::DivergenceSeeded { diverged_at },
        );
        if let Some(index) = earlier {
            debug!(path = path_id, case, "upgraded by divergence seed");
            self.reports[index].status = PathStatus::Feasible { case };
        }
    }
}

impl<S: ConstraintSolver> SymbolicEngine<S> {
    pub fn with_solver(solver: S) -> Self {
        Self {
            solver,
            options: EngineOptions::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Explore `routine` within `budget` and produce one test case per
    /// feasible path.
    ///
    /// Only an invalid routine or an unusable solver is an error; per-path
    /// trouble ends up in the path reports.
    pub fn generate_tests(
        &self,
        routine: &Routine,
        budget: &ExplorationBudget,
    ) -> Result<TestGeneration, ExplorationError> {
        let started = Instant::now();
        let deadline = budget.max_duration.and_then(|d| started.checked_add(d));
        let cfg = ControlFlowGraph::build(routine)?;
        let explorer = PathExplorer::new(&cfg, self.options.unroll_bound);

        let mut state = Exploration {
            test_cases: Vec::new(),
            reports: Vec::new(),
            covered: HashMap::new(),
            unresolved: HashMap::new(),
            divergences: 0,
        };
        let mut truncated = false;

        for path in explorer.paths() {
            let out_of_paths = budget.max_paths.is_some_and(|max| state.reports.len() >= max);
            let out_of_time = deadline.is_some_and(|d| Instant::now() >= d);
            if out_of_paths || out_of_time {
                warn!(
                    routine = %routine.name,
                    explored = state.reports.len(),
                    "exploration budget exhausted, results are partial"
                );
                truncated = true;
                break;
            }

            let report = self.resolve(&cfg, path, &mut state, deadline)?;
            debug!(path = report.path.id, status = ?report.status, "path resolved");
            if !matches!(report.status, PathStatus::Feasible { .. }) {
                state.unresolved.insert(report.path.signature(), state.reports.len());
            }
            state.reports.push(report);
        }

        let count = |f: fn(&PathStatus) -> bool| state.reports.iter().filter(|r| f(&r.status)).count();
        let coverage = CoverageSummary {
            explored: state.reports.len(),
            feasible: count(|s| matches!(s, PathStatus::Feasible { .. })),
            infeasible: count(|s| matches!(s, PathStatus::Infeasible)),
            indeterminate: count(|s| matches!(s, PathStatus::Indeterminate { .. })),
            divergences: state.divergences,
            unmatched_seeds: state
                .test_cases
                .iter()
                .filter(|c| c.path_id.is_none())
                .count(),
            truncated,
        };
        info!(
            routine = %routine.name,
            solver = self.solver.name(),
            explored = coverage.explored,
            feasible = coverage.feasible,
            infeasible = coverage.infeasible,
            indeterminate = coverage.indeterminate,
            divergences = coverage.divergences,
            truncated = coverage.truncated,
            "test generation finished"
        );

        Ok(TestGeneration {
            routine: routine.name.clone(),
            test_cases: state.test_cases,
            paths: state.reports,
            coverage,
        })
    }

    fn resolve(
        &self,
        cfg: &ControlFlowGraph,
        path: ExecutionPath,
        state: &mut Exploration,
        deadline: Option<Instant>,
    ) -> Result<PathReport, ExplorationError> {
        let signature = path.signature();

        // Already reached by an earlier diverging replay
        if let Some(&case) = state.covered.get(&signature) {
            let seeded = &mut state.test_cases[case];
            if seeded.path_id.is_none() {
                seeded.path_id = Some(path.id);
            }
            return Ok(PathReport {
                path,
                status: PathStatus::Feasible { case },
                approximations: 0,
                constraints: Vec::new(),
            });
        }

        let constraints = match symbolic::translate(cfg, &path, &Assignment::new()) {
            Ok(constraints) => constraints,
            Err(gap) => {
                debug!(path = path.id, reason = %gap, "path not modellable under default shadows");
                return self.retry(
                    cfg,
                    path,
                    state,
                    deadline,
                    Unresolved {
                        constraints: None,
                        reason: gap.0,
                        reseed: Reseed::FromSearch,
                    },
                );
            }
        };
        let approximate = constraints.approximations > 0;

        let outcome = if bdd::check_skeleton(&constraints).satisfiable {
            self.solver.solve(&constraints, self.query_timeout(deadline))?
        } else {
            SolverOutcome::Unsatisfiable
        };

        let unresolved = match outcome {
            SolverOutcome::Satisfiable(model) => {
                let inputs = complete(cfg, model);
                let run = interp::execute(cfg, &inputs, self.options.replay_fuel);
                if run.signature() == signature {
                    let case = state.add_case(
                        Some(path.id),
                        signature,
                        inputs,
                        run.outcome,
                        CaseOrigin::Solver,
                    );
                    return Ok(path_report(path, PathStatus::Feasible { case }, Some(&constraints)));
                }
                state.divergences += 1;
                warn!(
                    path = path.id,
                    inputs = ?inputs,
                    "replay diverged from the intended path"
                );
                state.seed(path.id, inputs.clone(), run);
                Unresolved {
                    constraints: Some(constraints),
                    reason: "model replay diverged and no concrete inputs follow the path".into(),
                    reseed: Reseed::Model(inputs),
                }
            }
            // Concretised values make a refutation unreliable
            SolverOutcome::Unsatisfiable if approximate => Unresolved {
                constraints: Some(constraints),
                reason: "unsatisfiable only under approximation and no concrete inputs follow the path"
                    .into(),
                reseed: Reseed::FromSearch,
            },
            SolverOutcome::Unsatisfiable => {
                return Ok(path_report(path, PathStatus::Infeasible, Some(&constraints)));
            }
            SolverOutcome::Unknown(reason) => Unresolved {
                constraints: Some(constraints),
                reason,
                reseed: if approximate {
                    Reseed::FromSearch
                } else {
                    Reseed::Never
                },
            },
        };
        self.retry(cfg, path, state, deadline, unresolved)
    }

    /// Second attempt on a path the first solver pass did not settle.
    ///
    /// A diverging model seeds a pinned re-translation directly. Otherwise
    /// concrete search runs first and any inputs it finds seed the
    /// re-translation; its own inputs are kept when the seeded model does
    /// not replay along the path.
    fn retry(
        &self,
        cfg: &ControlFlowGraph,
        path: ExecutionPath,
        state: &mut Exploration,
        deadline: Option<Instant>,
        unresolved: Unresolved,
    ) -> Result<PathReport, ExplorationError> {
        let signature = path.signature();
        if let Reseed::Model(seed) = &unresolved.reseed {
            if let Some(solved) = self.solve_seeded(cfg, &path, seed, deadline)? {
                return Ok(solved.record(path, state));
            }
        }

        let config = ProbeConfig {
            attempts: self.options.probe_attempts,
            seed: self.options.seed ^ path.id as u64,
            fuel: self.options.replay_fuel,
            deadline,
        };
        let Some((inputs, run)) = probe::probe(cfg, &signature, &config) else {
            let status = PathStatus::Indeterminate {
                reason: unresolved.reason,
            };
            return Ok(path_report(path, status, unresolved.constraints.as_ref()));
        };

        if matches!(unresolved.reseed, Reseed::FromSearch) {
            if let Some(solved) = self.solve_seeded(cfg, &path, &inputs, deadline)? {
                return Ok(solved.record(path, state));
            }
        }
        let case = state.add_case(
            Some(path.id),
            signature,
            inputs,
            run.outcome,
            CaseOrigin::Probe,
        );
        Ok(path_report(
            path,
            PathStatus::Feasible { case },
            unresolved.constraints.as_ref(),
        ))
    }

    /// Translate `path` with concretised operands pinned to their values
    /// under `seed`, solve, and keep the model only if it replays along the path
    fn solve_seeded(
        &self,
        cfg: &ControlFlowGraph,
        path: &ExecutionPath,
        seed: &Assignment,
        deadline: Option<Instant>,
    ) -> Result<Option<SeededSolution>, ExplorationError> {
        let constraints = match symbolic::translate_pinned(cfg, path, seed) {
            Ok(constraints) => constraints,
            Err(gap) => {
                debug!(path = path.id, reason = %gap, "seeded translation failed");
                return Ok(None);
            }
        };
        if !bdd::check_skeleton(&constraints).satisfiable {
            return Ok(None);
        }
        let SolverOutcome::Satisfiable(model) =
            self.solver.solve(&constraints, self.query_timeout(deadline))?
        else {
            return Ok(None);
        };
        let inputs = complete(cfg, model);
        let run = interp::execute(cfg, &inputs, self.options.replay_fuel);
        if run.signature() != path.signature() {
            debug!(path = path.id, inputs = ?inputs, "seeded model left the path");
            return Ok(None);
        }
        debug!(path = path.id, "solved from a concrete seed");
        Ok(Some(SeededSolution {
            constraints,
            inputs,
            run,
        }))
    }

    fn query_timeout(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(d) => self
                .options
                .solver_timeout
                .min(d.saturating_duration_since(Instant::now())),
            None => self.options.solver_timeout,
        }
    }
}

/// Where a retry takes its shadow seed from
enum Reseed {
    /// Inputs of a model whose replay left the path
    Model(Assignment),
    /// Inputs found by concrete search, if any
    FromSearch,
    Never,
}

/// A path the first solver pass left open
struct Unresolved {
    constraints: Option<PathConstraintSet>,
    /// Reported when nothing settles the path
    reason: String,
    reseed: Reseed,
}

struct SeededSolution {
    constraints: PathConstraintSet,
    inputs: Assignment,
    run: Execution,
}

impl SeededSolution {
    fn record(self, path: ExecutionPath, state: &mut Exploration) -> PathReport {
        let case = state.add_case(
            Some(path.id),
            path.signature(),
            self.inputs,
            self.run.outcome,
            CaseOrigin::Solver,
        );
        path_report(path, PathStatus::Feasible { case }, Some(&self.constraints))
    }
}

fn path_report(
    path: ExecutionPath,
    status: PathStatus,
    constraints: Option<&PathConstraintSet>,
) -> PathReport {
    let (approximations, constraints) = constraints.map_or((0, Vec::new()), |set| {
        (
            set.approximations,
            set.constraints.iter().map(|c| c.formula.to_string()).collect(),
        )
    });
    PathReport {
        path,
        status,
        approximations,
        constraints,
    }
}

/// Fill inputs the model leaves out with their domain defaults
fn complete(cfg: &ControlFlowGraph, model: Assignment) -> Assignment {
    let mut inputs = model;
    for input in cfg.inputs() {
        if inputs.get(&input.name).is_none() {
            inputs.insert(input.name.clone(), input.domain.default_value());
        }
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmetric_core::{Domain, Expr, PathConstraintSet, SolverError, Stmt};
    use pretty_assertions::assert_eq;

    fn x() -> Expr {
        Expr::var("x")
    }

    struct Offline;

    impl ConstraintSolver for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn solve(&self, _: &PathConstraintSet, _: Duration) -> Result<SolverOutcome, SolverError> {
            Err(SolverError::Unavailable("no solver process".into()))
        }
    }

    struct Undecided;

    impl ConstraintSolver for Undecided {
        fn name(&self) -> &str {
            "undecided"
        }

        fn solve(&self, _: &PathConstraintSet, _: Duration) -> Result<SolverOutcome, SolverError> {
            Ok(SolverOutcome::Unknown("gave up".into()))
        }
    }

    fn sign() -> Routine {
        Routine::new("sign")
            .input("x", Domain::int(-10, 10))
            .with_body(vec![
                Stmt::if_then(x().gt(Expr::int(0)), vec![Stmt::ret(Expr::int(1))]),
                Stmt::if_then(x().lt(Expr::int(0)), vec![Stmt::ret(Expr::int(-1))]),
                Stmt::ret(Expr::int(0)),
            ])
    }

    #[test]
    fn defaults() {
        let budget = ExplorationBudget::default();
        assert_eq!(budget.max_paths, Some(256));
        assert_eq!(budget.max_duration, Some(Duration::from_secs(10)));
        let options = EngineOptions::default();
        assert_eq!(options.unroll_bound, 3);
        assert_eq!(options.probe_attempts, 32);
    }

    #[test]
    fn one_case_per_feasible_path() {
        let result = generate_tests(&sign(), &ExplorationBudget::unbounded()).unwrap();
        assert_eq!(result.coverage.explored, 3);
        assert_eq!(result.coverage.feasible, 3);
        assert_eq!(result.test_cases.len(), 3);
        assert!(result
            .test_cases
            .iter()
            .all(|c| c.origin == CaseOrigin::Solver));
        let returned: Vec<Outcome> = result.test_cases.iter().map(|c| c.outcome.clone()).collect();
        assert_eq!(
            returned,
            vec![
                Outcome::Returned { value: Some(pmetric_core::Value::Int(1)) },
                Outcome::Returned { value: Some(pmetric_core::Value::Int(-1)) },
                Outcome::Returned { value: Some(pmetric_core::Value::Int(0)) },
            ]
        );
    }

    #[test]
    fn unavailable_solver_is_fatal() {
        let err = SymbolicEngine::with_solver(Offline)
            .generate_tests(&sign(), &ExplorationBudget::unbounded())
            .unwrap_err();
        assert!(matches!(err, ExplorationError::SolverUnavailable(_)));
    }

    #[test]
    fn unknown_falls_back_to_probing() {
        let result = SymbolicEngine::with_solver(Undecided)
            .generate_tests(&sign(), &ExplorationBudget::unbounded())
            .unwrap();
        // Boundary candidates reach all three paths
        assert_eq!(result.coverage.feasible, 3);
        assert!(result.test_cases.iter().all(|c| c.origin == CaseOrigin::Probe));
    }

    #[test]
    fn invalid_routine_is_rejected() {
        let routine = Routine::new("bad").with_body(vec![Stmt::ret(Expr::var("ghost"))]);
        let err = generate_tests(&routine, &ExplorationBudget::unbounded()).unwrap_err();
        assert!(matches!(err, ExplorationError::InvalidRoutine { .. }));
    }

    #[test]
    fn path_budget_truncates() {
        let result = generate_tests(&sign(), &ExplorationBudget::unbounded().with_max_paths(1)).unwrap();
        assert_eq!(result.coverage.explored, 1);
        assert!(result.coverage.truncated);
    }

    #[test]
    fn exact_budget_is_not_truncation() {
        let result = generate_tests(&sign(), &ExplorationBudget::unbounded().with_max_paths(3)).unwrap();
        assert_eq!(result.coverage.explored, 3);
        assert!(!result.coverage.truncated);
    }
}
