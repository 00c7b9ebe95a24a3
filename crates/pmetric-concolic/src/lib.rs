//! # pmetric-concolic
//!
//! Concolic test generation for routines described by a front end.
//!
//! This crate provides:
//! - Control-flow graph construction from the routine IR
//! - Bounded, deterministic path enumeration
//! - Symbolic translation of paths with a concrete shadow store
//! - A BDD pre-check and a pluggable solver boundary
//! - Concrete replay, divergence seeding and probing
//!
//! ## Example
//!
//! ```rust
//! use pmetric_concolic::{generate_tests, ExplorationBudget};
//! use pmetric_core::{Domain, Expr, Routine, Stmt};
//!
//! let routine = Routine::new("sign")
//!     .input("x", Domain::int(-10, 10))
//!     .with_body(vec![
//!         Stmt::if_then(Expr::var("x").gt(Expr::int(0)), vec![Stmt::ret(Expr::int(1))]),
//!         Stmt::ret(Expr::int(0)),
//!     ]);
//!
//! let result = generate_tests(&routine, &ExplorationBudget::unbounded()).unwrap();
//! assert_eq!(result.coverage.feasible, 2);
//! ```

pub mod bdd;
pub mod cfg;
#[cfg(feature = "cp-solver")]
pub mod cp;
pub mod domain;
pub mod engine;
pub mod interp;
pub mod paths;
pub mod probe;
pub mod symbolic;

pub use bdd::{check_skeleton, BddStats, SkeletonCheck};
pub use cfg::{ControlFlowGraph, Node, NodeId, NodeKind};
#[cfg(feature = "cp-solver")]
pub use cp::CpSolver;
pub use domain::DomainSolver;
pub use engine::{
    generate_tests, CaseOrigin, ConcreteTestCase, CoverageSummary, EngineOptions,
    ExplorationBudget, PathReport, PathStatus, SymbolicEngine, TestGeneration,
};
pub use interp::{execute, Execution, Outcome};
pub use paths::{
    BranchDecision, ExecutionPath, PathExplorer, PathId, PathSignature, Paths,
    DEFAULT_UNROLL_BOUND,
};
pub use symbolic::{translate, translate_pinned, ModelGap};
