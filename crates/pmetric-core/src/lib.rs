//! # pmetric-core
//!
//! Core domain model and traits for the pmetric estimation and test-generation engine.
//!
//! This crate provides:
//! - Estimation types: `ThreePointEstimate`, `CocomoProject`, `EvmSnapshot`, `SprintRecord`
//! - The routine IR consumed by the concolic engine: `Routine`, `Stmt`, `Expr`
//! - The path-constraint language and the `ConstraintSolver` boundary
//! - Error types shared by every component
//!
//! ## Example
//!
//! ```rust
//! use pmetric_core::{EstimateInput, Metric};
//!
//! let input = EstimateInput::new("design", 1.0, 4.0, 7.0);
//! assert_eq!(input.estimate.likely, 4.0);
//!
//! assert_eq!(Metric::ratio(80.0, 100.0), Metric::Value(0.8));
//! assert!(Metric::ratio(50.0, 0.0).is_undefined());
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod constraint;
pub mod routine;

pub use constraint::{
    Assignment, Atom, CmpOp, ConstraintSolver, Formula, LinearExpr, PathConstraint,
    PathConstraintSet, SolverError, SolverOutcome,
};
pub use routine::{BinaryOp, Domain, Expr, InputDecl, OpaqueFn, Routine, Stmt, UnaryOp, Value};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for an estimated task
pub type TaskId = String;

/// Unique identifier for a sprint
pub type SprintId = String;

// ============================================================================
// Metric
// ============================================================================

/// A derived ratio that may be undefined.
///
/// Every index whose denominator can be zero (CPI, SPI, EAC, ...) is reported
/// as a `Metric`. A zero denominator yields `Undefined`, never a silent
/// infinity or NaN.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Value(f64),
    Undefined,
}

impl Metric {
    /// `numerator / denominator`, or `Undefined` when the denominator is zero
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Metric::Undefined
        } else {
            Metric::Value(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Metric::Undefined)
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Metric::Value(v) => Metric::Value(f(v)),
            Metric::Undefined => Metric::Undefined,
        }
    }

    pub fn and_then(self, f: impl FnOnce(f64) -> Metric) -> Self {
        match self {
            Metric::Value(v) => f(v),
            Metric::Undefined => Metric::Undefined,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => write!(f, "{:.3}", v),
            Metric::Undefined => write!(f, "undefined"),
        }
    }
}

// ============================================================================
// PERT
// ============================================================================

/// Optimistic / most likely / pessimistic duration triple
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreePointEstimate {
    pub optimistic: f64,
    pub likely: f64,
    pub pessimistic: f64,
}

impl ThreePointEstimate {
    pub fn new(optimistic: f64, likely: f64, pessimistic: f64) -> Self {
        Self {
            optimistic,
            likely,
            pessimistic,
        }
    }
}

/// A three-point estimate submitted for one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateInput {
    pub task_id: TaskId,
    pub estimate: ThreePointEstimate,
}

impl EstimateInput {
    pub fn new(task_id: impl Into<TaskId>, optimistic: f64, likely: f64, pessimistic: f64) -> Self {
        Self {
            task_id: task_id.into(),
            estimate: ThreePointEstimate::new(optimistic, likely, pessimistic),
        }
    }
}

/// Result of a PERT calculation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PertResult {
    /// (o + 4m + p) / 6
    pub expected: f64,
    /// ((p - o) / 6)^2
    pub variance: f64,
    pub std_dev: f64,
}

/// PERT result for a single task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEstimate {
    pub task_id: TaskId,
    pub pert: PertResult,
}

// ============================================================================
// COCOMO
// ============================================================================

/// Basic COCOMO development mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CocomoMode {
    #[default]
    Organic,
    SemiDetached,
    Embedded,
}

impl CocomoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CocomoMode::Organic => "organic",
            CocomoMode::SemiDetached => "semi-detached",
            CocomoMode::Embedded => "embedded",
        }
    }
}

impl fmt::Display for CocomoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CocomoMode {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organic" => Ok(CocomoMode::Organic),
            "semi-detached" | "semidetached" | "semi_detached" => Ok(CocomoMode::SemiDetached),
            "embedded" => Ok(CocomoMode::Embedded),
            other => Err(MetricsError::InvalidInput(format!(
                "unknown COCOMO mode '{}'",
                other
            ))),
        }
    }
}

/// Input for basic COCOMO (COCOMO I)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CocomoProject {
    /// Size in thousands of delivered lines of code
    pub kloc: f64,
    #[serde(default)]
    pub mode: CocomoMode,
}

/// Result of a COCOMO I estimate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocomoEstimate {
    pub effort_pm: f64,
    pub schedule_months: f64,
    /// Average staffing (effort / schedule)
    pub staff: f64,
    /// Delivered lines of code per person-month
    pub productivity: f64,
}

/// Input for post-architecture COCOMO II
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CocomoIIProject {
    pub kloc: f64,
    /// Scale factor ratings; missing standard factors use their nominal value
    #[serde(default)]
    pub scale_factors: BTreeMap<String, f64>,
    /// Effort multipliers; missing drivers count as 1.0
    #[serde(default)]
    pub cost_drivers: BTreeMap<String, f64>,
}

impl CocomoIIProject {
    pub fn new(kloc: f64) -> Self {
        Self {
            kloc,
            ..Default::default()
        }
    }

    pub fn scale_factor(mut self, name: impl Into<String>, rating: f64) -> Self {
        self.scale_factors.insert(name.into(), rating);
        self
    }

    pub fn cost_driver(mut self, name: impl Into<String>, multiplier: f64) -> Self {
        self.cost_drivers.insert(name.into(), multiplier);
        self
    }
}

/// Result of a COCOMO II estimate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CocomoIIEstimate {
    pub effort_pm: f64,
    pub schedule_months: f64,
    pub staff: f64,
    /// Size exponent E
    pub exponent: f64,
    /// Effort adjustment factor (product of cost drivers)
    pub eaf: f64,
}

// ============================================================================
// Earned Value
// ============================================================================

/// Earned-value measurements at one status date
///
/// Built by `pmetric_metrics::evm`; indices with a zero denominator are
/// `Metric::Undefined`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvmSnapshot {
    pub date: Option<NaiveDate>,
    /// Planned Value
    pub pv: f64,
    /// Earned Value
    pub ev: f64,
    /// Actual Cost
    pub ac: f64,
    /// Budget at Completion
    pub bac: f64,
    /// Cost Variance (EV - AC)
    pub cv: f64,
    /// Schedule Variance (EV - PV)
    pub sv: f64,
    /// Cost Performance Index (EV / AC)
    pub cpi: Metric,
    /// Schedule Performance Index (EV / PV)
    pub spi: Metric,
    /// Estimate at Completion, AC + (BAC - EV) / CPI
    pub eac: Metric,
    /// Estimate at Completion assuming the remaining work goes to plan
    pub eac_atypical: f64,
    /// Estimate to Complete (EAC - AC)
    pub etc: Metric,
    /// Variance at Completion (BAC - EAC)
    pub vac: Metric,
    /// To-Complete Performance Index, (BAC - EV) / (BAC - AC)
    pub tcpi: Metric,
}

impl EvmSnapshot {
    /// Attach a status date to the snapshot
    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Per-task input for earned value roll-up
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub budget: f64,
    /// Fraction complete; values outside [0, 1] are clamped
    pub percent_complete: f64,
}

/// Caller-owned, date-ordered sequence of EVM snapshots
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvmHistory {
    snapshots: Vec<EvmSnapshot>,
}

impl EvmHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. It must be dated strictly after the last one.
    pub fn push(&mut self, snapshot: EvmSnapshot) -> Result<(), MetricsError> {
        let date = snapshot.date.ok_or_else(|| {
            MetricsError::InvalidInput("snapshots in a history must carry a date".into())
        })?;
        if let Some(last) = self.snapshots.last().and_then(|s| s.date) {
            if date <= last {
                return Err(MetricsError::InvalidInput(format!(
                    "snapshot dated {} is not after the latest snapshot ({})",
                    date, last
                )));
            }
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn snapshots(&self) -> &[EvmSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&EvmSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// CPI per snapshot, in date order
    pub fn cpi_trend(&self) -> Vec<Metric> {
        self.snapshots.iter().map(|s| s.cpi).collect()
    }
}

// ============================================================================
// Sprints
// ============================================================================

/// Completed work for one sprint, as supplied by the persistence layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub sprint_id: SprintId,
    pub name: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub completed_points: u32,
    pub committed_points: Option<u32>,
}

impl SprintRecord {
    pub fn new(sprint_id: impl Into<SprintId>, completed_points: u32) -> Self {
        let sprint_id = sprint_id.into();
        Self {
            name: sprint_id.clone(),
            sprint_id,
            start: None,
            end: None,
            completed_points,
            committed_points: None,
        }
    }
}

/// Workflow state of a story
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl StoryStatus {
    /// Normalise a free-text status; unrecognised text is `Todo`
    pub fn normalize(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "done" | "completed" | "complete" => StoryStatus::Done,
            "inprogress" | "in-progress" | "in progress" => StoryStatus::InProgress,
            "blocked" => StoryStatus::Blocked,
            _ => StoryStatus::Todo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Todo => "todo",
            StoryStatus::InProgress => "in-progress",
            StoryStatus::Blocked => "blocked",
            StoryStatus::Done => "done",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StoryStatus::normalize(s))
    }
}

/// A story planned into a sprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: String,
    pub title: String,
    pub points: u32,
    #[serde(default)]
    pub status: StoryStatus,
}

impl StoryRecord {
    pub fn new(id: impl Into<String>, points: u32) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            points,
            status: StoryStatus::Todo,
        }
    }

    pub fn with_status(mut self, status: StoryStatus) -> Self {
        self.status = status;
        self
    }
}

/// A team member's availability for a sprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    /// Fraction of the sprint the member is available, in [0, 1]
    pub availability: f64,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, availability: f64) -> Self {
        Self {
            name: name.into(),
            availability,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Metric computation error. Local to one call; the caller supplies corrected input.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MetricsError {
    #[error("Invalid estimate: {0}")]
    InvalidEstimate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Empty history: {0}")]
    EmptyHistory(String),
}

/// Error fatal to a whole test-generation run.
///
/// Per-path trouble (timeouts, replay divergence) never surfaces here; it is
/// folded into the path outcomes.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ExplorationError {
    #[error("Invalid routine '{routine}': {reason}")]
    InvalidRoutine { routine: String, reason: String },

    #[error("Solver unavailable: {0}")]
    SolverUnavailable(#[from] SolverError),
}

/// Component identity used to tag report errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Pert,
    Cocomo,
    CocomoII,
    EarnedValue,
    Sprint,
    TestGeneration,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Pert => "PERT",
            Component::Cocomo => "COCOMO I",
            Component::CocomoII => "COCOMO II",
            Component::EarnedValue => "earned value",
            Component::Sprint => "sprint analytics",
            Component::TestGeneration => "test generation",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Report assembly error, tagged with the failing component
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{component} failed: {source}")]
    Metrics {
        component: Component,
        #[source]
        source: MetricsError,
    },

    #[error("{component} failed: {source}")]
    Exploration {
        component: Component,
        #[source]
        source: ExplorationError,
    },

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl ReportError {
    /// The component whose error was propagated, if any
    pub fn component(&self) -> Option<Component> {
        match self {
            ReportError::Metrics { component, .. } | ReportError::Exploration { component, .. } => {
                Some(*component)
            }
            ReportError::Serialize(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn snapshot(date: Option<NaiveDate>, cpi: Metric) -> EvmSnapshot {
        EvmSnapshot {
            date,
            pv: 100.0,
            ev: 80.0,
            ac: 90.0,
            bac: 100.0,
            cv: -10.0,
            sv: -20.0,
            cpi,
            spi: Metric::Value(0.8),
            eac: Metric::Undefined,
            eac_atypical: 110.0,
            etc: Metric::Undefined,
            vac: Metric::Undefined,
            tcpi: Metric::Undefined,
        }
    }

    #[test]
    fn metric_ratio_guards_zero_denominator() {
        assert_eq!(Metric::ratio(80.0, 100.0), Metric::Value(0.8));
        assert_eq!(Metric::ratio(50.0, 0.0), Metric::Undefined);
        assert_eq!(Metric::ratio(0.0, 0.0), Metric::Undefined);
    }

    #[test]
    fn metric_combinators() {
        let cpi = Metric::Value(0.5);
        assert_eq!(cpi.map(|v| v * 2.0), Metric::Value(1.0));
        assert_eq!(cpi.and_then(|v| Metric::ratio(1.0, v)), Metric::Value(2.0));
        assert_eq!(Metric::Undefined.map(|v| v * 2.0), Metric::Undefined);
        assert_eq!(Metric::Undefined.value(), None);
    }

    #[test]
    fn metric_display() {
        assert_eq!(Metric::Value(0.8888).to_string(), "0.889");
        assert_eq!(Metric::Undefined.to_string(), "undefined");
    }

    #[test]
    fn metric_serialization_distinguishes_undefined() {
        let json = serde_json::to_string(&Metric::Undefined).unwrap();
        assert_eq!(json, "\"undefined\"");
        let json = serde_json::to_string(&Metric::Value(0.5)).unwrap();
        assert_eq!(json, "{\"value\":0.5}");

        let back: Metric = serde_json::from_str("\"undefined\"").unwrap();
        assert!(back.is_undefined());
    }

    #[test]
    fn cocomo_mode_parsing() {
        assert_eq!("organic".parse::<CocomoMode>().unwrap(), CocomoMode::Organic);
        assert_eq!("Organic".parse::<CocomoMode>().unwrap(), CocomoMode::Organic);
        assert_eq!(
            "semi-detached".parse::<CocomoMode>().unwrap(),
            CocomoMode::SemiDetached
        );
        assert_eq!(
            "SemiDetached".parse::<CocomoMode>().unwrap(),
            CocomoMode::SemiDetached
        );
        assert_eq!("EMBEDDED".parse::<CocomoMode>().unwrap(), CocomoMode::Embedded);

        let err = "unknown-model".parse::<CocomoMode>().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidInput(_)));
    }

    #[test]
    fn story_status_normalization() {
        assert_eq!(StoryStatus::normalize("Completed"), StoryStatus::Done);
        assert_eq!(StoryStatus::normalize("complete"), StoryStatus::Done);
        assert_eq!(StoryStatus::normalize("in progress"), StoryStatus::InProgress);
        assert_eq!(StoryStatus::normalize("InProgress"), StoryStatus::InProgress);
        assert_eq!(StoryStatus::normalize(" blocked "), StoryStatus::Blocked);
        assert_eq!(StoryStatus::normalize("someday"), StoryStatus::Todo);
        assert_eq!(StoryStatus::normalize(""), StoryStatus::Todo);
    }

    #[test]
    fn evm_history_keeps_date_order() {
        let mut history = EvmHistory::new();
        history
            .push(snapshot(Some(date(2025, 1, 10)), Metric::Value(0.9)))
            .unwrap();
        history
            .push(snapshot(Some(date(2025, 1, 24)), Metric::Value(0.95)))
            .unwrap();

        let err = history
            .push(snapshot(Some(date(2025, 1, 17)), Metric::Value(1.0)))
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidInput(_)));

        let err = history
            .push(snapshot(Some(date(2025, 1, 24)), Metric::Value(1.0)))
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidInput(_)));

        assert_eq!(history.len(), 2);
        assert_eq!(
            history.cpi_trend(),
            vec![Metric::Value(0.9), Metric::Value(0.95)]
        );
        assert_eq!(history.latest().unwrap().date, Some(date(2025, 1, 24)));
    }

    #[test]
    fn evm_history_rejects_undated_snapshot() {
        let mut history = EvmHistory::new();
        let err = history.push(snapshot(None, Metric::Undefined)).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidInput(_)));
        assert!(history.is_empty());
    }

    #[test]
    fn cocomo_ii_project_builder() {
        let project = CocomoIIProject::new(50.0)
            .scale_factor("PREC", 3.0)
            .cost_driver("RELY", 1.1);
        assert_eq!(project.kloc, 50.0);
        assert_eq!(project.scale_factors.get("PREC"), Some(&3.0));
        assert_eq!(project.cost_drivers.get("RELY"), Some(&1.1));
    }

    #[test]
    fn report_error_carries_component() {
        let err = ReportError::Metrics {
            component: Component::Sprint,
            source: MetricsError::EmptyHistory("no sprints".into()),
        };
        assert_eq!(err.component(), Some(Component::Sprint));
        assert_eq!(
            err.to_string(),
            "sprint analytics failed: Empty history: no sprints"
        );
    }

    #[test]
    fn sprint_record_defaults_name_to_id() {
        let record = SprintRecord::new("S1", 21);
        assert_eq!(record.name, "S1");
        assert_eq!(record.completed_points, 21);
        assert!(record.committed_points.is_none());
    }
}
