//! # pmetric-report
//!
//! Merges estimation, earned value, sprint and test-generation results into
//! one structured [`ProjectReport`] for presentation layers.
//!
//! The assembler performs no computation. Each component result is passed
//! in as a `Result`; a failed component aborts assembly with a
//! [`ReportError`] naming that component.
//!
//! ## Example
//!
//! ```rust
//! use pmetric_metrics::{cocomo_i, evm};
//! use pmetric_core::CocomoMode;
//! use pmetric_report::{render_text, ReportAssembler};
//!
//! let report = ReportAssembler::new("Apollo")
//!     .cocomo(cocomo_i(10.0, CocomoMode::Organic))?
//!     .earned_value(evm(100.0, 80.0, 90.0))?
//!     .finish();
//!
//! let text = render_text(&report);
//! assert!(text.contains("Apollo"));
//! let json = report.to_json()?;
//! assert!(json.contains("earned_value"));
//! # Ok::<(), pmetric_core::ReportError>(())
//! ```

pub mod text;

pub use text::{render_text, TextRenderer};

use chrono::NaiveDate;
use pmetric_concolic::TestGeneration;
use pmetric_core::{
    CocomoEstimate, CocomoIIEstimate, Component, EvmHistory, EvmSnapshot, ExplorationError,
    MetricsError, PertResult, TaskEstimate,
};
use pmetric_metrics::{BurndownChart, SprintStatus, VelocityStats};
use serde::{Deserialize, Serialize};

pub use pmetric_core::ReportError;

// ============================================================================
// Report model
// ============================================================================

/// Size- and task-based estimates
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimationSection {
    pub tasks: Vec<TaskEstimate>,
    /// Aggregate of `tasks` as supplied by the caller
    pub total: Option<PertResult>,
    pub cocomo: Option<CocomoEstimate>,
    pub cocomo_ii: Option<CocomoIIEstimate>,
}

impl EstimationSection {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.total.is_none()
            && self.cocomo.is_none()
            && self.cocomo_ii.is_none()
    }
}

/// Snapshots in the order they were supplied
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EarnedValueSection {
    pub snapshots: Vec<EvmSnapshot>,
}

impl EarnedValueSection {
    pub fn latest(&self) -> Option<&EvmSnapshot> {
        self.snapshots.last()
    }
}

/// Sprint analytics, computed by the caller
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SprintSummary {
    /// Points per sprint
    pub velocity: f64,
    pub stats: Option<VelocityStats>,
    pub remaining_points: Option<f64>,
    /// Sprints needed for `remaining_points` at `velocity`
    pub forecast_sprints: Option<u32>,
    pub capacity: Option<f64>,
    pub status: Option<SprintStatus>,
    pub burndown: Option<BurndownChart>,
}

impl SprintSummary {
    pub fn new(velocity: f64) -> Self {
        Self {
            velocity,
            ..Default::default()
        }
    }
}

/// Everything known about one project, keyed by category
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: String,
    pub as_of: Option<NaiveDate>,
    pub estimation: EstimationSection,
    pub earned_value: EarnedValueSection,
    pub sprint: Option<SprintSummary>,
    pub test_generation: Vec<TestGeneration>,
}

impl ProjectReport {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string_pretty(self).map_err(|e| ReportError::Serialize(e.to_string()))
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Output backend for a finished report
pub trait Renderer {
    fn render(&self, report: &ProjectReport) -> Result<String, ReportError>;
}

/// Pretty JSON output
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, report: &ProjectReport) -> Result<String, ReportError> {
        report.to_json()
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Collects component results into a [`ProjectReport`]
#[derive(Clone, Debug)]
pub struct ReportAssembler {
    report: ProjectReport,
}

fn metrics(component: Component) -> impl FnOnce(MetricsError) -> ReportError {
    move |source| ReportError::Metrics { component, source }
}

fn exploration(component: Component) -> impl FnOnce(ExplorationError) -> ReportError {
    move |source| ReportError::Exploration { component, source }
}

impl ReportAssembler {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            report: ProjectReport {
                project: project.into(),
                as_of: None,
                estimation: EstimationSection::default(),
                earned_value: EarnedValueSection::default(),
                sprint: None,
                test_generation: Vec::new(),
            },
        }
    }

    /// Status date printed in the report header
    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.report.as_of = Some(date);
        self
    }

    /// Per-task PERT results
    pub fn estimates(
        mut self,
        result: Result<Vec<TaskEstimate>, MetricsError>,
    ) -> Result<Self, ReportError> {
        self.report.estimation.tasks = result.map_err(metrics(Component::Pert))?;
        Ok(self)
    }

    /// Aggregate PERT result for the task chain
    pub fn estimate_total(
        mut self,
        result: Result<PertResult, MetricsError>,
    ) -> Result<Self, ReportError> {
        self.report.estimation.total = Some(result.map_err(metrics(Component::Pert))?);
        Ok(self)
    }

    pub fn cocomo(mut self, result: Result<CocomoEstimate, MetricsError>) -> Result<Self, ReportError> {
        self.report.estimation.cocomo = Some(result.map_err(metrics(Component::Cocomo))?);
        Ok(self)
    }

    pub fn cocomo_ii(
        mut self,
        result: Result<CocomoIIEstimate, MetricsError>,
    ) -> Result<Self, ReportError> {
        self.report.estimation.cocomo_ii = Some(result.map_err(metrics(Component::CocomoII))?);
        Ok(self)
    }

    /// Append one snapshot
    pub fn earned_value(
        mut self,
        result: Result<EvmSnapshot, MetricsError>,
    ) -> Result<Self, ReportError> {
        let snapshot = result.map_err(metrics(Component::EarnedValue))?;
        self.report.earned_value.snapshots.push(snapshot);
        Ok(self)
    }

    /// Append every snapshot of a history, in date order
    pub fn evm_history(
        mut self,
        result: Result<EvmHistory, MetricsError>,
    ) -> Result<Self, ReportError> {
        let history = result.map_err(metrics(Component::EarnedValue))?;
        self.report
            .earned_value
            .snapshots
            .extend_from_slice(history.snapshots());
        Ok(self)
    }

    pub fn sprints(mut self, result: Result<SprintSummary, MetricsError>) -> Result<Self, ReportError> {
        self.report.sprint = Some(result.map_err(metrics(Component::Sprint))?);
        Ok(self)
    }

    /// Append the test-generation result for one routine
    pub fn test_generation(
        mut self,
        result: Result<TestGeneration, ExplorationError>,
    ) -> Result<Self, ReportError> {
        let generation = result.map_err(exploration(Component::TestGeneration))?;
        self.report.test_generation.push(generation);
        Ok(self)
    }

    pub fn finish(self) -> ProjectReport {
        self.report
    }
}
