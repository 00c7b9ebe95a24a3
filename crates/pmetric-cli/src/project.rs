//! Project input file for `pmetric report`
//!
//! A JSON document with one optional block per category. Every block that
//! is present is computed and merged into a [`ProjectReport`].

use chrono::NaiveDate;
use pmetric_concolic::SymbolicEngine;
use pmetric_core::{
    CocomoIIProject, CocomoProject, EstimateInput, EvmHistory, EvmSnapshot, MetricsError, Routine,
    StoryRecord, StoryStatus, TeamMember,
};
use pmetric_metrics::{
    burndown_chart, burndown_forecast, capacity_with_rate, cocomo_i_project, cocomo_ii_project,
    evm_with_bac, pert_aggregate, pert_batch, sprint_status, velocity, velocity_stats,
};
use pmetric_report::{ProjectReport, ReportAssembler, ReportError, SprintSummary};
use serde::Deserialize;

use crate::config::Config;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    pub name: String,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub tasks: Vec<TaskInput>,
    #[serde(default)]
    pub cocomo: Option<CocomoProject>,
    #[serde(default)]
    pub cocomo_ii: Option<CocomoIIProject>,
    /// Status snapshots; either all undated or all dated in increasing date order
    #[serde(default)]
    pub earned_value: Vec<EvmInput>,
    #[serde(default)]
    pub sprint: Option<SprintInput>,
    #[serde(default)]
    pub routines: Vec<Routine>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskInput {
    pub id: String,
    pub optimistic: f64,
    pub likely: f64,
    pub pessimistic: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvmInput {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub pv: f64,
    pub ev: f64,
    pub ac: f64,
    /// Defaults to `pv`
    #[serde(default)]
    pub bac: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SprintInput {
    /// Completed points of past sprints, oldest first
    pub history: Vec<u32>,
    #[serde(default)]
    pub remaining_points: Option<f64>,
    #[serde(default)]
    pub team: Vec<TeamMember>,
    #[serde(default)]
    pub stories: Vec<StoryInput>,
    #[serde(default)]
    pub burndown: Option<BurndownInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryInput {
    pub id: String,
    pub points: u32,
    /// Free-form status text, normalized on load
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BurndownInput {
    pub total: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub completions: Vec<Completion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Completion {
    pub date: NaiveDate,
    pub points: f64,
}

// ============================================================================
// Component computations
// ============================================================================

impl EvmInput {
    pub fn snapshot(&self) -> Result<EvmSnapshot, MetricsError> {
        let snapshot = evm_with_bac(self.pv, self.ev, self.ac, self.bac.unwrap_or(self.pv))?;
        Ok(match self.date {
            Some(date) => snapshot.dated(date),
            None => snapshot,
        })
    }
}

fn evm_history(entries: &[EvmInput]) -> Result<EvmHistory, MetricsError> {
    let mut history = EvmHistory::new();
    for entry in entries {
        history.push(entry.snapshot()?)?;
    }
    Ok(history)
}

impl SprintInput {
    pub fn summary(&self, points_per_member: f64) -> Result<SprintSummary, MetricsError> {
        let v = velocity(&self.history)?;
        let mut summary = SprintSummary {
            stats: Some(velocity_stats(&self.history)?),
            remaining_points: self.remaining_points,
            ..SprintSummary::new(v)
        };
        if let Some(remaining) = self.remaining_points {
            summary.forecast_sprints = Some(burndown_forecast(remaining, v)?);
        }
        if !self.team.is_empty() {
            let cap = capacity_with_rate(&self.team, points_per_member)?;
            summary.capacity = Some(cap);
            if !self.stories.is_empty() {
                summary.status = Some(sprint_status(cap.round() as u32, &self.stories()));
            }
        }
        if let Some(burndown) = &self.burndown {
            let completions: Vec<(NaiveDate, f64)> = burndown
                .completions
                .iter()
                .map(|c| (c.date, c.points))
                .collect();
            summary.burndown = Some(burndown_chart(
                burndown.total,
                burndown.start,
                burndown.end,
                &completions,
            )?);
        }
        Ok(summary)
    }

    fn stories(&self) -> Vec<StoryRecord> {
        self.stories
            .iter()
            .map(|s| StoryRecord::new(&s.id, s.points).with_status(StoryStatus::normalize(&s.status)))
            .collect()
    }
}

// ============================================================================
// Assembly
// ============================================================================

impl ProjectFile {
    /// Compute every populated category and merge the results
    pub fn build_report(&self, config: &Config) -> Result<ProjectReport, ReportError> {
        let mut assembler = ReportAssembler::new(&self.name);
        if let Some(date) = self.as_of {
            assembler = assembler.as_of(date);
        }

        if !self.tasks.is_empty() {
            let inputs: Vec<EstimateInput> = self
                .tasks
                .iter()
                .map(|t| EstimateInput::new(&t.id, t.optimistic, t.likely, t.pessimistic))
                .collect();
            let estimates = pert_batch(&inputs);
            let total = estimates.as_ref().map(|e| pert_aggregate(e)).map_err(Clone::clone);
            assembler = assembler.estimates(estimates)?.estimate_total(total)?;
        }
        if let Some(cocomo) = &self.cocomo {
            assembler = assembler.cocomo(cocomo_i_project(cocomo))?;
        }
        if let Some(project) = &self.cocomo_ii {
            assembler = assembler.cocomo_ii(cocomo_ii_project(project))?;
        }

        // one dated entry makes the whole list a history
        if self.earned_value.iter().any(|e| e.date.is_some()) {
            assembler = assembler.evm_history(evm_history(&self.earned_value))?;
        } else {
            for entry in &self.earned_value {
                assembler = assembler.earned_value(entry.snapshot())?;
            }
        }

        if let Some(sprint) = &self.sprint {
            assembler = assembler.sprints(sprint.summary(config.sprint.points_per_member))?;
        }

        let engine = SymbolicEngine::new().with_options(config.exploration.engine_options());
        let budget = config.exploration.budget();
        for routine in &self.routines {
            tracing::info!(routine = %routine.name, "generating tests");
            assembler = assembler.test_generation(engine.generate_tests(routine, &budget))?;
        }

        Ok(assembler.finish())
    }
}
