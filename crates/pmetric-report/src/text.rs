//! Plain-text report for console output

use pmetric_concolic::{CaseOrigin, Outcome, PathStatus, TestGeneration};
use pmetric_core::{Assignment, EvmSnapshot};
use std::fmt::Write;

use crate::{
    EarnedValueSection, EstimationSection, ProjectReport, Renderer, ReportError, SprintSummary,
};

/// Width of the label column in tables
const LABEL_WIDTH: usize = 24;

/// Plain text renderer for console output
#[derive(Clone, Copy, Debug, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&self, report: &ProjectReport) -> Result<String, ReportError> {
        Ok(render_text(report))
    }
}

/// Render a report as a plain-text summary
pub fn render_text(report: &ProjectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Project: {}", report.project);
    if let Some(date) = report.as_of {
        let _ = writeln!(out, "As of: {}", date);
    }

    if !report.estimation.is_empty() {
        render_estimation(&mut out, &report.estimation);
    }
    if !report.earned_value.snapshots.is_empty() {
        render_earned_value(&mut out, &report.earned_value);
    }
    if let Some(sprint) = &report.sprint {
        render_sprint(&mut out, sprint);
    }
    for generation in &report.test_generation {
        render_test_generation(&mut out, generation);
    }
    out
}

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n== {} ==", title);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn render_estimation(out: &mut String, section: &EstimationSection) {
    heading(out, "Estimation");
    if !section.tasks.is_empty() {
        let _ = writeln!(
            out,
            "{:<w$} {:>10} {:>10}",
            "Task",
            "Expected",
            "Std dev",
            w = LABEL_WIDTH
        );
        for task in &section.tasks {
            let _ = writeln!(
                out,
                "{:<w$} {:>10.2} {:>10.2}",
                truncate(&task.task_id, LABEL_WIDTH),
                task.pert.expected,
                task.pert.std_dev,
                w = LABEL_WIDTH
            );
        }
    }
    if let Some(total) = &section.total {
        let _ = writeln!(
            out,
            "{:<w$} {:>10.2} {:>10.2}",
            "Total",
            total.expected,
            total.std_dev,
            w = LABEL_WIDTH
        );
    }
    if let Some(cocomo) = &section.cocomo {
        let _ = writeln!(
            out,
            "COCOMO I: {:.2} person-months over {:.2} months ({:.1} staff, {:.0} LOC/PM)",
            cocomo.effort_pm, cocomo.schedule_months, cocomo.staff, cocomo.productivity
        );
    }
    if let Some(cocomo) = &section.cocomo_ii {
        let _ = writeln!(
            out,
            "COCOMO II: {:.2} person-months over {:.2} months ({:.1} staff, E = {:.4}, EAF = {:.2})",
            cocomo.effort_pm, cocomo.schedule_months, cocomo.staff, cocomo.exponent, cocomo.eaf
        );
    }
}

fn render_earned_value(out: &mut String, section: &EarnedValueSection) {
    heading(out, "Earned value");
    let _ = writeln!(
        out,
        "{:<10} {:>10} {:>10} {:>10} {:>9} {:>9} {:>10}",
        "Date", "PV", "EV", "AC", "CPI", "SPI", "EAC"
    );
    for snapshot in &section.snapshots {
        let date = snapshot
            .date
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        let _ = writeln!(
            out,
            "{:<10} {:>10.2} {:>10.2} {:>10.2} {:>9} {:>9} {:>10}",
            date,
            snapshot.pv,
            snapshot.ev,
            snapshot.ac,
            snapshot.cpi.to_string(),
            snapshot.spi.to_string(),
            snapshot.eac.to_string()
        );
    }
    if let Some(latest) = section.latest() {
        let _ = writeln!(out, "{}", verdict(latest));
    }
}

fn verdict(snapshot: &EvmSnapshot) -> String {
    let cost = match snapshot.cpi.value() {
        Some(cpi) if cpi < 1.0 => "over budget",
        Some(_) => "within budget",
        None => "cost performance undefined",
    };
    let schedule = match snapshot.spi.value() {
        Some(spi) if spi < 1.0 => "behind schedule",
        Some(_) => "on or ahead of schedule",
        None => "schedule performance undefined",
    };
    format!("Status: {}, {}", cost, schedule)
}

fn render_sprint(out: &mut String, sprint: &SprintSummary) {
    heading(out, "Sprint");
    let _ = writeln!(out, "Velocity: {:.2} points/sprint", sprint.velocity);
    if let Some(stats) = &sprint.stats {
        let _ = writeln!(
            out,
            "Over {} sprints: min {:.0}, max {:.0}, std dev {:.2}",
            stats.sprints, stats.min, stats.max, stats.std_dev
        );
    }
    if let (Some(remaining), Some(sprints)) = (sprint.remaining_points, sprint.forecast_sprints) {
        let _ = writeln!(out, "Forecast: {} sprints for {:.0} remaining points", sprints, remaining);
    }
    if let Some(capacity) = sprint.capacity {
        let _ = writeln!(out, "Capacity: {:.1} points", capacity);
    }
    if let Some(status) = &sprint.status {
        let _ = write!(
            out,
            "Progress: {}/{} points done ({:.2}%)",
            status.completed, status.planned, status.percent_complete
        );
        if status.overloaded {
            let _ = write!(out, ", overloaded by {} points", -status.remaining_capacity);
        }
        let _ = writeln!(out);
        for (state, points) in &status.breakdown {
            let _ = writeln!(out, "  {:<12} {:>5}", state.as_str(), points);
        }
    }
    if let Some(chart) = &sprint.burndown {
        let _ = writeln!(out, "{:<10} {:>8} {:>8}", "Day", "Ideal", "Actual");
        for ((date, ideal), actual) in chart
            .dates
            .iter()
            .zip(&chart.ideal_remaining)
            .zip(&chart.actual_remaining)
        {
            let _ = writeln!(out, "{:<10} {:>8.1} {:>8.1}", date, ideal, actual);
        }
    }
}

fn render_test_generation(out: &mut String, generation: &TestGeneration) {
    heading(out, &format!("Test generation: {}", generation.routine));
    let c = &generation.coverage;
    let _ = writeln!(
        out,
        "Paths: {} explored, {} feasible, {} infeasible, {} indeterminate",
        c.explored, c.feasible, c.infeasible, c.indeterminate
    );
    if c.divergences > 0 {
        let _ = writeln!(
            out,
            "Replay divergences: {} ({} seeded cases unmatched)",
            c.divergences, c.unmatched_seeds
        );
    }
    if c.truncated {
        let _ = writeln!(out, "Exploration truncated by budget");
    }

    for case in &generation.test_cases {
        let path = case
            .path_id
            .map_or_else(|| "unmatched".to_string(), |id| format!("path {}", id));
        let origin = match &case.origin {
            CaseOrigin::Solver => String::new(),
            CaseOrigin::Probe => " [probed]".to_string(),
            CaseOrigin::DivergenceSeeded { diverged_at } => {
                format!(" [seeded by path {}]", diverged_at)
            }
        };
        let _ = writeln!(
            out,
            "  #{} ({}) {} -> {}{}",
            case.id,
            path,
            inputs(&case.inputs),
            outcome(&case.outcome),
            origin
        );
    }

    for report in &generation.paths {
        if let PathStatus::Indeterminate { reason } = &report.status {
            let _ = writeln!(out, "  path {} indeterminate: {}", report.path.id, reason);
        }
    }
}

fn inputs(assignment: &Assignment) -> String {
    let parts: Vec<String> = assignment
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    parts.join(", ")
}

fn outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Returned { value: Some(v) } => format!("returns {}", v),
        Outcome::Returned { value: None } => "returns".to_string(),
        Outcome::Raised { message } => format!("raises \"{}\"", message),
        Outcome::Fault { reason } => format!("faults ({})", reason),
        Outcome::FuelExhausted => "does not terminate".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportAssembler;

    #[test]
    fn truncate_long_labels() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-task-name", 10), "a-very-...");
    }

    #[test]
    fn undefined_indices_are_spelled_out() {
        let report = ReportAssembler::new("P")
            .earned_value(pmetric_metrics::evm(0.0, 50.0, 60.0))
            .unwrap()
            .finish();
        let text = render_text(&report);
        assert!(text.contains("undefined"));
        assert!(text.contains("schedule performance undefined"));
        assert!(text.contains("over budget"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let text = render_text(&ReportAssembler::new("Quiet").finish());
        assert_eq!(text, "Project: Quiet\n");
    }
}
