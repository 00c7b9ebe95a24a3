//! Report assembly from real component results
//!
//! Invariants:
//! 1. The assembler stores component values unchanged
//! 2. A failed component aborts assembly and is named in the error
//! 3. Text and JSON renderings cover every populated category

use chrono::NaiveDate;
use pmetric_concolic::{generate_tests, ExplorationBudget};
use pmetric_core::{
    CocomoIIProject, CocomoMode, Component, Domain, EstimateInput, EvmHistory, Expr,
    ExplorationError, Routine, Stmt, StoryRecord, StoryStatus,
};
use pmetric_metrics::{
    burndown_forecast, cocomo_i, cocomo_ii_project, evm_with_bac, pert_aggregate, pert_batch,
    sprint_status, velocity, velocity_stats,
};
use pmetric_report::{
    render_text, JsonRenderer, Renderer, ReportAssembler, ReportError, SprintSummary,
    TextRenderer,
};
use pretty_assertions::assert_eq;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sign() -> Routine {
    Routine::new("sign")
        .input("x", Domain::int(-5, 5))
        .with_body(vec![
            Stmt::if_then(Expr::var("x").lt(Expr::int(0)), vec![Stmt::ret(Expr::int(-1))]),
            Stmt::ret(Expr::int(1)),
        ])
}

fn history() -> EvmHistory {
    let mut history = EvmHistory::new();
    history
        .push(evm_with_bac(100.0, 90.0, 100.0, 500.0).unwrap().dated(date(2026, 1, 31)))
        .unwrap();
    history
        .push(evm_with_bac(250.0, 230.0, 250.0, 500.0).unwrap().dated(date(2026, 2, 28)))
        .unwrap();
    history
}

fn sprint_summary() -> Result<SprintSummary, pmetric_core::MetricsError> {
    let history = [18, 22, 20];
    let v = velocity(&history)?;
    let stories = vec![
        StoryRecord::new("a", 8).with_status(StoryStatus::Done),
        StoryRecord::new("b", 5).with_status(StoryStatus::InProgress),
    ];
    Ok(SprintSummary {
        stats: Some(velocity_stats(&history)?),
        remaining_points: Some(95.0),
        forecast_sprints: Some(burndown_forecast(95.0, v)?),
        capacity: Some(20.0),
        status: Some(sprint_status(20, &stories)),
        ..SprintSummary::new(v)
    })
}

fn full_report() -> Result<pmetric_report::ProjectReport, ReportError> {
    let estimates = pert_batch(&[
        EstimateInput::new("design", 1.0, 4.0, 7.0),
        EstimateInput::new("build", 2.0, 5.0, 14.0),
    ]);
    let total = estimates.as_ref().map(|e| pert_aggregate(e)).map_err(Clone::clone);

    Ok(ReportAssembler::new("Apollo")
        .as_of(date(2026, 3, 1))
        .estimates(estimates)?
        .estimate_total(total)?
        .cocomo(cocomo_i(32.0, CocomoMode::Organic))?
        .cocomo_ii(cocomo_ii_project(&CocomoIIProject::new(32.0)))?
        .evm_history(Ok(history()))?
        .sprints(sprint_summary())?
        .test_generation(generate_tests(&sign(), &ExplorationBudget::unbounded()))?
        .finish())
}

// ============================================================================
// Assembly
// ============================================================================

#[test]
fn components_are_stored_unchanged() {
    let report = full_report().unwrap();

    assert_eq!(report.estimation.tasks.len(), 2);
    assert_eq!(report.estimation.total.unwrap().expected, 10.0);
    assert_eq!(report.earned_value.snapshots, history().snapshots().to_vec());
    assert_eq!(report.sprint.as_ref().unwrap().forecast_sprints, Some(5));

    let generation = generate_tests(&sign(), &ExplorationBudget::unbounded()).unwrap();
    assert_eq!(report.test_generation, vec![generation]);
}

#[test]
fn failing_component_is_named() {
    let err = ReportAssembler::new("P")
        .cocomo(cocomo_i(10.0, CocomoMode::Organic))
        .unwrap()
        .sprints(velocity(&[]).map(SprintSummary::new))
        .unwrap_err();
    assert_eq!(err.component(), Some(Component::Sprint));
    assert!(err.to_string().starts_with("sprint analytics failed"));
}

#[test]
fn exploration_failure_is_named() {
    let err = ReportAssembler::new("P")
        .test_generation(Err(ExplorationError::InvalidRoutine {
            routine: "broken".into(),
            reason: "unknown variable 'ghost'".into(),
        }))
        .unwrap_err();
    assert_eq!(err.component(), Some(Component::TestGeneration));
    assert!(err.to_string().contains("ghost"));
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn text_covers_every_section() {
    let report = full_report().unwrap();
    let text = TextRenderer.render(&report).unwrap();
    assert_eq!(text, render_text(&report));

    for needle in [
        "Project: Apollo",
        "As of: 2026-03-01",
        "== Estimation ==",
        "design",
        "COCOMO I:",
        "COCOMO II:",
        "== Earned value ==",
        "2026-02-28",
        "== Sprint ==",
        "Forecast: 5 sprints",
        "== Test generation: sign ==",
        "2 feasible",
    ] {
        assert!(text.contains(needle), "missing '{}' in\n{}", needle, text);
    }
}

#[test]
fn json_is_keyed_by_category() {
    let report = full_report().unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&JsonRenderer.render(&report).unwrap()).unwrap();

    assert_eq!(json["project"], "Apollo");
    assert_eq!(json["as_of"], "2026-03-01");
    assert_eq!(json["estimation"]["tasks"][0]["task_id"], "design");
    assert_eq!(json["earned_value"]["snapshots"].as_array().unwrap().len(), 2);
    assert_eq!(json["sprint"]["forecast_sprints"], 5);
    assert_eq!(json["test_generation"][0]["routine"], "sign");
}
