//! Estimation workflow over the public API
//!
//! Mirrors how a planning front end uses the crate: PERT for the backlog,
//! COCOMO for the size-based cross-check, EVM over a dated history, and
//! sprint analytics for the forecast.

use chrono::NaiveDate;
use pmetric_core::{
    CocomoIIProject, CocomoMode, EstimateInput, EvmHistory, SprintRecord, StoryRecord,
    StoryStatus, TaskProgress, TeamMember,
};
use pmetric_metrics::{
    burndown_forecast, capacity, cocomo_i, cocomo_ii_project, earned_value, evm_with_bac,
    pert_aggregate, pert_batch, planned_value, sprint_status, velocity_of, Metric, MetricsError,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// PERT backlog
// ============================================================================

#[test]
fn backlog_pert_rolls_up() {
    let backlog = vec![
        EstimateInput::new("design", 1.0, 4.0, 7.0),
        EstimateInput::new("build", 2.0, 5.0, 14.0),
        EstimateInput::new("test", 1.0, 2.0, 3.0),
    ];
    let estimates = pert_batch(&backlog).unwrap();
    let ids: Vec<&str> = estimates.iter().map(|e| e.task_id.as_str()).collect();
    assert_eq!(ids, vec!["design", "build", "test"]);

    let total = pert_aggregate(&estimates);
    // 4 + 6 + 2
    assert!(close(total.expected, 12.0));
    // 1 + 4 + 1/9
    assert!(close(total.variance, 5.0 + 1.0 / 9.0));
}

#[test]
fn bad_task_is_named() {
    let backlog = vec![
        EstimateInput::new("ok", 1.0, 2.0, 3.0),
        EstimateInput::new("reversed", 5.0, 2.0, 1.0),
    ];
    match pert_batch(&backlog) {
        Err(MetricsError::InvalidEstimate(msg)) => assert!(msg.contains("reversed")),
        other => panic!("expected InvalidEstimate, got {:?}", other),
    }
}

// ============================================================================
// COCOMO cross-check
// ============================================================================

#[test]
fn cocomo_models_agree_in_magnitude() {
    let basic = cocomo_i(32.0, CocomoMode::Organic).unwrap();
    let nominal = cocomo_ii_project(&CocomoIIProject::new(32.0)).unwrap();

    assert!(basic.effort_pm > 0.0 && nominal.effort_pm > 0.0);
    let ratio = basic.effort_pm / nominal.effort_pm;
    assert!(ratio > 0.25 && ratio < 4.0, "ratio {}", ratio);
    assert!(nominal.schedule_months > 0.0);
}

#[test]
fn cost_drivers_scale_effort() {
    let nominal = cocomo_ii_project(&CocomoIIProject::new(10.0)).unwrap();
    let demanding = cocomo_ii_project(&CocomoIIProject::new(10.0).cost_driver("RELY", 1.26)).unwrap();
    assert!(close(demanding.effort_pm, nominal.effort_pm * 1.26));
    assert!(close(demanding.eaf, 1.26));
}

// ============================================================================
// Earned value history
// ============================================================================

#[test]
fn evm_history_tracks_cpi() {
    let periods = [100.0, 150.0, 250.0];
    let bac = planned_value(&periods, None).unwrap();
    assert!(close(bac, 500.0));

    let tasks = [
        TaskProgress {
            budget: 200.0,
            percent_complete: 1.0,
        },
        TaskProgress {
            budget: 300.0,
            percent_complete: 0.1,
        },
    ];
    let ev = earned_value(&tasks).unwrap();
    assert!(close(ev, 230.0));

    let mut history = EvmHistory::new();
    let first = evm_with_bac(planned_value(&periods, Some(0)).unwrap(), 90.0, 100.0, bac)
        .unwrap()
        .dated(date(2026, 1, 31));
    let second = evm_with_bac(planned_value(&periods, Some(1)).unwrap(), ev, 250.0, bac)
        .unwrap()
        .dated(date(2026, 2, 28));
    history.push(first).unwrap();
    history.push(second).unwrap();

    let trend: Vec<f64> = history.cpi_trend().iter().filter_map(Metric::value).collect();
    assert_eq!(trend.len(), 2);
    assert!(close(trend[0], 0.9));
    assert!(close(trend[1], 230.0 / 250.0));

    let stale = evm_with_bac(100.0, 10.0, 10.0, bac)
        .unwrap()
        .dated(date(2026, 2, 1));
    assert!(matches!(history.push(stale), Err(MetricsError::InvalidInput(_))));
    assert_eq!(history.len(), 2);
}

#[test]
fn nothing_spent_leaves_indices_undefined() {
    let snapshot = evm_with_bac(0.0, 0.0, 0.0, 100.0).unwrap();
    assert!(snapshot.cpi.is_undefined());
    assert!(snapshot.spi.is_undefined());
    assert!(snapshot.eac.is_undefined());
    assert!(snapshot.vac.is_undefined());
}

// ============================================================================
// Sprint forecast
// ============================================================================

#[test]
fn sprint_forecast_from_history() {
    let sprints = vec![
        SprintRecord::new("s1", 18),
        SprintRecord::new("s2", 22),
        SprintRecord::new("s3", 20),
    ];
    let v = velocity_of(&sprints).unwrap();
    assert!(close(v, 20.0));
    assert_eq!(burndown_forecast(95.0, v).unwrap(), 5);

    let team = vec![
        TeamMember::new("ana", 1.0),
        TeamMember::new("bo", 0.5),
        TeamMember::new("cy", 0.8),
    ];
    let cap = capacity(&team).unwrap();
    assert!(close(cap, 23.0));

    let stories = vec![
        StoryRecord::new("a", 8).with_status(StoryStatus::normalize("Done")),
        StoryRecord::new("b", 5).with_status(StoryStatus::normalize("in progress")),
        StoryRecord::new("c", 13).with_status(StoryStatus::normalize("whatever")),
    ];
    let status = sprint_status(cap as u32, &stories);
    assert_eq!(status.planned, 26);
    assert_eq!(status.completed, 8);
    assert_eq!(status.remaining_capacity, -3);
    assert!(status.overloaded);
    assert_eq!(status.breakdown.get(&StoryStatus::Todo), Some(&13));
}

#[test]
fn empty_history_has_no_velocity() {
    assert!(matches!(velocity_of(&[]), Err(MetricsError::EmptyHistory(_))));
}
