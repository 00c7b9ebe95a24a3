//! Sprint analytics: velocity, burndown, capacity and sprint status
//!
//! Inputs are read-only views of sprint data owned by the persistence layer.

use chrono::NaiveDate;
use pmetric_core::{MetricsError, SprintRecord, StoryRecord, StoryStatus, TeamMember};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{require_finite, require_non_negative, stats, Result};

/// Story points a full-time member delivers in one sprint
pub const NOMINAL_POINTS_PER_MEMBER: f64 = 10.0;

/// Weight applied to blocked stories when they are counted
const BLOCKED_WEIGHT: f64 = 0.5;

// ============================================================================
// Velocity
// ============================================================================

fn points_as_f64(history: &[u32]) -> Vec<f64> {
    history.iter().map(|p| f64::from(*p)).collect()
}

/// Mean completed points per sprint
pub fn velocity(history: &[u32]) -> Result<f64> {
    stats::mean(&points_as_f64(history))
        .ok_or_else(|| MetricsError::EmptyHistory("no completed sprints".into()))
}

/// Mean of the last `window` sprints (all of them if fewer exist)
pub fn rolling_velocity(history: &[u32], window: usize) -> Result<f64> {
    if window == 0 {
        return Err(MetricsError::InvalidInput(
            "velocity window must be at least one sprint".into(),
        ));
    }
    let start = history.len().saturating_sub(window);
    velocity(&history[start..])
}

/// Spread of completed points across sprints
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub sprints: usize,
}

pub fn velocity_stats(history: &[u32]) -> Result<VelocityStats> {
    let values = points_as_f64(history);
    let empty = || MetricsError::EmptyHistory("no completed sprints".into());
    Ok(VelocityStats {
        mean: stats::mean(&values).ok_or_else(empty)?,
        std_dev: stats::std_dev(&values).ok_or_else(empty)?,
        min: stats::min(&values).ok_or_else(empty)?,
        max: stats::max(&values).ok_or_else(empty)?,
        sprints: values.len(),
    })
}

/// Velocity over sprint records
pub fn velocity_of(records: &[SprintRecord]) -> Result<f64> {
    let history: Vec<u32> = records.iter().map(|r| r.completed_points).collect();
    velocity(&history)
}

/// Which unfinished stories count toward a sprint's velocity
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityOptions {
    pub include_in_progress: bool,
    /// Fraction of an in-progress story's points credited, in [0, 1]
    pub in_progress_weight: f64,
    /// Count blocked stories at half weight
    pub include_blocked: bool,
}

impl Default for VelocityOptions {
    fn default() -> Self {
        Self {
            include_in_progress: false,
            in_progress_weight: 0.5,
            include_blocked: false,
        }
    }
}

/// Velocity of one sprint from its stories, rounded to whole points.
///
/// Done stories count fully; in-progress and blocked stories count only
/// when the options include them.
pub fn weighted_velocity(stories: &[StoryRecord], options: &VelocityOptions) -> Result<u32> {
    let weight = require_finite("in-progress weight", options.in_progress_weight)?;
    if !(0.0..=1.0).contains(&weight) {
        return Err(MetricsError::InvalidInput(format!(
            "in-progress weight must be between 0 and 1, got {}",
            weight
        )));
    }

    let total: f64 = stories
        .iter()
        .map(|story| {
            let points = f64::from(story.points);
            match story.status {
                StoryStatus::Done => points,
                StoryStatus::InProgress if options.include_in_progress => points * weight,
                StoryStatus::Blocked if options.include_blocked => points * BLOCKED_WEIGHT,
                _ => 0.0,
            }
        })
        .sum();

    Ok(total.round() as u32)
}

// ============================================================================
// Burndown
// ============================================================================

/// Sprints needed to finish `remaining` points at `velocity` points per sprint
pub fn burndown_forecast(remaining: f64, velocity: f64) -> Result<u32> {
    let remaining = require_non_negative("remaining points", remaining)?;
    let velocity = require_finite("velocity", velocity)?;
    if velocity <= 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "velocity must be positive to forecast, got {}",
            velocity
        )));
    }
    Ok((remaining / velocity).ceil() as u32)
}

/// Ideal and actual remaining work per calendar day of a sprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurndownChart {
    pub dates: Vec<NaiveDate>,
    pub ideal_remaining: Vec<f64>,
    pub actual_remaining: Vec<f64>,
}

/// Build a burndown chart from `start` to `end` inclusive.
///
/// `completions` are `(date, points)` pairs in any order; each counts from
/// its date onward.
pub fn burndown_chart(
    total: f64,
    start: NaiveDate,
    end: NaiveDate,
    completions: &[(NaiveDate, f64)],
) -> Result<BurndownChart> {
    let total = require_non_negative("total points", total)?;
    if end < start {
        return Err(MetricsError::InvalidInput(format!(
            "sprint end {} is before its start {}",
            end, start
        )));
    }
    for (date, points) in completions {
        require_non_negative(&format!("points completed on {}", date), *points)?;
    }

    let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
    let last = dates.len().saturating_sub(1);

    let ideal_remaining = (0..dates.len())
        .map(|i| {
            if last == 0 {
                0.0
            } else {
                total * (1.0 - i as f64 / last as f64)
            }
        })
        .collect();

    let actual_remaining = dates
        .iter()
        .map(|day| {
            let done: f64 = completions
                .iter()
                .filter(|(date, _)| date <= day)
                .map(|(_, points)| points)
                .sum();
            (total - done).max(0.0)
        })
        .collect();

    Ok(BurndownChart {
        dates,
        ideal_remaining,
        actual_remaining,
    })
}

// ============================================================================
// Capacity and status
// ============================================================================

/// Team capacity in points at the nominal rate
pub fn capacity(members: &[TeamMember]) -> Result<f64> {
    capacity_with_rate(members, NOMINAL_POINTS_PER_MEMBER)
}

/// Team capacity with an explicit points-per-member rate
pub fn capacity_with_rate(members: &[TeamMember], points_per_member: f64) -> Result<f64> {
    let rate = require_non_negative("points per member", points_per_member)?;
    members.iter().try_fold(0.0, |acc, member| -> Result<f64> {
        let availability = require_finite(&format!("availability of {}", member.name), member.availability)?;
        if !(0.0..=1.0).contains(&availability) {
            return Err(MetricsError::InvalidInput(format!(
                "availability of {} must be between 0 and 1, got {}",
                member.name, availability
            )));
        }
        Ok(acc + availability * rate)
    })
}

/// Planned versus completed work for one sprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprintStatus {
    pub planned: u64,
    pub completed: u64,
    /// Capacity minus planned points; negative when overloaded
    pub remaining_capacity: i64,
    pub percent_complete: f64,
    pub overloaded: bool,
    /// Nothing planned and no capacity
    pub trivial: bool,
    /// Points per status
    pub breakdown: BTreeMap<StoryStatus, u64>,
}

/// Compare the points planned for a sprint with its `capacity`
pub fn sprint_status(capacity: u32, stories: &[StoryRecord]) -> SprintStatus {
    let planned: u64 = stories.iter().map(|s| u64::from(s.points)).sum();
    let completed: u64 = stories
        .iter()
        .filter(|s| s.status == StoryStatus::Done)
        .map(|s| u64::from(s.points))
        .sum();

    let mut breakdown = BTreeMap::new();
    for story in stories {
        *breakdown.entry(story.status).or_insert(0) += u64::from(story.points);
    }

    let remaining_capacity =
        i64::from(capacity).saturating_sub(i64::try_from(planned).unwrap_or(i64::MAX));
    let percent_complete = if planned > 0 {
        stats::round_to(completed as f64 / planned as f64 * 100.0, 2)
    } else if capacity > 0 {
        0.0
    } else {
        100.0
    };

    SprintStatus {
        planned,
        completed,
        remaining_capacity,
        percent_complete,
        overloaded: remaining_capacity < 0,
        trivial: planned == 0 && capacity == 0,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn story(points: u32, status: StoryStatus) -> StoryRecord {
        StoryRecord::new(format!("s{}", points), points).with_status(status)
    }

    #[test]
    fn velocity_is_mean() {
        assert_eq!(velocity(&[20, 25, 30]).unwrap(), 25.0);
        assert!(matches!(velocity(&[]), Err(MetricsError::EmptyHistory(_))));
    }

    #[test]
    fn rolling_velocity_uses_latest_sprints() {
        let history = [10, 20, 30, 40];
        assert_eq!(rolling_velocity(&history, 2).unwrap(), 35.0);
        assert_eq!(rolling_velocity(&history, 10).unwrap(), 25.0);
        assert!(rolling_velocity(&history, 0).is_err());
    }

    #[test]
    fn stats_over_history() {
        let s = velocity_stats(&[10, 20, 30]).unwrap();
        assert_eq!(s.mean, 20.0);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert_eq!(s.sprints, 3);
        assert!((s.std_dev - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!(velocity_stats(&[]).is_err());
    }

    #[test]
    fn velocity_from_records() {
        let records = vec![SprintRecord::new("S1", 18), SprintRecord::new("S2", 22)];
        assert_eq!(velocity_of(&records).unwrap(), 20.0);
    }

    #[test]
    fn weighted_velocity_counts_done_by_default() {
        let stories = vec![
            story(5, StoryStatus::Done),
            story(8, StoryStatus::InProgress),
            story(3, StoryStatus::Blocked),
            story(2, StoryStatus::Todo),
        ];
        assert_eq!(weighted_velocity(&stories, &VelocityOptions::default()).unwrap(), 5);

        let options = VelocityOptions {
            include_in_progress: true,
            in_progress_weight: 0.5,
            include_blocked: true,
        };
        // 5 + 8*0.5 + 3*0.5 = 10.5, rounded away from zero
        assert_eq!(weighted_velocity(&stories, &options).unwrap(), 11);
    }

    #[test]
    fn weighted_velocity_rejects_bad_weight() {
        let options = VelocityOptions {
            include_in_progress: true,
            in_progress_weight: 1.5,
            include_blocked: false,
        };
        assert!(matches!(
            weighted_velocity(&[], &options),
            Err(MetricsError::InvalidInput(_))
        ));
    }

    #[test]
    fn forecast_rounds_up() {
        assert_eq!(burndown_forecast(45.0, 20.0).unwrap(), 3);
        assert_eq!(burndown_forecast(40.0, 20.0).unwrap(), 2);
        assert_eq!(burndown_forecast(0.0, 20.0).unwrap(), 0);
    }

    #[test]
    fn forecast_rejects_bad_velocity() {
        assert!(matches!(
            burndown_forecast(10.0, 0.0),
            Err(MetricsError::InvalidInput(_))
        ));
        assert!(burndown_forecast(10.0, -2.0).is_err());
        assert!(burndown_forecast(-1.0, 5.0).is_err());
    }

    #[test]
    fn capacity_sums_availability() {
        let team = vec![
            TeamMember::new("ana", 1.0),
            TeamMember::new("bo", 0.5),
            TeamMember::new("cy", 0.0),
        ];
        assert_eq!(capacity(&team).unwrap(), 15.0);
        assert_eq!(capacity_with_rate(&team, 8.0).unwrap(), 12.0);
        assert_eq!(capacity(&[]).unwrap(), 0.0);
    }

    #[test]
    fn capacity_rejects_out_of_range_availability() {
        let team = vec![TeamMember::new("dee", 1.2)];
        assert!(matches!(capacity(&team), Err(MetricsError::InvalidInput(_))));
    }

    #[test]
    fn burndown_chart_daily_lines() {
        let chart = burndown_chart(
            20.0,
            date(2025, 3, 3),
            date(2025, 3, 7),
            &[(date(2025, 3, 4), 5.0), (date(2025, 3, 6), 10.0)],
        )
        .unwrap();

        assert_eq!(chart.dates.len(), 5);
        assert_eq!(chart.dates[0], date(2025, 3, 3));
        assert_eq!(chart.ideal_remaining, vec![20.0, 15.0, 10.0, 5.0, 0.0]);
        assert_eq!(chart.actual_remaining, vec![20.0, 15.0, 15.0, 5.0, 5.0]);
    }

    #[test]
    fn one_day_sprint_goes_straight_to_zero() {
        let day = date(2025, 3, 3);
        let chart = burndown_chart(8.0, day, day, &[]).unwrap();
        assert_eq!(chart.ideal_remaining, vec![0.0]);
        assert_eq!(chart.actual_remaining, vec![8.0]);
    }

    #[test]
    fn burndown_rejects_reversed_dates() {
        let err = burndown_chart(8.0, date(2025, 3, 7), date(2025, 3, 3), &[]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidInput(_)));
    }

    #[test]
    fn sprint_status_flags() {
        let stories = vec![
            story(5, StoryStatus::Done),
            story(8, StoryStatus::InProgress),
            story(3, StoryStatus::Done),
        ];
        let status = sprint_status(10, &stories);
        assert_eq!(status.planned, 16);
        assert_eq!(status.completed, 8);
        assert_eq!(status.remaining_capacity, -6);
        assert!(status.overloaded);
        assert!(!status.trivial);
        assert_eq!(status.percent_complete, 50.0);
        assert_eq!(status.breakdown.get(&StoryStatus::Done), Some(&8));
        assert_eq!(status.breakdown.get(&StoryStatus::InProgress), Some(&8));
    }

    #[test]
    fn sprint_status_without_stories() {
        let empty = sprint_status(20, &[]);
        assert_eq!(empty.percent_complete, 0.0);
        assert!(!empty.trivial);

        let trivial = sprint_status(0, &[]);
        assert_eq!(trivial.percent_complete, 100.0);
        assert!(trivial.trivial);
    }

    #[test]
    fn sprint_status_percent_rounding() {
        let stories = vec![story(1, StoryStatus::Done), story(2, StoryStatus::Todo)];
        assert_eq!(sprint_status(10, &stories).percent_complete, 33.33);
    }

    #[test]
    fn sprint_status_totals_exceed_u32() {
        let stories = vec![
            story(3_000_000_000, StoryStatus::Done),
            story(3_000_000_000, StoryStatus::Todo),
        ];
        let status = sprint_status(10, &stories);
        assert_eq!(status.planned, 6_000_000_000);
        assert_eq!(status.completed, 3_000_000_000);
        assert_eq!(status.remaining_capacity, 10 - 6_000_000_000);
        assert!(status.overloaded);
        assert_eq!(status.percent_complete, 50.0);
        assert_eq!(status.breakdown.get(&StoryStatus::Done), Some(&3_000_000_000));
    }
}
