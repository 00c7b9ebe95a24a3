//! Earned value management
//!
//! Snapshot indices follow the usual EVM definitions. Every index with a
//! zero denominator is `Metric::Undefined`, and so is anything derived from
//! an undefined index.

use pmetric_core::{EvmSnapshot, Metric, MetricsError, TaskProgress};

use crate::{require_non_negative, Result};

/// Snapshot from planned value, earned value and actual cost.
///
/// The budget at completion is taken to be the planned value.
pub fn evm(pv: f64, ev: f64, ac: f64) -> Result<EvmSnapshot> {
    evm_with_bac(pv, ev, ac, pv)
}

/// Snapshot with an explicit budget at completion
pub fn evm_with_bac(pv: f64, ev: f64, ac: f64, bac: f64) -> Result<EvmSnapshot> {
    let pv = require_non_negative("PV", pv)?;
    let ev = require_non_negative("EV", ev)?;
    let ac = require_non_negative("AC", ac)?;
    let bac = require_non_negative("BAC", bac)?;

    let cpi = Metric::ratio(ev, ac);
    let spi = Metric::ratio(ev, pv);
    let remaining = bac - ev;
    let eac = cpi.and_then(|cpi| Metric::ratio(remaining, cpi)).map(|r| ac + r);
    let etc = eac.map(|eac| eac - ac);
    let vac = eac.map(|eac| bac - eac);
    let tcpi = Metric::ratio(remaining, bac - ac);

    if cpi.is_undefined() || spi.is_undefined() {
        tracing::debug!(pv, ev, ac, "EVM indices undefined for zero denominator");
    }

    Ok(EvmSnapshot {
        date: None,
        pv,
        ev,
        ac,
        bac,
        cv: ev - ac,
        sv: ev - pv,
        cpi,
        spi,
        eac,
        eac_atypical: ac + remaining,
        etc,
        vac,
        tcpi,
    })
}

/// Cumulative planned value through period `upto` (inclusive).
///
/// `None` sums every period, which is the BAC.
pub fn planned_value(periods: &[f64], upto: Option<usize>) -> Result<f64> {
    let end = upto.map_or(periods.len(), |i| i.saturating_add(1).min(periods.len()));
    periods[..end]
        .iter()
        .enumerate()
        .try_fold(0.0, |acc, (i, v)| -> Result<f64> {
            Ok(acc + require_non_negative(&format!("planned value for period {}", i), *v)?)
        })
}

/// Earned value from per-task completion; percentages are clamped to [0, 1]
pub fn earned_value(tasks: &[TaskProgress]) -> Result<f64> {
    tasks.iter().enumerate().try_fold(0.0, |acc, (i, task)| -> Result<f64> {
        let budget = require_non_negative(&format!("budget of task {}", i), task.budget)?;
        if task.percent_complete.is_nan() {
            return Err(MetricsError::InvalidInput(format!(
                "percent complete of task {} is not a number",
                i
            )));
        }
        Ok(acc + task.percent_complete.clamp(0.0, 1.0) * budget)
    })
}

/// Actual cost as the sum of recorded costs
pub fn actual_cost(costs: &[f64]) -> Result<f64> {
    costs.iter().enumerate().try_fold(0.0, |acc, (i, c)| -> Result<f64> {
        Ok(acc + require_non_negative(&format!("cost {}", i), *c)?)
    })
}
