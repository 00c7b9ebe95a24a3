//! # pmetric-metrics
//!
//! Deterministic estimation and tracking metrics.
//!
//! - [`pert`]: three-point estimates, batch and chained aggregation
//! - [`cocomo`]: basic COCOMO and post-architecture COCOMO II
//! - [`evm`]: earned value snapshots and PV/EV/AC roll-ups
//! - [`sprint`]: velocity, burndown, capacity and sprint status
//!
//! Every function is pure. Invalid input yields a [`MetricsError`], while a
//! ratio with a zero denominator is reported as [`Metric::Undefined`].
//!
//! ## Example
//!
//! ```rust
//! use pmetric_metrics::{burndown_forecast, evm, pert};
//!
//! let estimate = pert(2.0, 4.0, 12.0).unwrap();
//! assert_eq!(estimate.expected, 5.0);
//!
//! let snapshot = evm(100.0, 80.0, 90.0).unwrap();
//! assert_eq!(snapshot.sv, -20.0);
//!
//! assert_eq!(burndown_forecast(45.0, 20.0).unwrap(), 3);
//! ```

pub mod cocomo;
pub mod evm;
pub mod pert;
pub mod sprint;
pub mod stats;

pub use cocomo::{
    cocomo_i, cocomo_i_project, cocomo_ii, cocomo_ii_project, CocomoCoefficients,
    NOMINAL_SCALE_FACTORS,
};
pub use evm::{actual_cost, earned_value, evm, evm_with_bac, planned_value};
pub use pert::{pert, pert_aggregate, pert_batch, pert_estimate};
pub use sprint::{
    burndown_chart, burndown_forecast, capacity, capacity_with_rate, rolling_velocity,
    sprint_status, velocity, velocity_of, velocity_stats, weighted_velocity, BurndownChart,
    SprintStatus, VelocityOptions, VelocityStats, NOMINAL_POINTS_PER_MEMBER,
};

pub use pmetric_core::{Metric, MetricsError};

/// Result alias for metric computations
pub type Result<T> = std::result::Result<T, MetricsError>;

pub(crate) fn require_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricsError::InvalidInput(format!(
            "{} must be a finite number, got {}",
            name, value
        )))
    }
}

pub(crate) fn require_non_negative(name: &str, value: f64) -> Result<f64> {
    let value = require_finite(name, value)?;
    if value < 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "{} cannot be negative, got {}",
            name, value
        )));
    }
    Ok(value)
}

pub(crate) fn require_positive(name: &str, value: f64) -> Result<f64> {
    let value = require_finite(name, value)?;
    if value <= 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(value)
}
