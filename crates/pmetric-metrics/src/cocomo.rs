//! COCOMO effort and schedule models
//!
//! Basic COCOMO (1981) uses one coefficient table per development mode.
//! COCOMO II (post-architecture) derives the size exponent from five scale
//! factors and multiplies effort by the product of the cost drivers.

use pmetric_core::{
    CocomoEstimate, CocomoIIEstimate, CocomoIIProject, CocomoMode, CocomoProject, MetricsError,
};
use std::collections::BTreeMap;

use crate::{require_finite, require_positive, Result};

// ============================================================================
// COCOMO I
// ============================================================================

/// Basic COCOMO coefficients: effort = a·KLOC^b, schedule = c·effort^d
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CocomoCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl CocomoCoefficients {
    pub const fn for_mode(mode: CocomoMode) -> Self {
        match mode {
            CocomoMode::Organic => Self {
                a: 2.4,
                b: 1.05,
                c: 2.5,
                d: 0.38,
            },
            CocomoMode::SemiDetached => Self {
                a: 3.0,
                b: 1.12,
                c: 2.5,
                d: 0.35,
            },
            CocomoMode::Embedded => Self {
                a: 3.6,
                b: 1.20,
                c: 2.5,
                d: 0.32,
            },
        }
    }
}

/// Basic COCOMO estimate for a project of `kloc` thousand lines
pub fn cocomo_i(kloc: f64, mode: CocomoMode) -> Result<CocomoEstimate> {
    let kloc = require_positive("kloc", kloc)?;
    let k = CocomoCoefficients::for_mode(mode);

    let effort_pm = k.a * kloc.powf(k.b);
    let schedule_months = k.c * effort_pm.powf(k.d);
    tracing::debug!(kloc, mode = %mode, effort_pm, schedule_months, "COCOMO I estimate");

    Ok(CocomoEstimate {
        effort_pm,
        schedule_months,
        staff: effort_pm / schedule_months,
        productivity: kloc * 1000.0 / effort_pm,
    })
}

// ============================================================================
// COCOMO II
// ============================================================================

const A: f64 = 2.94;
const B: f64 = 0.91;
const C: f64 = 3.67;
const D: f64 = 0.28;

/// Sum of the "extra low" ratings of the five standard scale factors
const MAX_SCALE_FACTOR_SUM: f64 = 31.62;

/// Nominal ratings of the standard scale factors
pub const NOMINAL_SCALE_FACTORS: [(&str, f64); 5] = [
    ("PREC", 3.72),
    ("FLEX", 3.04),
    ("RESL", 4.24),
    ("TEAM", 3.29),
    ("PMAT", 4.68),
];

/// Post-architecture COCOMO II estimate.
///
/// Missing standard scale factors take their nominal rating, supplied ones
/// override it, and unknown names are added to the sum. An empty driver map
/// means an effort adjustment factor of 1.0.
pub fn cocomo_ii(
    kloc: f64,
    cost_drivers: &BTreeMap<String, f64>,
    scale_factors: &BTreeMap<String, f64>,
) -> Result<CocomoIIEstimate> {
    let kloc = require_positive("kloc", kloc)?;

    let mut factors: BTreeMap<&str, f64> = NOMINAL_SCALE_FACTORS.iter().copied().collect();
    for (name, rating) in scale_factors {
        let rating = require_finite(&format!("scale factor {}", name), *rating)?;
        if rating < 0.0 {
            return Err(MetricsError::InvalidInput(format!(
                "scale factor {} cannot be negative, got {}",
                name, rating
            )));
        }
        factors.insert(name.as_str(), rating);
    }

    let mut eaf = 1.0;
    for (name, multiplier) in cost_drivers {
        eaf *= require_positive(&format!("cost driver {}", name), *multiplier)?;
    }

    let sf_sum: f64 = factors.values().sum();
    let sf_sum = sf_sum.clamp(0.0, MAX_SCALE_FACTOR_SUM);
    let exponent = B + 0.01 * sf_sum;

    let effort_pm = A * kloc.powf(exponent) * eaf;
    let schedule_months = C * effort_pm.powf(D + 0.2 * (exponent - B));
    tracing::debug!(kloc, exponent, eaf, effort_pm, "COCOMO II estimate");

    Ok(CocomoIIEstimate {
        effort_pm,
        schedule_months,
        staff: effort_pm / schedule_months,
        exponent,
        eaf,
    })
}

pub fn cocomo_i_project(project: &CocomoProject) -> Result<CocomoEstimate> {
    cocomo_i(project.kloc, project.mode)
}

pub fn cocomo_ii_project(project: &CocomoIIProject) -> Result<CocomoIIEstimate> {
    cocomo_ii(project.kloc, &project.cost_drivers, &project.scale_factors)
}
