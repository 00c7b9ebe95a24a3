//! PERT three-point estimation

use pmetric_core::{EstimateInput, MetricsError, PertResult, TaskEstimate, ThreePointEstimate};
use rayon::prelude::*;

use crate::Result;

/// PERT expected duration and spread for one task.
///
/// Requires `0 <= optimistic <= likely <= pessimistic`, all finite.
pub fn pert(optimistic: f64, likely: f64, pessimistic: f64) -> Result<PertResult> {
    for (name, value) in [
        ("optimistic", optimistic),
        ("likely", likely),
        ("pessimistic", pessimistic),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(MetricsError::InvalidEstimate(format!(
                "{} value must be a non-negative finite number, got {}",
                name, value
            )));
        }
    }
    if optimistic > likely || likely > pessimistic {
        return Err(MetricsError::InvalidEstimate(format!(
            "expected optimistic <= likely <= pessimistic, got ({}, {}, {})",
            optimistic, likely, pessimistic
        )));
    }

    let expected = (optimistic + 4.0 * likely + pessimistic) / 6.0;
    let spread = (pessimistic - optimistic) / 6.0;
    let variance = spread * spread;
    Ok(PertResult {
        expected,
        variance,
        std_dev: variance.sqrt(),
    })
}

pub fn pert_estimate(estimate: &ThreePointEstimate) -> Result<PertResult> {
    pert(estimate.optimistic, estimate.likely, estimate.pessimistic)
}

/// PERT for every task, computed in parallel; output keeps input order.
///
/// The first invalid task (in input order) is reported with its id.
pub fn pert_batch(inputs: &[EstimateInput]) -> Result<Vec<TaskEstimate>> {
    let results: Vec<Result<TaskEstimate>> = inputs
        .par_iter()
        .map(|input| {
            pert_estimate(&input.estimate)
                .map(|pert| TaskEstimate {
                    task_id: input.task_id.clone(),
                    pert,
                })
                .map_err(|e| match e {
                    MetricsError::InvalidEstimate(msg) => {
                        MetricsError::InvalidEstimate(format!("task '{}': {}", input.task_id, msg))
                    }
                    other => other,
                })
        })
        .collect();

    let estimates = results.into_iter().collect::<Result<Vec<_>>>()?;
    tracing::debug!(tasks = estimates.len(), "computed PERT batch");
    Ok(estimates)
}

/// Aggregate a chain of sequential tasks: expectations and variances add
pub fn pert_aggregate(estimates: &[TaskEstimate]) -> PertResult {
    let expected = estimates.iter().map(|e| e.pert.expected).sum();
    let variance: f64 = estimates.iter().map(|e| e.pert.variance).sum();
    PertResult {
        expected,
        variance,
        std_dev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn textbook_estimate() {
        let result = pert(2.0, 4.0, 12.0).unwrap();
        assert_eq!(result.expected, 5.0);
        assert!(close(result.variance, 25.0 / 9.0));
        assert!(close(result.std_dev, 5.0 / 3.0));
    }

    #[test]
    fn degenerate_estimate_has_no_spread() {
        let result = pert(3.0, 3.0, 3.0).unwrap();
        assert_eq!(result.expected, 3.0);
        assert_eq!(result.variance, 0.0);
        assert_eq!(result.std_dev, 0.0);
    }

    #[test]
    fn rejects_misordered_values() {
        assert!(matches!(
            pert(5.0, 4.0, 12.0),
            Err(MetricsError::InvalidEstimate(_))
        ));
        assert!(matches!(
            pert(1.0, 13.0, 12.0),
            Err(MetricsError::InvalidEstimate(_))
        ));
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(pert(-1.0, 2.0, 3.0).is_err());
        assert!(pert(1.0, f64::NAN, 3.0).is_err());
        assert!(pert(1.0, 2.0, f64::INFINITY).is_err());
    }

    #[test]
    fn batch_preserves_order() {
        let inputs: Vec<EstimateInput> = (0..50)
            .map(|i| {
                let base = f64::from(i);
                EstimateInput::new(format!("t{}", i), base, base + 1.0, base + 5.0)
            })
            .collect();
        let estimates = pert_batch(&inputs).unwrap();
        let ids: Vec<&str> = estimates.iter().map(|e| e.task_id.as_str()).collect();
        let expected: Vec<String> = (0..50).map(|i| format!("t{}", i)).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn batch_reports_failing_task() {
        let inputs = vec![
            EstimateInput::new("ok", 1.0, 2.0, 3.0),
            EstimateInput::new("bad", 3.0, 2.0, 1.0),
        ];
        let err = pert_batch(&inputs).unwrap_err();
        assert!(err.to_string().contains("task 'bad'"));
    }

    #[test]
    fn aggregate_sums_variance() {
        let inputs = vec![
            EstimateInput::new("a", 2.0, 4.0, 12.0),
            EstimateInput::new("b", 1.0, 1.0, 7.0),
        ];
        let total = pert_aggregate(&pert_batch(&inputs).unwrap());
        assert!(close(total.expected, 5.0 + 2.0));
        assert!(close(total.variance, 25.0 / 9.0 + 1.0));
        assert!(close(total.std_dev, (25.0f64 / 9.0 + 1.0).sqrt()));
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        let total = pert_aggregate(&[]);
        assert_eq!(total.expected, 0.0);
        assert_eq!(total.std_dev, 0.0);
    }

    proptest! {
        #[test]
        fn expected_lies_between_bounds(
            o in 0.0f64..1000.0,
            d1 in 0.0f64..1000.0,
            d2 in 0.0f64..1000.0,
        ) {
            let m = o + d1;
            let p = m + d2;
            let result = pert(o, m, p).unwrap();
            prop_assert!(result.expected >= o - 1e-9);
            prop_assert!(result.expected <= p + 1e-9);
            prop_assert!(result.variance >= 0.0);
        }
    }
}
