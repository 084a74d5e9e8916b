//! Sample statistics, confidence intervals and the bound gap.
//!
//! Numerical considerations: the interval is `mean +/- q * s / sqrt(n)` with the sample standard
//! deviation `s` (`n - 1` denominator) and `q` the two-sided normal or Student-t quantile. It is
//! undefined for fewer than two values and is then omitted rather than reported as zero-width.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use super::config::IntervalMethod;
use crate::core::{DeterministicBound, Gap, MspError, OptimizationSense, Result};

/// Two-sided confidence interval around a sample mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
    pub std_error: f64,
    pub percentile: f64,
}

pub fn sample_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with `n - 1` denominator; 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = sample_mean(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Two-sided critical value at `percentile` for a sample of size `n`.
pub fn critical_value(percentile: f64, n: usize, method: IntervalMethod) -> Result<f64> {
    if !(percentile.is_finite() && percentile > 0.0 && percentile < 100.0) {
        return Err(MspError::invalid(format!(
            "percentile must lie in (0, 100), got {percentile}"
        )));
    }
    let p = 1.0 - (1.0 - percentile / 100.0) / 2.0;
    match method {
        IntervalMethod::Normal => {
            let normal = Normal::new(0.0, 1.0).map_err(|e| MspError::invalid(e.to_string()))?;
            Ok(normal.inverse_cdf(p))
        }
        IntervalMethod::StudentT => {
            if n < 2 {
                return Err(MspError::invalid("Student-t interval needs at least 2 values"));
            }
            let t = StudentsT::new(0.0, 1.0, (n - 1) as f64)
                .map_err(|e| MspError::invalid(e.to_string()))?;
            Ok(t.inverse_cdf(p))
        }
    }
}

/// Confidence interval of the mean of `values`, or `None` for fewer than two values.
pub fn confidence_interval(
    values: &[f64],
    percentile: f64,
    method: IntervalMethod,
) -> Result<Option<ConfidenceInterval>> {
    if values.len() < 2 {
        return Ok(None);
    }
    let q = critical_value(percentile, values.len(), method)?;
    let mean = sample_mean(values);
    let std_error = sample_std(values) / (values.len() as f64).sqrt();
    Ok(Some(ConfidenceInterval {
        lower: mean - q * std_error,
        upper: mean + q * std_error,
        mean,
        std_error,
        percentile,
    }))
}

/// Probability-weighted expectation of per-path values.
pub fn weighted_expectation(values: &[f64], weights: &[f64]) -> Result<f64> {
    if values.len() != weights.len() {
        return Err(MspError::dimension(format!(
            "{} values but {} weights",
            values.len(),
            weights.len()
        )));
    }
    Ok(values.iter().zip(weights).map(|(v, w)| v * w).sum())
}

/// Relative gap between the best available estimate and the deterministic bound.
///
/// Preference order: the interval end on the far side of the bound, then the exact expected
/// value, then the first path value. A missing or zero bound gives [`Gap::Unavailable`].
pub fn compute_gap(
    bound: Option<DeterministicBound>,
    interval: Option<&ConfidenceInterval>,
    exact_expected_value: Option<f64>,
    first_value: Option<f64>,
) -> Gap {
    let Some(bound) = bound else {
        return Gap::Unavailable;
    };
    let db = bound.value;
    if db == 0.0 || !db.is_finite() {
        return Gap::Unavailable;
    }

    let distance = match (interval, exact_expected_value, first_value) {
        (Some(ci), _, _) => match bound.sense {
            OptimizationSense::Minimize => ci.upper - db,
            OptimizationSense::Maximize => db - ci.lower,
        },
        (None, Some(epv), _) => epv - db,
        (None, None, Some(pv)) => pv - db,
        (None, None, None) => return Gap::Unavailable,
    };

    let gap = (distance / db).abs();
    if gap.is_finite() {
        Gap::Value(gap)
    } else {
        Gap::Unavailable
    }
}
