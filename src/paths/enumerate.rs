//! Exhaustive sample-path enumeration and exact path weights.
//!
//! Paths are produced in lexicographic order. For models with Markov states every outcome-index
//! tuple is paired with every Markov-state tuple, outcome indices outermost and Markov indices
//! innermost; within each tuple the last stage varies fastest.

use serde::{Deserialize, Serialize};

use crate::core::{MspError, ProcessType, Result, Stage};
use crate::model::ProbabilityModel;

/// One realisation of the discrete process over stages `0..=t_max`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplePath {
    /// Outcome index per stage.
    pub outcomes: Vec<usize>,
    /// Markov-state index per stage, present exactly when the model has Markov states.
    pub markov_states: Option<Vec<usize>>,
}

impl SamplePath {
    pub fn independent(outcomes: Vec<usize>) -> Self {
        Self {
            outcomes,
            markov_states: None,
        }
    }

    pub fn markov(outcomes: Vec<usize>, markov_states: Vec<usize>) -> Self {
        Self {
            outcomes,
            markov_states: Some(markov_states),
        }
    }

    /// Number of stages covered.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn markov_state(&self, t: Stage) -> Option<usize> {
        self.markov_states.as_ref().map(|m| m[t])
    }
}

fn check_enumerable(model: &ProbabilityModel, t_max: Stage) -> Result<()> {
    if model.process_type() == ProcessType::MarkovianContinuous && !model.is_discretized() {
        return Err(MspError::NotDiscretized);
    }
    if t_max >= model.n_stages() {
        return Err(MspError::invalid(format!(
            "t_max {t_max} is beyond the horizon of {} stages",
            model.n_stages()
        )));
    }
    Ok(())
}

fn checked_product(radix: &[usize]) -> Result<usize> {
    radix.iter().try_fold(1_usize, |acc, &n| {
        acc.checked_mul(n)
            .ok_or_else(|| MspError::invalid("number of sample paths overflows usize"))
    })
}

/// Number of distinct paths over stages `0..=t_max`.
pub fn count_sample_paths(model: &ProbabilityModel, t_max: Stage) -> Result<usize> {
    Ok(sample_paths(model, t_max)?.len())
}

/// Lazily enumerates every path over stages `0..=t_max`.
pub fn sample_paths(model: &ProbabilityModel, t_max: Stage) -> Result<SamplePathIter> {
    check_enumerable(model, t_max)?;
    let outcome_radix: Vec<usize> = (0..=t_max).map(|t| model.n_samples(t)).collect();
    let markov_radix: Option<Vec<usize>> = model
        .has_markov_states()
        .then(|| (0..=t_max).map(|t| model.n_markov_states(t)).collect());

    let mut total = checked_product(&outcome_radix)?;
    if let Some(radix) = &markov_radix {
        total = total
            .checked_mul(checked_product(radix)?)
            .ok_or_else(|| MspError::invalid("number of sample paths overflows usize"))?;
    }

    Ok(SamplePathIter {
        outcome_digits: vec![0; outcome_radix.len()],
        markov_digits: markov_radix.as_ref().map(|r| vec![0; r.len()]),
        outcome_radix,
        markov_radix,
        remaining: total,
    })
}

/// Materialises every path over stages `0..=t_max`.
pub fn enumerate_sample_paths(model: &ProbabilityModel, t_max: Stage) -> Result<Vec<SamplePath>> {
    Ok(sample_paths(model, t_max)?.collect())
}

/// Mixed-radix odometer over outcome and Markov-state indices.
#[derive(Debug, Clone)]
pub struct SamplePathIter {
    outcome_radix: Vec<usize>,
    markov_radix: Option<Vec<usize>>,
    outcome_digits: Vec<usize>,
    markov_digits: Option<Vec<usize>>,
    remaining: usize,
}

/// Advances `digits` by one; returns true on wrap-around.
fn increment(digits: &mut [usize], radix: &[usize]) -> bool {
    for (d, &r) in digits.iter_mut().zip(radix).rev() {
        *d += 1;
        if *d < r {
            return false;
        }
        *d = 0;
    }
    true
}

impl Iterator for SamplePathIter {
    type Item = SamplePath;

    fn next(&mut self) -> Option<SamplePath> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let path = SamplePath {
            outcomes: self.outcome_digits.clone(),
            markov_states: self.markov_digits.clone(),
        };

        let carried = match (&mut self.markov_digits, &self.markov_radix) {
            (Some(digits), Some(radix)) => increment(digits, radix),
            _ => true,
        };
        if carried {
            increment(&mut self.outcome_digits, &self.outcome_radix);
        }

        Some(path)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SamplePathIter {}

fn check_path_shape(model: &ProbabilityModel, path: &SamplePath) -> Result<()> {
    if path.is_empty() || path.len() > model.n_stages() {
        return Err(MspError::invalid(format!(
            "sample path covers {} stages, expected 1..={}",
            path.len(),
            model.n_stages()
        )));
    }
    match (&path.markov_states, model.has_markov_states()) {
        (Some(m), true) if m.len() == path.len() => Ok(()),
        (Some(m), true) => Err(MspError::invalid(format!(
            "sample path has {} outcome indices but {} Markov indices",
            path.len(),
            m.len()
        ))),
        (None, false) => Ok(()),
        (None, true) => Err(MspError::invalid(
            "sample path lacks Markov-state indices required by the model",
        )),
        (Some(_), false) => Err(MspError::invalid(
            "sample path carries Markov-state indices but the model has none",
        )),
    }
}

impl ProbabilityModel {
    /// Exact probability of a path (or path prefix).
    ///
    /// Stage-wise independent: product of outcome probabilities. With Markov states: product of
    /// transition probabilities along the state sequence times the state-conditional outcome
    /// probabilities.
    pub fn weight_of(&self, path: &SamplePath) -> Result<f64> {
        check_path_shape(self, path)?;
        let mut weight = 1.0;
        for t in 0..path.len() {
            let m = path.markov_state(t);
            if let (Some(to), true) = (m, t > 0) {
                let from = path.markov_state(t - 1).unwrap_or(0);
                weight *= self.transition_probability(t, from, to)?;
            }
            weight *= self.probability_of(t, path.outcomes[t], m)?;
        }
        Ok(weight)
    }

    /// Probability of the path's last stage given its prefix.
    pub fn conditional_weight_of(&self, path: &SamplePath) -> Result<f64> {
        check_path_shape(self, path)?;
        let t = path.len() - 1;
        let m = path.markov_state(t);
        let transition = match m {
            Some(to) if t > 0 => {
                let from = path.markov_state(t - 1).unwrap_or(0);
                self.transition_probability(t, from, to)?
            }
            _ => 1.0,
        };
        Ok(transition * self.probability_of(t, path.outcomes[t], m)?)
    }
}
