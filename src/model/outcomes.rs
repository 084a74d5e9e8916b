//! Finite per-stage outcome sets and their stage-wise / per-Markov-state layout.

use serde::{Deserialize, Serialize};

use crate::core::{MspError, PROBABILITY_TOLERANCE, Result, Stage};

/// Finite ordered set of `n_samples` outcomes of one stage (or one Markov state of a stage).
///
/// Without explicit probabilities the outcomes are uniformly weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcomes {
    n_samples: usize,
    probabilities: Option<Vec<f64>>,
}

impl StageOutcomes {
    /// A single certain outcome.
    pub fn deterministic() -> Self {
        Self {
            n_samples: 1,
            probabilities: None,
        }
    }

    /// `n_samples` equally likely outcomes.
    pub fn uniform(n_samples: usize) -> Self {
        Self {
            n_samples,
            probabilities: None,
        }
    }

    /// Outcomes with explicit probabilities; `validate` checks they form a distribution.
    pub fn weighted(probabilities: Vec<f64>) -> Self {
        Self {
            n_samples: probabilities.len(),
            probabilities: Some(probabilities),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn is_uniform(&self) -> bool {
        self.probabilities.is_none()
    }

    /// Probability of outcome `i`, or `None` when `i` is out of range.
    pub fn probability(&self, i: usize) -> Option<f64> {
        if i >= self.n_samples {
            return None;
        }
        Some(match &self.probabilities {
            Some(p) => p[i],
            None => 1.0 / self.n_samples as f64,
        })
    }

    /// Dense probability vector (uniform weights materialised).
    pub fn probabilities(&self) -> Vec<f64> {
        match &self.probabilities {
            Some(p) => p.clone(),
            None => vec![1.0 / self.n_samples as f64; self.n_samples],
        }
    }

    /// Checks the set is non-empty and its probabilities are a distribution.
    ///
    /// `row` identifies the Markov state the set belongs to (0 for stage-wise sets).
    pub fn validate(&self, stage: Stage, row: usize) -> Result<()> {
        if self.n_samples == 0 {
            return Err(MspError::dimension(format!(
                "stage {stage}, Markov state {row}: outcome set is empty"
            )));
        }
        if let Some(p) = &self.probabilities {
            let sum = p.iter().sum::<f64>();
            let malformed = p.iter().any(|&x| !x.is_finite() || x < 0.0);
            if malformed || (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(MspError::Stochasticity { stage, row, sum });
            }
        }
        Ok(())
    }
}

impl Default for StageOutcomes {
    fn default() -> Self {
        Self::deterministic()
    }
}

/// Outcome sets of the whole horizon, resolved once when the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutcomeStructure {
    /// One outcome set per stage, shared by every realisation of the process.
    Independent(Vec<StageOutcomes>),
    /// One outcome set per `(stage, Markov state)`, indexed `[t][k]`.
    PerMarkovState(Vec<Vec<StageOutcomes>>),
}

impl OutcomeStructure {
    pub fn n_stages(&self) -> usize {
        match self {
            Self::Independent(stages) => stages.len(),
            Self::PerMarkovState(stages) => stages.len(),
        }
    }

    /// Number of outcomes at stage `t`; every Markov state of a stage shares it.
    pub fn n_samples(&self, t: Stage) -> usize {
        match self {
            Self::Independent(stages) => stages[t].n_samples(),
            Self::PerMarkovState(stages) => stages[t][0].n_samples(),
        }
    }

    /// The outcome set governing stage `t` given the current Markov state.
    ///
    /// The Markov index is ignored for stage-wise independent outcomes and required otherwise.
    pub fn outcomes(&self, t: Stage, markov_state: Option<usize>) -> Result<&StageOutcomes> {
        match self {
            Self::Independent(stages) => stages
                .get(t)
                .ok_or_else(|| MspError::invalid(format!("stage {t} is beyond the horizon"))),
            Self::PerMarkovState(stages) => {
                let row = stages
                    .get(t)
                    .ok_or_else(|| MspError::invalid(format!("stage {t} is beyond the horizon")))?;
                let k = markov_state.ok_or_else(|| {
                    MspError::invalid(format!("stage {t}: a Markov-state index is required"))
                })?;
                row.get(k).ok_or_else(|| {
                    MspError::invalid(format!(
                        "stage {t}: Markov state {k} out of range ({} states)",
                        row.len()
                    ))
                })
            }
        }
    }
}
