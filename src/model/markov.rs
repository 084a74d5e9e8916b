//! Discretized Markov states and stage-indexed transition matrices.
//!
//! Layout conventions for a horizon of `T` stages:
//! - `states[t]` holds `n_Markov_states(t)` vectors of a common dimension; `states[0]` has one.
//! - `transitions[t]` is `n_Markov_states(t-1) x n_Markov_states(t)` and row-stochastic;
//!   `transitions[0]` must be `[[1]]`.

use serde::{Deserialize, Serialize};

use crate::core::{MspError, PROBABILITY_TOLERANCE, Result, Stage};

/// A validated finite Markov chain over the stages of a multistage program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkovChain {
    states: Vec<Vec<Vec<f64>>>,
    transitions: Vec<Vec<Vec<f64>>>,
    dim: usize,
}

impl MarkovChain {
    /// Validates shapes, dimensions and stochasticity, then builds the chain.
    pub fn new(states: Vec<Vec<Vec<f64>>>, transitions: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        if states.is_empty() {
            return Err(MspError::dimension("Markov states must cover at least one stage"));
        }
        if states.len() != transitions.len() {
            return Err(MspError::dimension(format!(
                "{} stages of Markov states but {} transition matrices",
                states.len(),
                transitions.len()
            )));
        }
        if states[0].len() != 1 {
            return Err(MspError::dimension(format!(
                "stage 0 must have exactly one Markov state, found {}",
                states[0].len()
            )));
        }

        let dim = states[0][0].len();
        for (t, stage_states) in states.iter().enumerate() {
            if stage_states.is_empty() {
                return Err(MspError::dimension(format!("stage {t} has no Markov states")));
            }
            if let Some((k, s)) = stage_states.iter().enumerate().find(|(_, s)| s.len() != dim) {
                return Err(MspError::dimension(format!(
                    "Markov state ({t}, {k}) has dimension {}, expected {dim}",
                    s.len()
                )));
            }
        }

        for (t, matrix) in transitions.iter().enumerate() {
            let rows = if t == 0 { 1 } else { states[t - 1].len() };
            let cols = states[t].len();
            if matrix.len() != rows || matrix.iter().any(|row| row.len() != cols) {
                return Err(MspError::dimension(format!(
                    "transition matrix {t} must be {rows} x {cols}"
                )));
            }
            for (i, row) in matrix.iter().enumerate() {
                let sum = row.iter().sum::<f64>();
                let malformed = row.iter().any(|&p| !p.is_finite() || p < 0.0);
                if malformed || (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return Err(MspError::Stochasticity { stage: t, row: i, sum });
                }
            }
        }

        Ok(Self {
            states,
            transitions,
            dim,
        })
    }

    pub fn n_stages(&self) -> usize {
        self.states.len()
    }

    /// Dimension of every Markov-state vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_states(&self, t: Stage) -> usize {
        self.states[t].len()
    }

    pub fn states(&self, t: Stage) -> &[Vec<f64>] {
        &self.states[t]
    }

    pub fn state(&self, t: Stage, k: usize) -> &[f64] {
        &self.states[t][k]
    }

    pub fn transition_row(&self, t: Stage, from: usize) -> &[f64] {
        &self.transitions[t][from]
    }

    /// `P(state_t = to | state_{t-1} = from)`, range-checked.
    pub fn transition(&self, t: Stage, from: usize, to: usize) -> Result<f64> {
        self.transitions
            .get(t)
            .and_then(|m| m.get(from))
            .and_then(|row| row.get(to))
            .copied()
            .ok_or_else(|| {
                MspError::invalid(format!("transition ({t}: {from} -> {to}) out of range"))
            })
    }
}
