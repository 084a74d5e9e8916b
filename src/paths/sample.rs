//! Random sample-path draws.
//!
//! Discrete processes are sampled forward one stage at a time (the policy simulator does this
//! with its worker RNG during the forward pass). Continuous processes draw every trajectory in a
//! single generator call and are then matched to the discretized Markov states.

use serde::{Deserialize, Serialize};

use super::enumerate::SamplePath;
use super::matcher::match_markov_states;
use crate::core::{EvalRng, MspError, Result, Stage};
use crate::model::{ProbabilityModel, Trajectories};

/// Draws one path over stages `0..=t_max` by forward sampling.
///
/// The Markov state (when present) is drawn first from the transition row of the previous
/// state; the outcome is then drawn from the state-conditional outcome set.
pub fn draw_sample_path(
    model: &ProbabilityModel,
    t_max: Stage,
    rng: &mut EvalRng,
) -> Result<SamplePath> {
    if t_max >= model.n_stages() {
        return Err(MspError::invalid(format!(
            "t_max {t_max} is beyond the horizon of {} stages",
            model.n_stages()
        )));
    }

    let mut outcomes = Vec::with_capacity(t_max + 1);
    if !model.has_markov_states() {
        for t in 0..=t_max {
            outcomes.push(model.sample_outcome(t, None, rng)?);
        }
        return Ok(SamplePath::independent(outcomes));
    }

    let mut states = Vec::with_capacity(t_max + 1);
    let mut current = 0;
    for t in 0..=t_max {
        if t > 0 {
            current = model.sample_transition(t, current, rng)?;
        }
        states.push(current);
        outcomes.push(model.sample_outcome(t, Some(current), rng)?);
    }
    Ok(SamplePath::markov(outcomes, states))
}

/// Draws `n_samples` continuous trajectories in one generator call and checks their shape.
pub fn draw_trajectories(
    model: &ProbabilityModel,
    n_samples: usize,
    rng: &mut EvalRng,
) -> Result<Trajectories> {
    let generator = model.generator().ok_or_else(|| {
        MspError::Configuration("the process has no Markovian generator".to_string())
    })?;
    let trajectories = generator.generate(rng, n_samples, model.n_stages());
    let (n, t, dim) = trajectories.shape();
    if dim != generator.dim() {
        return Err(MspError::MarkovianDimension {
            expected: generator.dim(),
            found: dim,
        });
    }
    if n != n_samples || t != model.n_stages() {
        return Err(MspError::dimension(format!(
            "generator returned ({n}, {t}, {dim}) trajectories, expected ({n_samples}, {}, {dim})",
            model.n_stages()
        )));
    }
    Ok(trajectories)
}

/// Simulated continuous trajectories with their matched Markov-state indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkovianSample {
    pub trajectories: Trajectories,
    /// Matched Markov-state index, `[sample][stage]`.
    pub markov_indices: Vec<Vec<usize>>,
}

impl MarkovianSample {
    pub fn len(&self) -> usize {
        self.markov_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markov_indices.is_empty()
    }
}

/// Draws continuous trajectories and matches them to the discretized Markov states.
pub fn draw_markovian_paths(
    model: &ProbabilityModel,
    n_samples: usize,
    rng: &mut EvalRng,
) -> Result<MarkovianSample> {
    let chain = model.markov_chain().ok_or(MspError::NotDiscretized)?;
    let trajectories = draw_trajectories(model, n_samples, rng)?;
    let markov_indices = match_markov_states(&trajectories, chain)?;
    Ok(MarkovianSample {
        trajectories,
        markov_indices,
    })
}
