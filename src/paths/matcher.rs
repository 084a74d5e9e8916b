//! Nearest-Markov-state matching for simulated continuous trajectories.
//!
//! For every stage `t >= 1` the matched index is `argmin_k ||x_t - s_{t,k}||^2`. Ties go to the
//! lowest `k`: the scan only replaces the incumbent on a strictly smaller distance. Stage 0 always
//! maps to its single state. NaN distances never win, so a point with NaN coordinates maps to 0.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{MspError, Result};
use crate::model::{MarkovChain, Trajectories, TrajectoryView};

#[inline]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the state closest to `point`, first occurrence on ties.
pub fn nearest_state(point: &[f64], states: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, state) in states.iter().enumerate() {
        let d = squared_distance(point, state);
        if d < best_dist {
            best = k;
            best_dist = d;
        }
    }
    best
}

/// Matched Markov-state index for every stage of one trajectory.
pub fn match_trajectory(trajectory: TrajectoryView<'_>, chain: &MarkovChain) -> Vec<usize> {
    let mut out = vec![0; trajectory.n_stages()];
    for (t, idx) in out.iter_mut().enumerate().take(chain.n_stages()).skip(1) {
        if let Some(point) = trajectory.point(t) {
            *idx = nearest_state(point, chain.states(t));
        }
    }
    out
}

/// Matches every trajectory against the chain; the result is indexed `[sample][stage]`.
pub fn match_markov_states(
    trajectories: &Trajectories,
    chain: &MarkovChain,
) -> Result<Vec<Vec<usize>>> {
    let (_, n_stages, dim) = trajectories.shape();
    if dim != chain.dim() {
        return Err(MspError::MarkovianDimension {
            expected: chain.dim(),
            found: dim,
        });
    }
    if n_stages != chain.n_stages() {
        return Err(MspError::dimension(format!(
            "trajectories cover {n_stages} stages, Markov states cover {}",
            chain.n_stages()
        )));
    }

    let match_one = |j: usize| {
        trajectories
            .view(j)
            .map(|view| match_trajectory(view, chain))
            .ok_or_else(|| MspError::invalid(format!("trajectory {j} out of range")))
    };

    #[cfg(feature = "parallel")]
    let matched: Result<Vec<Vec<usize>>> = (0..trajectories.n_samples())
        .into_par_iter()
        .map(match_one)
        .collect();
    #[cfg(not(feature = "parallel"))]
    let matched: Result<Vec<Vec<usize>>> = (0..trajectories.n_samples()).map(match_one).collect();

    matched
}
