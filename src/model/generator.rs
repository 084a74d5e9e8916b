//! Continuous Markovian sample-path generators.
//!
//! A generator produces `n_samples` full trajectories of a vector-valued process in one call,
//! stored as a dense `(n_samples, T, dim)` array. Drawing every trajectory at once keeps any
//! correlation the generator builds across time inside a trajectory.

use std::fmt;

use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::core::{EvalRng, MspError, Result, Stage};

/// Dense `(n_samples, n_stages, dim)` array of simulated trajectories, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectories {
    n_samples: usize,
    n_stages: usize,
    dim: usize,
    data: Vec<f64>,
}

impl Trajectories {
    pub fn zeros(n_samples: usize, n_stages: usize, dim: usize) -> Self {
        Self {
            n_samples,
            n_stages,
            dim,
            data: vec![0.0; n_samples * n_stages * dim],
        }
    }

    /// Wraps a flat buffer; fails when its length disagrees with the shape.
    pub fn from_vec(n_samples: usize, n_stages: usize, dim: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_samples * n_stages * dim {
            return Err(MspError::dimension(format!(
                "trajectory buffer of length {} does not match shape ({n_samples}, {n_stages}, {dim})",
                data.len()
            )));
        }
        Ok(Self {
            n_samples,
            n_stages,
            dim,
            data,
        })
    }

    /// `(n_samples, n_stages, dim)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_samples, self.n_stages, self.dim)
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_stages(&self) -> usize {
        self.n_stages
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn point_start(&self, sample: usize, t: Stage) -> Option<usize> {
        (sample < self.n_samples && t < self.n_stages)
            .then(|| (sample * self.n_stages + t) * self.dim)
    }

    /// State of trajectory `sample` at stage `t`, or `None` outside the shape.
    pub fn point(&self, sample: usize, t: Stage) -> Option<&[f64]> {
        let start = self.point_start(sample, t)?;
        self.data.get(start..start + self.dim)
    }

    pub fn point_mut(&mut self, sample: usize, t: Stage) -> Option<&mut [f64]> {
        let start = self.point_start(sample, t)?;
        self.data.get_mut(start..start + self.dim)
    }

    /// Borrowed view of one trajectory, or `None` when `sample` is out of range.
    pub fn view(&self, sample: usize) -> Option<TrajectoryView<'_>> {
        if sample >= self.n_samples {
            return None;
        }
        let len = self.n_stages * self.dim;
        let data = self.data.get(sample * len..(sample + 1) * len)?;
        Some(TrajectoryView {
            data,
            dim: self.dim,
        })
    }
}

/// One trajectory of shape `(n_stages, dim)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryView<'a> {
    data: &'a [f64],
    dim: usize,
}

impl<'a> TrajectoryView<'a> {
    pub fn new(data: &'a [f64], dim: usize) -> Self {
        Self { data, dim }
    }

    pub fn n_stages(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn point(&self, t: Stage) -> Option<&'a [f64]> {
        if t >= self.n_stages() {
            return None;
        }
        self.data.get(t * self.dim..(t + 1) * self.dim)
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}

/// Opaque sampler of continuous Markovian trajectories.
pub trait MarkovianGenerator: Send + Sync {
    /// Declared dimension of each sampled point.
    fn dim(&self) -> usize;

    /// Draws `n_samples` trajectories over `n_stages` stages.
    fn generate(&self, rng: &mut EvalRng, n_samples: usize, n_stages: usize) -> Trajectories;
}

/// Adapts a closure into a [`MarkovianGenerator`].
pub struct FnGenerator<F> {
    dim: usize,
    f: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&mut EvalRng, usize, usize) -> Trajectories + Send + Sync,
{
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> fmt::Debug for FnGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator").field("dim", &self.dim).finish()
    }
}

impl<F> MarkovianGenerator for FnGenerator<F>
where
    F: Fn(&mut EvalRng, usize, usize) -> Trajectories + Send + Sync,
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn generate(&self, rng: &mut EvalRng, n_samples: usize, n_stages: usize) -> Trajectories {
        (self.f)(rng, n_samples, n_stages)
    }
}

/// Component-wise autoregressive process `X_t = mean + phi (X_{t-1} - mean) + sigma eps_t`.
///
/// `X_0` is fixed at `x0`, so stage 0 stays deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Ar1Generator {
    pub x0: Vec<f64>,
    pub mean: f64,
    pub phi: f64,
    pub sigma: f64,
}

impl Ar1Generator {
    pub fn new(x0: Vec<f64>, mean: f64, phi: f64, sigma: f64) -> Self {
        Self {
            x0,
            mean,
            phi,
            sigma,
        }
    }
}

impl MarkovianGenerator for Ar1Generator {
    fn dim(&self) -> usize {
        self.x0.len()
    }

    fn generate(&self, rng: &mut EvalRng, n_samples: usize, n_stages: usize) -> Trajectories {
        let dim = self.x0.len();
        let mut out = Trajectories::zeros(n_samples, n_stages, dim);
        let mut prev = vec![0.0_f64; dim];

        for j in 0..n_samples {
            prev.copy_from_slice(&self.x0);
            if let Some(start) = out.point_mut(j, 0) {
                start.copy_from_slice(&self.x0);
            }
            for t in 1..n_stages {
                let Some(point) = out.point_mut(j, t) else {
                    continue;
                };
                for (x, p) in point.iter_mut().zip(prev.iter_mut()) {
                    let z: f64 = StandardNormal.sample(&mut *rng);
                    *x = self.mean + self.phi * (*p - self.mean) + self.sigma * z;
                    *p = *x;
                }
            }
        }

        out
    }
}
