//! Aggregated evaluation output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::statistics::{ConfidenceInterval, sample_mean};
use crate::core::{Gap, MspError, Result, Stage};
use crate::paths::{MarkovianSample, SamplePath};

/// Stage-by-path table of a queried quantity.
///
/// Cells never written by the simulator are `None` ("not available"), distinct from a computed
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTable {
    n_stages: usize,
    n_paths: usize,
    cells: Vec<Option<f64>>,
}

impl StageTable {
    pub fn new(n_stages: usize, n_paths: usize) -> Self {
        Self {
            n_stages,
            n_paths,
            cells: vec![None; n_stages * n_paths],
        }
    }

    /// `(n_stages, n_paths)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_stages, self.n_paths)
    }

    pub fn get(&self, t: Stage, path: usize) -> Option<f64> {
        if t >= self.n_stages || path >= self.n_paths {
            return None;
        }
        self.cells[t * self.n_paths + path]
    }

    /// Every path's cell at stage `t`, or `None` beyond the last stage.
    pub fn row(&self, t: Stage) -> Option<&[Option<f64>]> {
        if t >= self.n_stages {
            return None;
        }
        self.cells.get(t * self.n_paths..(t + 1) * self.n_paths)
    }

    pub fn column(&self, path: usize) -> Vec<Option<f64>> {
        (0..self.n_stages).map(|t| self.get(t, path)).collect()
    }

    /// Writes one full column; the value vector must cover every stage.
    pub fn record_column(&mut self, path: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.n_stages {
            return Err(MspError::dimension(format!(
                "path {path}: {} per-stage values reported, expected {}",
                values.len(),
                self.n_stages
            )));
        }
        if path >= self.n_paths {
            return Err(MspError::invalid(format!("path {path} out of range")));
        }
        for (t, &v) in values.iter().enumerate() {
            self.cells[t * self.n_paths + path] = Some(v);
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }
}

/// Result of evaluating a policy over a set of sample paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Policy value per sample path, densely indexed.
    pub policy_values: Vec<f64>,
    /// Present for random evaluations with more than one path.
    pub confidence_interval: Option<ConfidenceInterval>,
    /// Present for exhaustive evaluations.
    pub exact_expected_value: Option<f64>,
    pub gap: Gap,
    pub stage_costs: Option<StageTable>,
    pub solutions: BTreeMap<String, StageTable>,
    pub dual_solutions: BTreeMap<String, StageTable>,
    /// Enumerated paths of an exhaustive evaluation, in evaluation order.
    pub sample_paths: Option<Vec<SamplePath>>,
    /// Continuous trajectories and matched states of a true-process evaluation.
    pub markovian: Option<MarkovianSample>,
    /// Number of worker shares actually run.
    pub n_workers: usize,
}

impl EvaluationResult {
    pub fn n_sample_paths(&self) -> usize {
        self.policy_values.len()
    }

    /// Plain average of the per-path values.
    pub fn mean(&self) -> f64 {
        sample_mean(&self.policy_values)
    }

    /// The scalar policy value when exactly one path was evaluated.
    pub fn policy_value(&self) -> Option<f64> {
        match self.policy_values.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Exact expected value if known, otherwise the sample mean.
    pub fn expected_value(&self) -> f64 {
        self.exact_expected_value.unwrap_or_else(|| self.mean())
    }
}
