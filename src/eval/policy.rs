//! Interface to the external policy/solver collaborator.
//!
//! The evaluator calls [`PolicySimulator::simulate`] once per sample path. Paths that are fully
//! specified (exhaustive enumeration, matched continuous trajectories) arrive with their indices;
//! in random mode for discrete processes the request carries no indices and the simulator draws
//! each stage itself from the supplied worker RNG, e.g. via
//! [`ProbabilityModel::sample_outcome`](crate::model::ProbabilityModel::sample_outcome).

use std::collections::HashMap;

use crate::core::{EvalRng, SolverError};
use crate::model::TrajectoryView;

/// Everything the simulator needs to evaluate the policy along one sample path.
#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    /// Dense index of the path within this evaluation.
    pub path_index: usize,
    pub n_stages: usize,
    /// Stage-wise outcome indices, when the path is predetermined.
    pub outcomes: Option<&'a [usize]>,
    /// Stage-wise Markov-state indices, when the path is predetermined.
    pub markov_states: Option<&'a [usize]>,
    /// Continuous trajectory of the true process.
    pub trajectory: Option<TrajectoryView<'a>>,
    /// Use un-discretized problem data.
    pub solve_true: bool,
    pub queries: &'a [String],
    pub dual_queries: &'a [String],
    pub query_stage_cost: bool,
}

/// What the simulator reports for one sample path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathOutcome {
    /// Total (discounted) policy value along the path.
    pub policy_value: f64,
    /// Cost of every stage; only read when stage costs were requested.
    pub stage_costs: Vec<f64>,
    /// Per-stage values of queried decisions.
    pub solution: HashMap<String, Vec<f64>>,
    /// Per-stage values of queried duals.
    pub solution_dual: HashMap<String, Vec<f64>>,
}

impl PathOutcome {
    pub fn new(policy_value: f64) -> Self {
        Self {
            policy_value,
            ..Self::default()
        }
    }

    pub fn with_stage_costs(mut self, stage_costs: Vec<f64>) -> Self {
        self.stage_costs = stage_costs;
        self
    }

    pub fn with_solution(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.solution.insert(name.into(), values);
        self
    }

    pub fn with_dual(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.solution_dual.insert(name.into(), values);
        self
    }
}

/// The policy/solver collaborator.
///
/// Parallel evaluation gives every worker its own clone, so implementations may keep mutable
/// scratch state. Given the same request and RNG state the result must be the same.
pub trait PolicySimulator: Clone + Send {
    fn simulate(
        &mut self,
        request: &SimulationRequest<'_>,
        rng: &mut EvalRng,
    ) -> Result<PathOutcome, SolverError>;
}

/// Adapts a closure into a [`PolicySimulator`].
#[derive(Debug, Clone)]
pub struct FnPolicy<F>(pub F);

impl<F> FnPolicy<F>
where
    F: FnMut(&SimulationRequest<'_>, &mut EvalRng) -> Result<PathOutcome, SolverError>
        + Clone
        + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PolicySimulator for FnPolicy<F>
where
    F: FnMut(&SimulationRequest<'_>, &mut EvalRng) -> Result<PathOutcome, SolverError>
        + Clone
        + Send,
{
    fn simulate(
        &mut self,
        request: &SimulationRequest<'_>,
        rng: &mut EvalRng,
    ) -> Result<PathOutcome, SolverError> {
        (self.0)(request, rng)
    }
}
