//! Monte Carlo and exhaustive policy evaluation.

pub mod config;
pub mod engine;
pub mod partition;
pub mod policy;
pub mod result;
pub mod statistics;

pub use config::{EvaluationConfig, EvaluationMode, IntervalMethod, SimulationCount};
pub use engine::Evaluator;
pub use partition::{allocate_jobs, worker_rng, worker_seed};
pub use policy::{FnPolicy, PathOutcome, PolicySimulator, SimulationRequest};
pub use result::{EvaluationResult, StageTable};
pub use statistics::{
    ConfidenceInterval, compute_gap, confidence_interval, critical_value, sample_mean, sample_std,
    weighted_expectation,
};
