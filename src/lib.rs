//! Multistage is a scenario model and policy-evaluation engine for multistage stochastic
//! programs.
//!
//! The crate represents the uncertainty of a decision problem (stage-wise independent outcomes,
//! a discrete Markov chain, or a continuous Markovian process with a Markov-chain
//! discretization), enumerates or samples its sample paths, matches continuous trajectories to
//! discretized Markov states, and evaluates a fixed policy over those paths to estimate its
//! value with a confidence interval and a gap to a deterministic bound.
//!
//! Numerical considerations:
//! - Exhaustive evaluation is exact but the number of paths is the product of every stage's
//!   outcome and state counts; counts are computed with checked arithmetic.
//! - Random evaluation reports a two-sided normal or Student-t interval on the sample mean.
//! - Worker RNGs are seeded per share, so a fixed worker count reproduces its draws while a
//!   different worker count may draw differently.
//!
//! # Feature Flags
//! - `parallel` (default): runs worker shares on a Rayon thread pool and matches trajectories
//!   in parallel. Without it the same shares run one after another with identical results.
//!
//! # Quick Start
//! Enumerate the paths of a small Markov chain:
//! ```rust
//! use multistage::model::ProbabilityModelBuilder;
//! use multistage::paths::enumerate_sample_paths;
//!
//! let mut builder = ProbabilityModelBuilder::new(2).unwrap();
//! builder
//!     .set_markov_chain(
//!         vec![vec![vec![0.0]], vec![vec![1.0], vec![2.0]]],
//!         vec![vec![vec![1.0]], vec![vec![0.4, 0.6]]],
//!     )
//!     .unwrap();
//! let model = builder.build().unwrap();
//!
//! let paths = enumerate_sample_paths(&model, 1).unwrap();
//! let total: f64 = paths.iter().map(|p| model.weight_of(p).unwrap()).sum();
//! assert_eq!(paths.len(), 2);
//! assert!((total - 1.0).abs() < 1e-12);
//! ```
//!
//! Evaluate a policy on random paths:
//! ```rust
//! use multistage::core::EvalRng;
//! use multistage::eval::{EvaluationConfig, Evaluator, FnPolicy, PathOutcome, SimulationCount};
//! use multistage::eval::SimulationRequest;
//! use multistage::model::{ProbabilityModelBuilder, StageOutcomes};
//!
//! let mut builder = ProbabilityModelBuilder::new(3).unwrap();
//! builder.stage_outcomes(1, StageOutcomes::uniform(4)).unwrap();
//! builder.stage_outcomes(2, StageOutcomes::uniform(4)).unwrap();
//! let model = builder.build().unwrap();
//!
//! let mut policy = FnPolicy::new(|req: &SimulationRequest<'_>, rng: &mut EvalRng| {
//!     let mut cost = 0.0;
//!     for t in 1..req.n_stages {
//!         cost += model.sample_outcome(t, None, rng)? as f64;
//!     }
//!     Ok(PathOutcome::new(cost))
//! });
//! let config = EvaluationConfig::new(SimulationCount::Paths(200)).with_percentile(90.0);
//! let result = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();
//! let ci = result.confidence_interval.unwrap();
//! assert!(ci.lower <= result.mean() && result.mean() <= ci.upper);
//! ```

pub mod core;
pub mod eval;
pub mod model;
pub mod paths;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::eval::{
        EvaluationConfig, EvaluationMode, EvaluationResult, Evaluator, FnPolicy, IntervalMethod,
        PathOutcome, PolicySimulator, SimulationCount, SimulationRequest, StageTable,
    };
    pub use crate::model::*;
    pub use crate::paths::{
        MarkovianSample, SamplePath, count_sample_paths, draw_markovian_paths, draw_sample_path,
        enumerate_sample_paths, sample_paths,
    };
}
