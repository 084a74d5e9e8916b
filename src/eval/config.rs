//! Evaluation parameters.
//!
//! # Examples
//! ```rust
//! use multistage::eval::{EvaluationConfig, SimulationCount};
//!
//! let config = EvaluationConfig::new(SimulationCount::Paths(500))
//!     .with_percentile(90.0)
//!     .with_workers(4)
//!     .with_seed(7);
//! assert!(config.validate().is_ok());
//!
//! let from_json = EvaluationConfig::from_json(r#"{"simulations": "exhaustive"}"#).unwrap();
//! assert_eq!(from_json.simulations, SimulationCount::Exhaustive);
//! assert_eq!(from_json.percentile, 95.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::core::{MspError, Result};

/// How many sample paths to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationCount {
    /// Enumerate every sample path of the discrete model.
    Exhaustive,
    /// Draw this many random sample paths.
    Paths(usize),
}

impl SimulationCount {
    /// Maps the `-1` sentinel to `Exhaustive` and positive counts to `Paths`.
    pub fn from_signed(n: i64) -> Result<Self> {
        match n {
            -1 => Ok(Self::Exhaustive),
            n if n > 0 => usize::try_from(n)
                .map(Self::Paths)
                .map_err(|_| MspError::invalid(format!("simulation count {n} is too large"))),
            n => Err(MspError::invalid(format!(
                "simulation count must be positive or -1, got {n}"
            ))),
        }
    }

    pub fn is_exhaustive(self) -> bool {
        matches!(self, Self::Exhaustive)
    }
}

/// Which problem data the policy simulator should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Evaluate on the (possibly discretized) approximation model.
    #[default]
    Approximation,
    /// Evaluate on the true process: continuous trajectories, un-discretized data.
    True,
}

/// Distribution used for the confidence-interval critical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    #[default]
    Normal,
    StudentT,
}

/// Parameters of a policy evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub simulations: SimulationCount,
    /// Two-sided confidence level in percent, strictly inside `(0, 100)`.
    pub percentile: f64,
    /// Decision quantities recorded per stage and path.
    pub queries: Vec<String>,
    /// Constraint duals recorded per stage and path.
    pub dual_queries: Vec<String>,
    pub query_stage_cost: bool,
    pub n_workers: usize,
    /// Seed of the RNG that draws continuous trajectories.
    pub seed: u64,
    /// High-order component of every worker seed.
    pub worker_seed_high: u32,
    pub mode: EvaluationMode,
    pub interval: IntervalMethod,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            simulations: SimulationCount::Paths(1),
            percentile: 95.0,
            queries: Vec::new(),
            dual_queries: Vec::new(),
            query_stage_cost: false,
            n_workers: 1,
            seed: 0,
            worker_seed_high: u32::MAX,
            mode: EvaluationMode::Approximation,
            interval: IntervalMethod::Normal,
        }
    }
}

impl EvaluationConfig {
    pub fn new(simulations: SimulationCount) -> Self {
        Self {
            simulations,
            ..Self::default()
        }
    }

    pub fn exhaustive() -> Self {
        Self::new(SimulationCount::Exhaustive)
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    pub fn with_queries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queries = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dual_queries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dual_queries = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stage_cost(mut self, query_stage_cost: bool) -> Self {
        self.query_stage_cost = query_stage_cost;
        self
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_worker_seed_high(mut self, high: u32) -> Self {
        self.worker_seed_high = high;
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_interval(mut self, interval: IntervalMethod) -> Self {
        self.interval = interval;
        self
    }

    /// Parses a JSON object; omitted fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MspError::invalid(format!("malformed evaluation config: {e}")))
    }

    /// True when any per-path quantity beyond the policy value is requested.
    pub fn has_path_queries(&self) -> bool {
        !self.queries.is_empty() || !self.dual_queries.is_empty() || self.query_stage_cost
    }

    /// Checks every parameter that can be checked without the model.
    pub fn validate(&self) -> Result<()> {
        if !(self.percentile.is_finite() && self.percentile > 0.0 && self.percentile < 100.0) {
            return Err(MspError::invalid(format!(
                "percentile must lie in (0, 100), got {}",
                self.percentile
            )));
        }
        if self.n_workers == 0 {
            return Err(MspError::invalid("n_workers must be at least 1"));
        }
        if self.simulations == SimulationCount::Paths(0) {
            return Err(MspError::invalid("number of simulations must be positive"));
        }
        if self.n_workers > 1 && self.has_path_queries() {
            return Err(MspError::UnsupportedCombination(format!(
                "per-path queries, duals and stage costs need n_workers = 1, got {}",
                self.n_workers
            )));
        }
        Ok(())
    }
}
