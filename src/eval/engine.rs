//! Policy evaluation driver.
//!
//! [`Evaluator::evaluate`] fixes the set of sample paths, runs the policy simulator once per
//! path, sequentially or across worker shares, and aggregates values, the confidence interval
//! and the gap to a deterministic bound. Paths are enumerated exhaustively or drawn at random
//! by the simulator. A continuous process in true mode instead draws trajectories up front and
//! matches them to the discretized Markov states; in approximation mode the simulator samples
//! the discretized chain like any other Markov chain.
//!
//! Every parameter is checked before the first simulator call. A solver failure in any share
//! aborts the whole evaluation.

use std::collections::BTreeMap;
use std::ops::Range;

use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::config::{EvaluationConfig, EvaluationMode, SimulationCount};
use super::partition::{allocate_jobs, worker_rng};
use super::policy::{PathOutcome, PolicySimulator, SimulationRequest};
use super::result::{EvaluationResult, StageTable};
use super::statistics::{compute_gap, confidence_interval, weighted_expectation};
use crate::core::{DeterministicBound, EvalRng, MspError, ProcessType, Result};
use crate::model::ProbabilityModel;
use crate::paths::{MarkovianSample, SamplePath, draw_markovian_paths, enumerate_sample_paths};

/// Sample paths an evaluation runs over.
enum PathPlan {
    Exhaustive(Vec<SamplePath>),
    /// Stage indices are drawn by the simulator with its worker RNG.
    Random(usize),
    Markovian(MarkovianSample),
}

impl PathPlan {
    fn n_paths(&self) -> usize {
        match self {
            Self::Exhaustive(paths) => paths.len(),
            Self::Random(n) => *n,
            Self::Markovian(sample) => sample.len(),
        }
    }

    fn request<'a>(
        &'a self,
        path_index: usize,
        n_stages: usize,
        solve_true: bool,
        config: &'a EvaluationConfig,
    ) -> SimulationRequest<'a> {
        let (outcomes, markov_states, trajectory) = match self {
            Self::Exhaustive(paths) => match paths.get(path_index) {
                Some(path) => (Some(path.outcomes.as_slice()), path.markov_states.as_deref(), None),
                None => (None, None, None),
            },
            Self::Random(_) => (None, None, None),
            Self::Markovian(sample) => (
                None,
                sample.markov_indices.get(path_index).map(Vec::as_slice),
                sample.trajectories.view(path_index),
            ),
        };
        SimulationRequest {
            path_index,
            n_stages,
            outcomes,
            markov_states,
            trajectory,
            solve_true,
            queries: &config.queries,
            dual_queries: &config.dual_queries,
            query_stage_cost: config.query_stage_cost,
        }
    }
}

/// Collects per-path tables; only used by single-worker runs.
struct Recorder {
    stage_costs: Option<StageTable>,
    solutions: BTreeMap<String, StageTable>,
    dual_solutions: BTreeMap<String, StageTable>,
}

impl Recorder {
    fn new(config: &EvaluationConfig, n_stages: usize, n_paths: usize) -> Self {
        let tables = |names: &[String]| -> BTreeMap<String, StageTable> {
            names
                .iter()
                .map(|name| (name.clone(), StageTable::new(n_stages, n_paths)))
                .collect()
        };
        Self {
            stage_costs: config
                .query_stage_cost
                .then(|| StageTable::new(n_stages, n_paths)),
            solutions: tables(&config.queries),
            dual_solutions: tables(&config.dual_queries),
        }
    }

    fn record(&mut self, path: usize, outcome: &PathOutcome) -> Result<()> {
        if let Some(table) = self.stage_costs.as_mut() {
            table.record_column(path, &outcome.stage_costs)?;
        }
        for (name, table) in self.solutions.iter_mut() {
            // Names the solver does not report stay "not available".
            if let Some(values) = outcome.solution.get(name) {
                table.record_column(path, values)?;
            }
        }
        for (name, table) in self.dual_solutions.iter_mut() {
            if let Some(values) = outcome.solution_dual.get(name) {
                table.record_column(path, values)?;
            }
        }
        Ok(())
    }
}

/// Evaluates fixed policies against a frozen probability model.
///
/// # Examples
/// ```rust
/// use multistage::core::EvalRng;
/// use multistage::eval::{EvaluationConfig, Evaluator, FnPolicy, PathOutcome, SimulationRequest};
/// use multistage::model::{ProbabilityModelBuilder, StageOutcomes};
///
/// let mut builder = ProbabilityModelBuilder::new(2).unwrap();
/// builder.stage_outcomes(1, StageOutcomes::weighted(vec![0.25, 0.75])).unwrap();
/// let model = builder.build().unwrap();
///
/// let mut policy = FnPolicy::new(|req: &SimulationRequest<'_>, _: &mut EvalRng| {
///     let last = req.outcomes.map_or(0, |o| o[1]);
///     Ok(PathOutcome::new(10.0 * last as f64))
/// });
/// let result = Evaluator::new(&model)
///     .evaluate(&mut policy, &EvaluationConfig::exhaustive())
///     .unwrap();
/// assert_eq!(result.exact_expected_value, Some(7.5));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'m> {
    model: &'m ProbabilityModel,
    bound: Option<DeterministicBound>,
}

impl<'m> Evaluator<'m> {
    pub fn new(model: &'m ProbabilityModel) -> Self {
        Self { model, bound: None }
    }

    /// Deterministic bound the gap is measured against.
    pub fn with_bound(mut self, bound: DeterministicBound) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn model(&self) -> &'m ProbabilityModel {
        self.model
    }

    pub fn bound(&self) -> Option<DeterministicBound> {
        self.bound
    }

    /// Runs `simulator` once per sample path and aggregates the results.
    pub fn evaluate<S: PolicySimulator>(
        &self,
        simulator: &mut S,
        config: &EvaluationConfig,
    ) -> Result<EvaluationResult> {
        config.validate()?;
        let plan = self.plan(config)?;
        let n_paths = plan.n_paths();
        let n_stages = self.model.n_stages();
        let jobs = allocate_jobs(n_paths, config.n_workers.min(n_paths));
        let exhaustive = config.simulations.is_exhaustive();

        info!(
            n_sample_paths = n_paths,
            n_workers = jobs.len(),
            exhaustive,
            mode = ?config.mode,
            "policy evaluation started"
        );

        let mut policy_values = vec![0.0; n_paths];
        let mut recorder = config
            .has_path_queries()
            .then(|| Recorder::new(config, n_stages, n_paths));

        if jobs.len() <= 1 {
            let mut rng = worker_rng(config.worker_seed_high, 0);
            self.run_share(
                &plan,
                config,
                0..n_paths,
                simulator,
                &mut rng,
                &mut policy_values,
                recorder.as_mut(),
            )?;
        } else {
            self.run_shares(&plan, config, &jobs, simulator, &mut policy_values)?;
        }

        let (exact_expected_value, interval) = if exhaustive {
            let paths = match &plan {
                PathPlan::Exhaustive(paths) => paths.as_slice(),
                _ => &[],
            };
            let weights = paths
                .iter()
                .map(|p| self.model.weight_of(p))
                .collect::<Result<Vec<_>>>()?;
            (Some(weighted_expectation(&policy_values, &weights)?), None)
        } else {
            (
                None,
                confidence_interval(&policy_values, config.percentile, config.interval)?,
            )
        };

        let gap = compute_gap(
            self.bound,
            interval.as_ref(),
            exact_expected_value,
            policy_values.first().copied(),
        );
        if self.bound.is_some() && !gap.is_available() {
            warn!(bound = ?self.bound, "gap unavailable for this deterministic bound");
        }

        let (stage_costs, solutions, dual_solutions) = match recorder {
            Some(r) => (r.stage_costs, r.solutions, r.dual_solutions),
            None => (None, BTreeMap::new(), BTreeMap::new()),
        };
        let (sample_paths, markovian) = match plan {
            PathPlan::Exhaustive(paths) => (Some(paths), None),
            PathPlan::Random(_) => (None, None),
            PathPlan::Markovian(sample) => (None, Some(sample)),
        };

        let result = EvaluationResult {
            policy_values,
            confidence_interval: interval,
            exact_expected_value,
            gap,
            stage_costs,
            solutions,
            dual_solutions,
            sample_paths,
            markovian,
            n_workers: jobs.len(),
        };
        info!(
            n_sample_paths = n_paths,
            expected_value = result.expected_value(),
            gap = %result.gap,
            "policy evaluation finished"
        );
        Ok(result)
    }

    fn plan(&self, config: &EvaluationConfig) -> Result<PathPlan> {
        let continuous = self.model.process_type() == ProcessType::MarkovianContinuous;
        match config.simulations {
            SimulationCount::Exhaustive => {
                if continuous && config.mode == EvaluationMode::True {
                    return Err(MspError::invalid(
                        "the true continuous process cannot be enumerated exhaustively",
                    ));
                }
                let paths = enumerate_sample_paths(self.model, self.model.n_stages() - 1)?;
                Ok(PathPlan::Exhaustive(paths))
            }
            SimulationCount::Paths(n) if continuous && config.mode == EvaluationMode::True => {
                let mut rng = EvalRng::seed_from_u64(config.seed);
                Ok(PathPlan::Markovian(draw_markovian_paths(self.model, n, &mut rng)?))
            }
            SimulationCount::Paths(_) if continuous && !self.model.is_discretized() => {
                Err(MspError::NotDiscretized)
            }
            SimulationCount::Paths(n) => Ok(PathPlan::Random(n)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_share<S: PolicySimulator>(
        &self,
        plan: &PathPlan,
        config: &EvaluationConfig,
        share: Range<usize>,
        simulator: &mut S,
        rng: &mut EvalRng,
        values: &mut [f64],
        mut recorder: Option<&mut Recorder>,
    ) -> Result<()> {
        let solve_true = config.mode == EvaluationMode::True;
        let n_stages = self.model.n_stages();
        for (slot, j) in values.iter_mut().zip(share) {
            let request = plan.request(j, n_stages, solve_true, config);
            let outcome = simulator
                .simulate(&request, rng)
                .map_err(|source| MspError::Solver { path: j, source })?;
            debug!(path = j, value = outcome.policy_value, "sample path simulated");
            *slot = outcome.policy_value;
            if let Some(r) = recorder.as_deref_mut() {
                r.record(j, &outcome)?;
            }
        }
        Ok(())
    }

    /// Runs each share on its own simulator clone, RNG and slice of `values`.
    fn run_shares<S: PolicySimulator>(
        &self,
        plan: &PathPlan,
        config: &EvaluationConfig,
        jobs: &[Range<usize>],
        simulator: &S,
        values: &mut [f64],
    ) -> Result<()> {
        let mut shares = Vec::with_capacity(jobs.len());
        let mut rest = values;
        for job in jobs {
            let (head, tail) = rest.split_at_mut(job.len());
            shares.push((job.clone(), head, simulator.clone()));
            rest = tail;
        }

        let run = |(job, slice, mut worker): (Range<usize>, &mut [f64], S)| -> Result<()> {
            debug!(first = job.start, len = job.len(), "worker share started");
            let mut rng = worker_rng(config.worker_seed_high, job.start);
            self.run_share(plan, config, job, &mut worker, &mut rng, slice, None)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<()>> = {
            use rayon::prelude::*;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs.len())
                .build()
                .map_err(|e| MspError::Configuration(format!("worker pool: {e}")))?;
            pool.install(|| shares.into_par_iter().map(run).collect())
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<()>> = shares.into_iter().map(run).collect();

        outcomes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Gap, OptimizationSense, SolverError};
    use crate::model::{ProbabilityModelBuilder, StageOutcomes};
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn two_stage_model() -> ProbabilityModel {
        let mut b = ProbabilityModelBuilder::new(2).unwrap();
        b.stage_outcomes(1, StageOutcomes::weighted(vec![0.5, 0.5]))
            .unwrap();
        b.build().unwrap()
    }

    /// Reports the path index as its value and counts calls.
    #[derive(Clone, Default)]
    struct IndexPolicy {
        calls: Arc<AtomicUsize>,
    }

    impl PolicySimulator for IndexPolicy {
        fn simulate(
            &mut self,
            request: &SimulationRequest<'_>,
            _rng: &mut EvalRng,
        ) -> std::result::Result<PathOutcome, SolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PathOutcome::new(request.path_index as f64))
        }
    }

    #[test]
    fn single_path_has_no_interval() {
        let model = two_stage_model();
        let mut policy = IndexPolicy::default();
        let result = Evaluator::new(&model)
            .evaluate(&mut policy, &EvaluationConfig::default())
            .unwrap();
        assert_eq!(result.policy_value(), Some(0.0));
        assert!(result.confidence_interval.is_none());
        assert_eq!(result.gap, Gap::Unavailable);
    }

    #[test]
    fn exhaustive_run_reports_exact_value_and_gap() {
        let model = two_stage_model();
        let mut policy = IndexPolicy::default();
        let result = Evaluator::new(&model)
            .with_bound(DeterministicBound::new(0.4, OptimizationSense::Minimize))
            .evaluate(&mut policy, &EvaluationConfig::exhaustive())
            .unwrap();
        assert_relative_eq!(result.exact_expected_value.unwrap(), 0.5);
        assert!(result.confidence_interval.is_none());
        assert_relative_eq!(result.gap.as_f64(), 0.25, epsilon = 1e-12);
        assert_eq!(result.sample_paths.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn invalid_config_fails_before_simulating() {
        let model = two_stage_model();
        let mut policy = IndexPolicy::default();
        let cfg = EvaluationConfig::new(SimulationCount::Paths(4)).with_percentile(100.0);
        assert!(Evaluator::new(&model).evaluate(&mut policy, &cfg).is_err());
        let cfg = EvaluationConfig::new(SimulationCount::Paths(4))
            .with_workers(2)
            .with_queries(["x"]);
        assert!(matches!(
            Evaluator::new(&model).evaluate(&mut policy, &cfg),
            Err(MspError::UnsupportedCombination(_))
        ));
        assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn surplus_workers_are_clamped() {
        let model = two_stage_model();
        let mut policy = IndexPolicy::default();
        let cfg = EvaluationConfig::new(SimulationCount::Paths(3)).with_workers(8);
        let result = Evaluator::new(&model).evaluate(&mut policy, &cfg).unwrap();
        assert_eq!(result.n_workers, 3);
        assert_eq!(result.policy_values, vec![0.0, 1.0, 2.0]);
        assert_eq!(policy.calls.load(Ordering::SeqCst), 3);
    }
}
