use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use approx::assert_relative_eq;
use multistage::core::{
    DeterministicBound, EvalRng, Gap, MspError, OptimizationSense, SolverError,
};
use multistage::eval::{
    EvaluationConfig, EvaluationMode, Evaluator, IntervalMethod, PathOutcome, PolicySimulator,
    SimulationCount, SimulationRequest,
};
use multistage::model::{Ar1Generator, ProbabilityModel, ProbabilityModelBuilder, StageOutcomes};
use multistage::paths::{draw_sample_path, enumerate_sample_paths};

/// Inventory-style policy: each stage costs the realized outcome plus the Markov state.
#[derive(Clone)]
struct StagePolicy<'m> {
    model: &'m ProbabilityModel,
    fail_at: Option<usize>,
}

impl<'m> StagePolicy<'m> {
    fn new(model: &'m ProbabilityModel) -> Self {
        Self {
            model,
            fail_at: None,
        }
    }
}

#[derive(Debug)]
struct Infeasible(usize);

impl fmt::Display for Infeasible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subproblem infeasible on path {}", self.0)
    }
}

impl std::error::Error for Infeasible {}

fn stage_cost(outcome: usize, state: usize) -> f64 {
    1.0 + outcome as f64 + 10.0 * state as f64
}

impl PolicySimulator for StagePolicy<'_> {
    fn simulate(
        &mut self,
        request: &SimulationRequest<'_>,
        rng: &mut EvalRng,
    ) -> Result<PathOutcome, SolverError> {
        if self.fail_at == Some(request.path_index) {
            return Err(Box::new(Infeasible(request.path_index)));
        }
        let (outcomes, states) = match (request.outcomes, request.markov_states) {
            (Some(o), s) => (o.to_vec(), s.map(<[usize]>::to_vec)),
            (None, _) => {
                let path = draw_sample_path(self.model, request.n_stages - 1, rng)?;
                (path.outcomes, path.markov_states)
            }
        };
        let costs: Vec<f64> = (0..request.n_stages)
            .map(|t| stage_cost(outcomes[t], states.as_ref().map_or(0, |s| s[t])))
            .collect();
        let level: Vec<f64> = outcomes.iter().map(|&o| o as f64).collect();
        let mut solution = HashMap::new();
        for name in request.queries {
            if name == "level" {
                solution.insert(name.clone(), level.clone());
            }
        }
        Ok(PathOutcome {
            policy_value: costs.iter().sum(),
            stage_costs: costs,
            solution,
            solution_dual: HashMap::new(),
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn markov_model() -> ProbabilityModel {
    init_tracing();
    let mut b = ProbabilityModelBuilder::new(3).unwrap();
    b.set_markov_chain(
        vec![
            vec![vec![0.0]],
            vec![vec![1.0], vec![2.0]],
            vec![vec![1.0], vec![2.0]],
        ],
        vec![
            vec![vec![1.0]],
            vec![vec![0.3, 0.7]],
            vec![vec![0.6, 0.4], vec![0.2, 0.8]],
        ],
    )
    .unwrap()
    .stage_outcomes(1, StageOutcomes::uniform(2))
    .unwrap()
    .stage_outcomes(2, StageOutcomes::weighted(vec![0.1, 0.9]))
    .unwrap();
    b.build().unwrap()
}

#[test]
fn exhaustive_value_matches_brute_force() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let result = Evaluator::new(&model)
        .evaluate(&mut policy, &EvaluationConfig::exhaustive())
        .unwrap();

    let mut expected = 0.0;
    let p1 = [0.3, 0.7];
    let p2 = [[0.6, 0.4], [0.2, 0.8]];
    let q2 = [0.1, 0.9];
    for s1 in 0..2 {
        for s2 in 0..2 {
            for o1 in 0..2 {
                for o2 in 0..2 {
                    let weight = p1[s1] * p2[s1][s2] * 0.5 * q2[o2];
                    let value = stage_cost(0, 0) + stage_cost(o1, s1) + stage_cost(o2, s2);
                    expected += weight * value;
                }
            }
        }
    }

    assert_eq!(result.n_sample_paths(), 16);
    assert!(result.confidence_interval.is_none());
    assert_relative_eq!(result.exact_expected_value.unwrap(), expected, epsilon = 1e-10);
    assert_eq!(
        result.sample_paths.as_deref(),
        Some(enumerate_sample_paths(&model, 2).unwrap().as_slice())
    );
}

#[test]
fn one_simulation_never_reports_an_interval() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let result = Evaluator::new(&model)
        .with_bound(DeterministicBound::new(20.0, OptimizationSense::Minimize))
        .evaluate(&mut policy, &EvaluationConfig::new(SimulationCount::Paths(1)))
        .unwrap();
    assert!(result.confidence_interval.is_none());
    let pv = result.policy_value().unwrap();
    assert_relative_eq!(result.gap.as_f64(), ((pv - 20.0) / 20.0).abs(), epsilon = 1e-12);
}

#[test]
fn random_evaluation_reports_interval_and_gap() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let config = EvaluationConfig::new(SimulationCount::Paths(400))
        .with_percentile(95.0)
        .with_interval(IntervalMethod::StudentT);
    let result = Evaluator::new(&model)
        .with_bound(DeterministicBound::new(15.0, OptimizationSense::Minimize))
        .evaluate(&mut policy, &config)
        .unwrap();
    let ci = result.confidence_interval.unwrap();
    assert!(ci.lower < ci.mean && ci.mean < ci.upper);
    assert_relative_eq!(ci.mean, result.mean(), epsilon = 1e-12);
    assert_relative_eq!(result.gap.as_f64(), ((ci.upper - 15.0) / 15.0).abs(), epsilon = 1e-12);

    let exact = Evaluator::new(&model)
        .evaluate(&mut policy, &EvaluationConfig::exhaustive())
        .unwrap()
        .exact_expected_value
        .unwrap();
    assert!((result.mean() - exact).abs() < 5.0 * ci.std_error);
}

#[test]
fn zero_bound_gives_unavailable_gap() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let bound = DeterministicBound::new(0.0, OptimizationSense::Maximize);
    for config in [
        EvaluationConfig::exhaustive(),
        EvaluationConfig::new(SimulationCount::Paths(1)),
        EvaluationConfig::new(SimulationCount::Paths(10)),
    ] {
        let result = Evaluator::new(&model)
            .with_bound(bound)
            .evaluate(&mut policy, &config)
            .unwrap();
        assert_eq!(result.gap, Gap::Unavailable);
        assert!(result.gap.as_f64().is_nan());
    }
}

#[test]
fn worker_counts_fill_every_cell() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let evaluator = Evaluator::new(&model);

    let serial = evaluator
        .evaluate(&mut policy, &EvaluationConfig::exhaustive().with_workers(1))
        .unwrap();
    let split = evaluator
        .evaluate(&mut policy, &EvaluationConfig::exhaustive().with_workers(4))
        .unwrap();
    assert_eq!(split.n_workers, 4);
    assert_eq!(serial.policy_values, split.policy_values);
    assert!(split.policy_values.iter().all(|&v| v >= 3.0));

    let random = EvaluationConfig::new(SimulationCount::Paths(8));
    for workers in [1, 4] {
        let result = evaluator
            .evaluate(&mut policy, &random.clone().with_workers(workers))
            .unwrap();
        assert_eq!(result.policy_values.len(), 8);
        assert!(result.policy_values.iter().all(|&v| v >= 3.0));
    }
}

#[test]
fn fixed_worker_count_reproduces_draws() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let config = EvaluationConfig::new(SimulationCount::Paths(40)).with_workers(3);
    let a = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();
    let b = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();
    assert_eq!(a.policy_values, b.policy_values);

    let reseeded = config.clone().with_worker_seed_high(17);
    let c = Evaluator::new(&model).evaluate(&mut policy, &reseeded).unwrap();
    assert_ne!(a.policy_values, c.policy_values);
}

#[test]
fn queries_fill_tables_and_leave_unknown_names_unavailable() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let config = EvaluationConfig::exhaustive()
        .with_queries(["level", "storage"])
        .with_stage_cost(true);
    let result = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();

    let costs = result.stage_costs.as_ref().unwrap();
    assert_eq!(costs.shape(), (3, 16));
    assert!(costs.is_complete());
    for j in 0..16 {
        let total: f64 = costs.column(j).into_iter().flatten().sum();
        assert_relative_eq!(total, result.policy_values[j], epsilon = 1e-12);
    }

    let level = &result.solutions["level"];
    assert!(level.is_complete());
    let paths = result.sample_paths.as_ref().unwrap();
    assert_eq!(level.get(2, 5), Some(paths[5].outcomes[2] as f64));

    let storage = &result.solutions["storage"];
    assert!(storage.row(0).unwrap().iter().all(Option::is_none));
    assert!(result.dual_solutions.is_empty());
}

#[test]
fn queries_with_several_workers_fail_fast() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    policy.fail_at = Some(0);
    let config = EvaluationConfig::new(SimulationCount::Paths(8))
        .with_workers(4)
        .with_stage_cost(true);
    let err = Evaluator::new(&model)
        .evaluate(&mut policy, &config)
        .unwrap_err();
    assert!(matches!(err, MspError::UnsupportedCombination(_)));
}

#[test]
fn invalid_parameters_are_rejected() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    for config in [
        EvaluationConfig::default().with_percentile(0.0),
        EvaluationConfig::default().with_percentile(100.0),
        EvaluationConfig::default().with_workers(0),
        EvaluationConfig::new(SimulationCount::Paths(0)),
    ] {
        let err = Evaluator::new(&model)
            .evaluate(&mut policy, &config)
            .unwrap_err();
        assert!(matches!(err, MspError::InvalidParameter(_)), "{err}");
    }
}

#[test]
fn solver_failure_aborts_the_evaluation() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    policy.fail_at = Some(5);
    for workers in [1, 4] {
        let config = EvaluationConfig::exhaustive().with_workers(workers);
        let err = Evaluator::new(&model)
            .evaluate(&mut policy, &config)
            .unwrap_err();
        match err {
            MspError::Solver { path, source } => {
                assert_eq!(path, 5);
                assert!(source.to_string().contains("infeasible"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

fn continuous_model(discretized: bool) -> ProbabilityModel {
    let mut b = ProbabilityModelBuilder::new(3).unwrap();
    b.set_markovian_continuous(Arc::new(Ar1Generator::new(vec![0.0], 0.0, 0.5, 1.0)))
        .unwrap();
    if discretized {
        b.discretize(
            vec![
                vec![vec![0.0]],
                vec![vec![-1.0], vec![1.0]],
                vec![vec![-1.0], vec![1.0]],
            ],
            vec![
                vec![vec![1.0]],
                vec![vec![0.5, 0.5]],
                vec![vec![0.6, 0.4], vec![0.4, 0.6]],
            ],
        )
        .unwrap();
    }
    b.build().unwrap()
}

/// Charges the squared trajectory level in true mode and the sum of Markov states otherwise.
///
/// Fails when handed data that does not belong to the requested mode.
#[derive(Clone)]
struct TrajectoryPolicy<'m> {
    model: &'m ProbabilityModel,
}

impl PolicySimulator for TrajectoryPolicy<'_> {
    fn simulate(
        &mut self,
        request: &SimulationRequest<'_>,
        rng: &mut EvalRng,
    ) -> Result<PathOutcome, SolverError> {
        let value = match (request.solve_true, request.trajectory, request.markov_states) {
            (true, Some(traj), Some(_)) => (0..traj.n_stages())
                .filter_map(|t| traj.point(t))
                .map(|p| p[0].powi(2))
                .sum(),
            (false, None, Some(states)) => states.iter().map(|&k| k as f64).sum(),
            (false, None, None) => {
                let path = draw_sample_path(self.model, request.n_stages - 1, rng)?;
                path.markov_states
                    .ok_or("discretized path without Markov states")?
                    .iter()
                    .map(|&k| k as f64)
                    .sum()
            }
            _ => return Err("request carries the wrong path data for its mode".into()),
        };
        Ok(PathOutcome::new(value))
    }
}

#[test]
fn true_mode_evaluates_continuous_trajectories() {
    let model = continuous_model(true);
    let config = EvaluationConfig::new(SimulationCount::Paths(32))
        .with_mode(EvaluationMode::True)
        .with_seed(9)
        .with_workers(2);
    let result = Evaluator::new(&model)
        .evaluate(&mut TrajectoryPolicy { model: &model }, &config)
        .unwrap();

    let sample = result.markovian.as_ref().unwrap();
    assert_eq!(sample.len(), 32);
    for (j, value) in result.policy_values.iter().enumerate() {
        let expected: f64 = (0..3)
            .map(|t| sample.trajectories.point(j, t).unwrap()[0].powi(2))
            .sum();
        assert_relative_eq!(*value, expected, epsilon = 1e-12);
    }

}

#[test]
fn approximation_mode_samples_the_discretized_chain() {
    let model = continuous_model(true);
    let config = EvaluationConfig::new(SimulationCount::Paths(64))
        .with_seed(9)
        .with_workers(2);
    let mut policy = TrajectoryPolicy { model: &model };
    let approx = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();

    assert!(approx.markovian.is_none());
    assert_eq!(approx.n_sample_paths(), 64);
    // Stage 0 is state 0; stages 1 and 2 each land in state 0 or 1.
    assert!(approx.policy_values.iter().all(|&v| (0.0..=2.0).contains(&v)));
    assert!(approx.policy_values.iter().any(|&v| v > 0.0));
    assert!(approx.confidence_interval.is_some());

    let again = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();
    assert_eq!(approx.policy_values, again.policy_values);
}

#[test]
fn continuous_process_restrictions() {
    let model = continuous_model(true);
    let mut policy = TrajectoryPolicy { model: &model };
    let err = Evaluator::new(&model)
        .evaluate(
            &mut policy,
            &EvaluationConfig::exhaustive().with_mode(EvaluationMode::True),
        )
        .unwrap_err();
    assert!(matches!(err, MspError::InvalidParameter(_)));

    let exhaustive = Evaluator::new(&model)
        .evaluate(&mut policy, &EvaluationConfig::exhaustive())
        .unwrap();
    assert_eq!(exhaustive.n_sample_paths(), 4);

    let raw = continuous_model(false);
    let mut raw_policy = TrajectoryPolicy { model: &raw };
    let err = Evaluator::new(&raw)
        .evaluate(&mut raw_policy, &EvaluationConfig::new(SimulationCount::Paths(4)))
        .unwrap_err();
    assert!(matches!(err, MspError::NotDiscretized));
    assert!(err.is_configuration());
}

#[test]
fn config_loaded_from_json_drives_evaluation() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let config = EvaluationConfig::from_json(
        r#"{"simulations": {"paths": 12}, "percentile": 90.0, "n_workers": 2}"#,
    )
    .unwrap();
    let result = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();
    assert_eq!(result.n_sample_paths(), 12);
    assert_relative_eq!(result.confidence_interval.unwrap().percentile, 90.0);
}

#[cfg(feature = "parallel")]
#[test]
fn thread_pool_matches_inline_shares() {
    let model = markov_model();
    let mut policy = StagePolicy::new(&model);
    let config = EvaluationConfig::new(SimulationCount::Paths(64)).with_workers(8);
    let pooled = Evaluator::new(&model).evaluate(&mut policy, &config).unwrap();

    // Rerunning each share by hand with its own worker RNG gives the same values.
    let jobs = multistage::eval::allocate_jobs(64, 8);
    let mut expected = Vec::with_capacity(64);
    for job in jobs {
        let mut rng = multistage::eval::worker_rng(u32::MAX, job.start);
        for _ in job {
            let path = draw_sample_path(&model, 2, &mut rng).unwrap();
            let states = path.markov_states.unwrap();
            expected.push(
                (0..3)
                    .map(|t| stage_cost(path.outcomes[t], states[t]))
                    .sum::<f64>(),
            );
        }
    }
    assert_eq!(pooled.policy_values, expected);
}
