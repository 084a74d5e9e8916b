//! Canonical probability model of a multistage stochastic process.
//!
//! Setup happens on a [`ProbabilityModelBuilder`], which the enclosing program mutates while it
//! declares its uncertainty. [`ProbabilityModelBuilder::build`] validates everything once and
//! freezes the result into a read-only [`ProbabilityModel`] that evaluation borrows.
//!
//! # Examples
//! ```rust
//! use multistage::model::{ProbabilityModelBuilder, StageOutcomes};
//!
//! let mut builder = ProbabilityModelBuilder::new(3).unwrap();
//! builder
//!     .set_markov_chain(
//!         vec![vec![vec![0.0]], vec![vec![1.0], vec![2.0]], vec![vec![1.0], vec![2.0]]],
//!         vec![
//!             vec![vec![1.0]],
//!             vec![vec![0.3, 0.7]],
//!             vec![vec![0.6, 0.4], vec![0.2, 0.8]],
//!         ],
//!     )
//!     .unwrap()
//!     .stage_outcomes(1, StageOutcomes::uniform(2))
//!     .unwrap();
//! let model = builder.build().unwrap();
//! assert_eq!(model.n_markov_states(2), 2);
//! assert_eq!(model.probability_of(1, 1, Some(0)).unwrap(), 0.5);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use super::generator::MarkovianGenerator;
use super::markov::MarkovChain;
use super::outcomes::{OutcomeStructure, StageOutcomes};
use crate::core::{EvalRng, MspError, ProcessType, Result, Stage};

/// Seed used to check a generator's output shape during setup.
const SHAPE_CHECK_SEED: u64 = 0;
const SHAPE_CHECK_SAMPLES: usize = 2;

/// Mutable setup state of a probability model.
pub struct ProbabilityModelBuilder {
    n_stages: usize,
    process: Option<ProcessType>,
    chain: Option<MarkovChain>,
    generator: Option<Arc<dyn MarkovianGenerator>>,
    declared_dim: Option<usize>,
    stage_outcomes: Vec<Option<StageOutcomes>>,
    state_outcomes: BTreeMap<(Stage, usize), StageOutcomes>,
}

impl fmt::Debug for ProbabilityModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbabilityModelBuilder")
            .field("n_stages", &self.n_stages)
            .field("process", &self.process)
            .field("discretized", &self.chain.is_some())
            .field("declared_dim", &self.declared_dim)
            .finish()
    }
}

impl ProbabilityModelBuilder {
    /// Starts a model over `n_stages >= 2` stages.
    pub fn new(n_stages: usize) -> Result<Self> {
        if n_stages < 2 {
            return Err(MspError::invalid(format!(
                "a multistage program needs at least 2 stages, got {n_stages}"
            )));
        }
        Ok(Self {
            n_stages,
            process: None,
            chain: None,
            generator: None,
            declared_dim: None,
            stage_outcomes: vec![None; n_stages],
            state_outcomes: BTreeMap::new(),
        })
    }

    pub fn n_stages(&self) -> usize {
        self.n_stages
    }

    pub fn process_type(&self) -> Option<ProcessType> {
        self.process
    }

    fn ensure_unconfigured(&self, requested: ProcessType) -> Result<()> {
        match self.process {
            Some(existing) => Err(MspError::AlreadyConfigured {
                existing,
                requested,
            }),
            None => Ok(()),
        }
    }

    fn check_declared_dim(&self, found: usize) -> Result<()> {
        match self.declared_dim {
            Some(expected) if expected != found => {
                Err(MspError::MarkovianDimension { expected, found })
            }
            _ => Ok(()),
        }
    }

    fn checked_chain(
        &self,
        states: Vec<Vec<Vec<f64>>>,
        transitions: Vec<Vec<Vec<f64>>>,
    ) -> Result<MarkovChain> {
        let chain = MarkovChain::new(states, transitions)?;
        if chain.n_stages() != self.n_stages {
            return Err(MspError::dimension(format!(
                "Markov chain covers {} stages, the program has {}",
                chain.n_stages(),
                self.n_stages
            )));
        }
        Ok(chain)
    }

    /// Declares the process stage-wise independent.
    pub fn set_independent(&mut self) -> Result<&mut Self> {
        self.ensure_unconfigured(ProcessType::Independent)?;
        self.process = Some(ProcessType::Independent);
        Ok(self)
    }

    /// Declares a finite Markov chain from per-stage states and transition matrices.
    pub fn set_markov_chain(
        &mut self,
        states: Vec<Vec<Vec<f64>>>,
        transitions: Vec<Vec<Vec<f64>>>,
    ) -> Result<&mut Self> {
        self.ensure_unconfigured(ProcessType::MarkovChain)?;
        let chain = self.checked_chain(states, transitions)?;
        self.check_declared_dim(chain.dim())?;
        self.chain = Some(chain);
        self.process = Some(ProcessType::MarkovChain);
        Ok(self)
    }

    /// Declares a continuous Markovian process sampled from `generator`.
    ///
    /// The generator is run once to confirm it produces `(n, T, dim)` output.
    pub fn set_markovian_continuous(
        &mut self,
        generator: Arc<dyn MarkovianGenerator>,
    ) -> Result<&mut Self> {
        self.ensure_unconfigured(ProcessType::MarkovianContinuous)?;
        let dim = generator.dim();
        self.check_declared_dim(dim)?;

        let mut rng = EvalRng::seed_from_u64(SHAPE_CHECK_SEED);
        let trial = generator.generate(&mut rng, SHAPE_CHECK_SAMPLES, self.n_stages);
        let (n, t, found) = trial.shape();
        if n != SHAPE_CHECK_SAMPLES || t != self.n_stages {
            return Err(MspError::dimension(format!(
                "generator returned shape ({n}, {t}, {found}), expected ({SHAPE_CHECK_SAMPLES}, {}, {dim})",
                self.n_stages
            )));
        }
        if found != dim {
            return Err(MspError::MarkovianDimension {
                expected: dim,
                found,
            });
        }

        self.generator = Some(generator);
        self.process = Some(ProcessType::MarkovianContinuous);
        Ok(self)
    }

    /// Installs the Markov-chain approximation of a continuous process.
    ///
    /// May be called again to replace an earlier discretization.
    pub fn discretize(
        &mut self,
        states: Vec<Vec<Vec<f64>>>,
        transitions: Vec<Vec<Vec<f64>>>,
    ) -> Result<&mut Self> {
        let generator_dim = match (self.process, &self.generator) {
            (Some(ProcessType::MarkovianContinuous), Some(g)) => g.dim(),
            _ => {
                return Err(MspError::Configuration(
                    "only a Markovian continuous process can be discretized".to_string(),
                ));
            }
        };
        let chain = self.checked_chain(states, transitions)?;
        if chain.dim() != generator_dim {
            return Err(MspError::MarkovianDimension {
                expected: generator_dim,
                found: chain.dim(),
            });
        }
        self.chain = Some(chain);
        Ok(self)
    }

    /// Fixes the Markov-state dimension the stage models index into.
    pub fn declare_dimension(&mut self, dim: usize) -> Result<&mut Self> {
        let configured = self
            .chain
            .as_ref()
            .map(MarkovChain::dim)
            .or_else(|| self.generator.as_ref().map(|g| g.dim()))
            .or(self.declared_dim);
        if let Some(expected) = configured {
            if expected != dim {
                return Err(MspError::MarkovianDimension {
                    expected,
                    found: dim,
                });
            }
        }
        self.declared_dim = Some(dim);
        Ok(self)
    }

    /// Sets the outcome set of stage `t`, shared by all Markov states of that stage.
    pub fn stage_outcomes(&mut self, t: Stage, outcomes: StageOutcomes) -> Result<&mut Self> {
        self.check_stage(t)?;
        outcomes.validate(t, 0)?;
        self.stage_outcomes[t] = Some(outcomes);
        Ok(self)
    }

    /// Sets the outcome set of stage `t` conditional on Markov state `k`.
    pub fn state_outcomes(
        &mut self,
        t: Stage,
        k: usize,
        outcomes: StageOutcomes,
    ) -> Result<&mut Self> {
        self.check_stage(t)?;
        outcomes.validate(t, k)?;
        self.state_outcomes.insert((t, k), outcomes);
        Ok(self)
    }

    fn check_stage(&self, t: Stage) -> Result<()> {
        if t >= self.n_stages {
            return Err(MspError::invalid(format!(
                "stage {t} is beyond the horizon of {} stages",
                self.n_stages
            )));
        }
        Ok(())
    }

    fn resolve_outcomes(&self) -> Result<OutcomeStructure> {
        let shared = |t: Stage| self.stage_outcomes[t].clone().unwrap_or_default();

        let Some(chain) = &self.chain else {
            if !self.state_outcomes.is_empty() {
                return Err(MspError::Configuration(
                    "per-Markov-state outcomes require Markov states".to_string(),
                ));
            }
            return Ok(OutcomeStructure::Independent(
                (0..self.n_stages).map(shared).collect(),
            ));
        };

        if let Some(&(t, k)) = self
            .state_outcomes
            .keys()
            .find(|&&(t, k)| k >= chain.n_states(t))
        {
            return Err(MspError::dimension(format!(
                "outcomes given for Markov state ({t}, {k}) but stage {t} has {} states",
                chain.n_states(t)
            )));
        }

        let mut stages = Vec::with_capacity(self.n_stages);
        for t in 0..self.n_stages {
            let row: Vec<StageOutcomes> = (0..chain.n_states(t))
                .map(|k| {
                    self.state_outcomes
                        .get(&(t, k))
                        .cloned()
                        .unwrap_or_else(|| shared(t))
                })
                .collect();
            let n = row[0].n_samples();
            if let Some((k, o)) = row.iter().enumerate().find(|(_, o)| o.n_samples() != n) {
                return Err(MspError::dimension(format!(
                    "stage {t}: Markov state {k} has {} outcomes, state 0 has {n}",
                    o.n_samples()
                )));
            }
            stages.push(row);
        }
        Ok(OutcomeStructure::PerMarkovState(stages))
    }

    /// Validates the setup and freezes it.
    ///
    /// A builder with no declared process type yields a stage-wise independent model.
    pub fn build(&self) -> Result<ProbabilityModel> {
        let process = self.process.unwrap_or(ProcessType::Independent);
        let outcomes = self.resolve_outcomes()?;

        let first = outcomes.n_samples(0);
        if first != 1 {
            return Err(MspError::Configuration(format!(
                "first stage must be deterministic, found {first} outcomes"
            )));
        }

        let outcome_samplers = match &outcomes {
            OutcomeStructure::Independent(stages) => stages
                .iter()
                .map(|o| Ok(vec![weighted_index(&o.probabilities())?]))
                .collect::<Result<Vec<_>>>()?,
            OutcomeStructure::PerMarkovState(stages) => stages
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|o| weighted_index(&o.probabilities()))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let transition_samplers = match &self.chain {
            Some(chain) => (0..self.n_stages)
                .map(|t| {
                    let rows = if t == 0 { 1 } else { chain.n_states(t - 1) };
                    (0..rows)
                        .map(|i| weighted_index(chain.transition_row(t, i)))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(ProbabilityModel {
            n_stages: self.n_stages,
            process,
            outcomes,
            chain: self.chain.clone(),
            generator: self.generator.clone(),
            outcome_samplers,
            transition_samplers,
        })
    }
}

fn weighted_index(weights: &[f64]) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights).map_err(|e| MspError::dimension(format!("bad weights: {e}")))
}

/// Frozen, read-only probability model.
#[derive(Clone)]
pub struct ProbabilityModel {
    n_stages: usize,
    process: ProcessType,
    outcomes: OutcomeStructure,
    chain: Option<MarkovChain>,
    generator: Option<Arc<dyn MarkovianGenerator>>,
    outcome_samplers: Vec<Vec<WeightedIndex<f64>>>,
    transition_samplers: Vec<Vec<WeightedIndex<f64>>>,
}

impl fmt::Debug for ProbabilityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbabilityModel")
            .field("n_stages", &self.n_stages)
            .field("process", &self.process)
            .field("outcomes", &self.outcomes)
            .field("chain", &self.chain)
            .field("has_generator", &self.generator.is_some())
            .finish()
    }
}

impl ProbabilityModel {
    pub fn n_stages(&self) -> usize {
        self.n_stages
    }

    pub fn process_type(&self) -> ProcessType {
        self.process
    }

    /// True when Markov states are available (a chain, or a discretized continuous process).
    pub fn has_markov_states(&self) -> bool {
        self.chain.is_some()
    }

    /// True for a continuous process whose Markov-chain approximation is installed.
    pub fn is_discretized(&self) -> bool {
        self.process == ProcessType::MarkovianContinuous && self.chain.is_some()
    }

    pub fn markov_chain(&self) -> Option<&MarkovChain> {
        self.chain.as_ref()
    }

    pub fn generator(&self) -> Option<&dyn MarkovianGenerator> {
        self.generator.as_deref()
    }

    pub fn outcomes(&self) -> &OutcomeStructure {
        &self.outcomes
    }

    pub fn n_samples(&self, t: Stage) -> usize {
        self.outcomes.n_samples(t)
    }

    /// Markov states at stage `t`; 1 when the process has none.
    pub fn n_markov_states(&self, t: Stage) -> usize {
        self.chain.as_ref().map_or(1, |c| c.n_states(t))
    }

    /// Dimension of the Markov states, if the process has any notion of one.
    pub fn dim_markov_states(&self) -> Option<usize> {
        self.chain
            .as_ref()
            .map(MarkovChain::dim)
            .or_else(|| self.generator.as_ref().map(|g| g.dim()))
    }

    /// Probability of outcome `outcome` at stage `t`, conditional on `markov_state` when the
    /// outcome sets depend on it.
    pub fn probability_of(
        &self,
        t: Stage,
        outcome: usize,
        markov_state: Option<usize>,
    ) -> Result<f64> {
        let set = self.outcomes.outcomes(t, markov_state)?;
        set.probability(outcome).ok_or_else(|| {
            MspError::invalid(format!(
                "stage {t}: outcome {outcome} out of range ({} outcomes)",
                set.n_samples()
            ))
        })
    }

    /// Transition probability into Markov state `to` at stage `t` from `from` at `t - 1`.
    ///
    /// Stage 0 is the certain transition `[[1]]`.
    pub fn transition_probability(&self, t: Stage, from: usize, to: usize) -> Result<f64> {
        self.require_chain()?.transition(t, from, to)
    }

    /// The Markov chain, or the error matching why the process has none.
    fn require_chain(&self) -> Result<&MarkovChain> {
        match (&self.chain, self.process) {
            (Some(chain), _) => Ok(chain),
            (None, ProcessType::MarkovianContinuous) => Err(MspError::NotDiscretized),
            (None, _) => Err(MspError::invalid("the process has no Markov states")),
        }
    }

    /// Draws the outcome index of stage `t` given the current Markov state.
    pub fn sample_outcome(
        &self,
        t: Stage,
        markov_state: Option<usize>,
        rng: &mut EvalRng,
    ) -> Result<usize> {
        let row = self
            .outcome_samplers
            .get(t)
            .ok_or_else(|| MspError::invalid(format!("stage {t} is beyond the horizon")))?;
        let sampler = match &self.outcomes {
            OutcomeStructure::Independent(_) => &row[0],
            OutcomeStructure::PerMarkovState(_) => {
                let k = markov_state.ok_or_else(|| {
                    MspError::invalid(format!("stage {t}: a Markov-state index is required"))
                })?;
                row.get(k).ok_or_else(|| {
                    MspError::invalid(format!("stage {t}: Markov state {k} out of range"))
                })?
            }
        };
        Ok(sampler.sample(rng))
    }

    /// Draws the Markov state of stage `t` given state `from` at stage `t - 1`.
    pub fn sample_transition(&self, t: Stage, from: usize, rng: &mut EvalRng) -> Result<usize> {
        self.require_chain()?;
        let sampler = self
            .transition_samplers
            .get(t)
            .and_then(|rows| rows.get(from))
            .ok_or_else(|| {
                MspError::invalid(format!("transition from state {from} at stage {t} out of range"))
            })?;
        Ok(sampler.sample(rng))
    }
}
