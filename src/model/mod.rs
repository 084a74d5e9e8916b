//! Probability model: outcome sets, Markov chains and continuous generators.

pub mod generator;
pub mod markov;
pub mod outcomes;
pub mod probability;

pub use generator::{Ar1Generator, FnGenerator, MarkovianGenerator, Trajectories, TrajectoryView};
pub use markov::MarkovChain;
pub use outcomes::{OutcomeStructure, StageOutcomes};
pub use probability::{ProbabilityModel, ProbabilityModelBuilder};
