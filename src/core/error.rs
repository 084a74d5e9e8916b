//! Error taxonomy for model setup, sample-path handling and policy evaluation.

use thiserror::Error;

use super::types::ProcessType;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MspError>;

/// Boxed error returned by the external policy/solver collaborator.
pub type SolverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the probability model, the path utilities and the evaluator.
#[derive(Debug, Error)]
pub enum MspError {
    /// A process type was already set on the model.
    #[error("process type already configured as {existing}; cannot switch to {requested}")]
    AlreadyConfigured {
        existing: ProcessType,
        requested: ProcessType,
    },

    /// A continuous Markovian process was used where Markov states are required.
    #[error("Markovian continuous process must be discretized first")]
    NotDiscretized,

    /// Any other setup inconsistency.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed Markov states, transition matrices or outcome sets.
    #[error("dimension error: {0}")]
    Dimension(String),

    /// A probability row does not sum to one (or holds a negative entry).
    #[error("stochasticity error at stage {stage}, row {row}: probabilities sum to {sum}")]
    Stochasticity { stage: usize, row: usize, sum: f64 },

    /// Generator output or discretization disagrees with the fixed Markov-state dimension.
    #[error("Markovian dimension mismatch: expected {expected}, found {found}")]
    MarkovianDimension { expected: usize, found: usize },

    /// A bad evaluation or lookup parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Parameters that are valid on their own but cannot be combined.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// Failure of the policy/solver collaborator, passed through unchanged.
    #[error("policy simulation failed on sample path {path}")]
    Solver {
        path: usize,
        #[source]
        source: SolverError,
    },
}

impl MspError {
    /// True for errors raised while configuring the model rather than evaluating it.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConfigured { .. } | Self::NotDiscretized | Self::Configuration(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }
}
