use std::fmt;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Explicit random source handed to every sampling call.
pub type EvalRng = StdRng;

/// Tolerance used when checking that probability rows sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1.0e-6;

/// Kind of uncertainty driving the multistage program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    /// Stage-wise independent finite outcome sets.
    Independent,
    /// Finite Markov chain given by states and transition matrices.
    MarkovChain,
    /// Continuous Markovian process sampled from a generator.
    MarkovianContinuous,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Independent => "stage-wise independent",
            Self::MarkovChain => "Markov chain",
            Self::MarkovianContinuous => "Markovian continuous",
        };
        f.write_str(name)
    }
}

/// Optimization sense of the underlying program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationSense {
    /// Minimization (`+1`).
    Minimize,
    /// Maximization (`-1`).
    Maximize,
}

impl OptimizationSense {
    /// Returns +1 for minimization and -1 for maximization.
    pub fn sign(self) -> i8 {
        match self {
            Self::Minimize => 1,
            Self::Maximize => -1,
        }
    }
}

/// Known deterministic bound on the optimal value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeterministicBound {
    /// Bound value (lower bound when minimizing, upper bound when maximizing).
    pub value: f64,
    /// Sense of the program the bound belongs to.
    pub sense: OptimizationSense,
}

impl DeterministicBound {
    pub fn new(value: f64, sense: OptimizationSense) -> Self {
        Self { value, sense }
    }
}

/// Relative gap between an estimate and the deterministic bound.
///
/// `Unavailable` is the single representation of an undefined gap (zero or missing bound).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Gap {
    /// Relative gap, non-negative.
    Value(f64),
    /// The gap could not be computed.
    #[default]
    Unavailable,
}

impl Gap {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(g) => Some(g),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Numeric view for tabular output; `Unavailable` maps to NaN.
    pub fn as_f64(self) -> f64 {
        self.value().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(g) => write!(f, "{:.4}%", 100.0 * g),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_unavailable_maps_to_nan() {
        assert!(Gap::Unavailable.as_f64().is_nan());
        assert_eq!(Gap::Value(0.25).value(), Some(0.25));
        assert_eq!(Gap::Unavailable.to_string(), "unavailable");
    }

    #[test]
    fn sense_sign_matches_convention() {
        assert_eq!(OptimizationSense::Minimize.sign(), 1);
        assert_eq!(OptimizationSense::Maximize.sign(), -1);
    }
}
