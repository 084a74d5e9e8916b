//! Core domain types and the library-wide error structure.

pub mod error;
pub mod types;

pub use error::{MspError, Result, SolverError};
pub use types::*;

/// Stage index `t` in `[0, T)`.
pub type Stage = usize;
