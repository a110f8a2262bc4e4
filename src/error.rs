//! Crate-wide error types.
//!
//! Two failure families matter to callers:
//!
//! - `ShapeMismatch`: the records, pattern and length axes disagree. This is a
//!   contract violation and aborts the whole aggregation call.
//! - `FitConvergence`: the least-squares solver gave up on one group. Fitters
//!   store these per group so the remaining groups still report.

use thiserror::Error;

/// Why a decay fit did not produce parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    #[error("singular Jacobian")]
    SingularJacobian,
    #[error("no convergence within {0} iterations")]
    MaxIterations(usize),
    #[error("damping exhausted without reducing the cost")]
    NoProgress,
    #[error("non-finite residuals or Jacobian")]
    NonFinite,
    #[error("{points} points cannot determine {params} parameters with a covariance")]
    TooFewPoints { points: usize, params: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RbError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("fit did not converge for group {group}: {reason}")]
    FitConvergence { group: usize, reason: FitFailure },

    #[error("invalid fit options: {0}")]
    InvalidOptions(String),

    #[error("cannot parse {0}")]
    Parse(String),
}

impl RbError {
    pub fn shape(message: impl Into<String>) -> Self {
        RbError::ShapeMismatch(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RbError::ShapeMismatch(_) => "shape_mismatch",
            RbError::FitConvergence { .. } => "fit_convergence",
            RbError::InvalidOptions(_) => "invalid_options",
            RbError::Parse(_) => "parse",
        }
    }
}
