//! Numerical building blocks: SVD least squares, covariance, and a bounded
//! Levenberg-Marquardt solver.

pub mod lm;
pub mod ols;

pub use lm::*;
pub use ols::*;
