//! Curve fitting.
//!
//! Responsibilities:
//!
//! - fit one survival curve to `A·α^m + B` (`DecayCurveFitter`)
//! - turn decay parameters into error rates with propagated errors
//! - combine curves per variant: standard, interleaved, purity, dihedral

pub mod dihedral;
pub mod fitter;
pub mod guess;
pub mod interleaved;
pub mod options;
pub mod propagate;
pub mod purity;
pub mod standard;
pub mod variant;

pub use dihedral::*;
pub use fitter::*;
pub use guess::*;
pub use interleaved::*;
pub use options::*;
pub use purity::*;
pub use standard::*;
pub use variant::*;
