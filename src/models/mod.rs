//! Exponential decay model.
//!
//! Evaluation is kept to small, pure functions so the solver and the
//! initial-guess code can stay generic.

pub mod model;

pub use model::*;
