//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the experiment layout (`QubitPattern`, `LengthAxis`, `LengthAxes`)
//! - raw circuit results (`CircuitLabel`, `RawOutcomeRecord`)
//! - aggregated survival curves (`SurvivalCurve`)

pub mod types;

pub use types::*;
