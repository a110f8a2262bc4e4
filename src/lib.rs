//! `rb-curves` library crate.
//!
//! Turns randomized-benchmarking outcome counts into decay fits and error
//! rates:
//!
//! - `data` aggregates raw records into survival (or purity) curves per group
//! - `fit` fits each curve to `A·α^m + B` and derives EPC-style metrics for
//!   the standard, interleaved, purity and CNOT-dihedral variants
//! - `report` holds the serialisable output records

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;
