//! From raw outcome records to survival curves.
//!
//! - `counts`: outcome-key parsing and per-group marginals
//! - `aggregate`: seed accumulators and `SurvivalAggregator`
//! - `purity`: Pauli-basis purity reconstruction and `PurityAggregator`
//! - `sample`: synthetic records from known decay parameters

pub mod aggregate;
pub mod counts;
pub mod purity;
pub mod sample;

pub use aggregate::*;
pub use counts::*;
pub use purity::*;
pub use sample::*;
