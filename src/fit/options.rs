//! Fit configuration.

use serde::{Deserialize, Serialize};

use crate::error::RbError;
use crate::math::{Bounds, LmSettings};

/// Smallest admissible alpha; keeps `α^(m-1)` finite at `m = 0`.
pub const ALPHA_FLOOR: f64 = 1e-12;

fn default_max_iterations() -> usize {
    400
}

fn default_tolerance() -> f64 {
    1e-12
}

fn default_ill_conditioned_ratio() -> f64 {
    1.0
}

fn default_parallel() -> bool {
    true
}

/// Which residual scaling the solver uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// `1/std` when every point has a non-zero deviation, else unweighted.
    #[default]
    Auto,
    Unweighted,
}

/// How parameter errors turn into EPC errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPropagation {
    /// First-order delta method on the derived quantity.
    #[default]
    Delta,
    /// Relative alpha error (`σα/α`), matching published standard RB numbers.
    Relative,
}

/// Box bounds on `[A, α, B]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            lower: [0.0; 3],
            upper: [1.0; 3],
        }
    }
}

impl ParamBounds {
    /// Bounds for purity curves.
    ///
    /// Purity lies in `[1/d, 1]`, but seed averages of shot-noise estimates
    /// overshoot 1, so `A` and `B` get a unit margin on both sides.
    pub fn purity() -> Self {
        Self {
            lower: [-1.0, 0.0, -1.0],
            upper: [2.0, 1.0, 2.0],
        }
    }

    fn validate(&self, name: &str) -> Result<(), RbError> {
        for i in 0..3 {
            let (lo, hi) = (self.lower[i], self.upper[i]);
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(RbError::InvalidOptions(format!(
                    "{name} for parameter {i} must be finite with lower < upper"
                )));
            }
        }
        if self.upper[1] <= ALPHA_FLOOR {
            return Err(RbError::InvalidOptions(format!("{name}: alpha upper bound must be > 0")));
        }
        Ok(())
    }

    /// Solver bounds, with alpha held strictly positive.
    pub fn to_bounds(&self) -> Bounds {
        let mut lower = self.lower;
        lower[1] = lower[1].max(ALPHA_FLOOR);
        Bounds::new(&lower, &self.upper)
    }
}

/// Options shared by every fitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Solver iteration cap.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Relative cost-reduction tolerance.
    #[serde(default = "default_tolerance")]
    pub ftol: f64,
    /// Relative step-size tolerance.
    #[serde(default = "default_tolerance")]
    pub xtol: f64,
    /// Projected-gradient tolerance.
    #[serde(default = "default_tolerance")]
    pub gtol: f64,
    #[serde(default)]
    pub bounds: ParamBounds,
    /// Bounds used instead of `bounds` when fitting purity curves.
    #[serde(default = "ParamBounds::purity")]
    pub purity_bounds: ParamBounds,
    #[serde(default)]
    pub weighting: Weighting,
    #[serde(default)]
    pub propagation: ErrorPropagation,
    /// A parameter whose standard error exceeds this multiple of its value
    /// is flagged as ill-conditioned.
    #[serde(default = "default_ill_conditioned_ratio")]
    pub ill_conditioned_ratio: f64,
    /// Fit groups on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            ftol: default_tolerance(),
            xtol: default_tolerance(),
            gtol: default_tolerance(),
            bounds: ParamBounds::default(),
            purity_bounds: ParamBounds::purity(),
            weighting: Weighting::default(),
            propagation: ErrorPropagation::default(),
            ill_conditioned_ratio: default_ill_conditioned_ratio(),
            parallel: default_parallel(),
        }
    }
}

impl FitOptions {
    pub fn validate(&self) -> Result<(), RbError> {
        if self.max_iterations == 0 {
            return Err(RbError::InvalidOptions("max_iterations must be > 0".into()));
        }
        for (name, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(RbError::InvalidOptions(format!("{name} must be finite and >= 0")));
            }
        }
        self.bounds.validate("bounds")?;
        self.purity_bounds.validate("purity_bounds")?;
        if !(self.ill_conditioned_ratio.is_finite() && self.ill_conditioned_ratio > 0.0) {
            return Err(RbError::InvalidOptions("ill_conditioned_ratio must be > 0".into()));
        }
        Ok(())
    }

    /// Parse and validate options from JSON; missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, RbError> {
        let options: Self =
            serde_json::from_str(text).map_err(|e| RbError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn lm_settings(&self) -> LmSettings {
        LmSettings {
            max_iterations: self.max_iterations,
            ftol: self.ftol,
            xtol: self.xtol,
            gtol: self.gtol,
            ..LmSettings::default()
        }
    }
}
