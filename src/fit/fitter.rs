//! Single-curve decay fitting.
//!
//! Given one survival curve `(m_i, y_i, σ_i)` we:
//! - build the initial guess from the first two points
//! - minimise `Σ ((A·α^m_i + B - y_i)/σ_i)²` with bounded Levenberg-Marquardt
//! - scale `pinv(JᵀJ)` by the reduced chi-square for parameter errors
//! - convert `α` to an error per Clifford
//!
//! Weights are dropped (σ_i = 1) when any deviation is zero or absent.

use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{QubitPattern, SurvivalCurve};
use crate::error::{FitFailure, RbError};
use crate::fit::guess::initial_guess;
use crate::fit::options::{ErrorPropagation, FitOptions, ParamBounds, Weighting};
use crate::fit::propagate;
use crate::math::{covariance_from_jacobian, levenberg_marquardt};
use crate::models::{DecayProblem, PARAM_COUNT};

pub const PARAM_NAMES: [&str; PARAM_COUNT] = ["A", "alpha", "B"];

/// A fit that succeeded but should not be taken at face value.
#[derive(Debug, Clone, PartialEq)]
pub enum FitWarning {
    /// The Jacobian at the optimum has fewer than three independent columns.
    RankDeficient { rank: usize },
    /// Standard error larger than `ratio` times the parameter.
    IllConditioned { param: &'static str, value: f64, error: f64 },
    NonFiniteError { param: &'static str },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::RankDeficient { rank } => write!(f, "Jacobian rank {rank} < {PARAM_COUNT}"),
            FitWarning::IllConditioned { param, value, error } => {
                write!(f, "{param} = {value:.6} has standard error {error:.3e}")
            }
            FitWarning::NonFiniteError { param } => write!(f, "{param} has no finite standard error"),
        }
    }
}

/// Solver bookkeeping that is not part of the exported record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitDiagnostics {
    pub iterations: usize,
    /// `χ² / (n - 3)` of the (possibly weighted) residuals.
    pub reduced_chi_sq: f64,
    /// Whether `1/σ` residual scaling was used.
    pub weighted: bool,
    pub warnings: Vec<FitWarning>,
}

/// Fitted decay of one curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayFit {
    /// `[A, alpha, B]`.
    pub params: [f64; PARAM_COUNT],
    pub params_err: [f64; PARAM_COUNT],
    pub epc: f64,
    pub epc_err: f64,
    #[serde(skip)]
    pub diagnostics: FitDiagnostics,
}

impl DecayFit {
    pub fn alpha(&self) -> f64 {
        self.params[1]
    }

    pub fn alpha_err(&self) -> f64 {
        self.params_err[1]
    }

    pub fn is_well_conditioned(&self) -> bool {
        self.diagnostics.warnings.is_empty()
    }
}

/// Fits `A·α^m + B` to survival curves.
#[derive(Debug, Clone, Default)]
pub struct DecayCurveFitter {
    options: FitOptions,
}

impl DecayCurveFitter {
    pub fn new(options: FitOptions) -> Result<Self, RbError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn propagation(&self) -> ErrorPropagation {
        self.options.propagation
    }

    /// Fit one group's curve.
    pub fn fit(&self, group: usize, curve: &SurvivalCurve, dimension: u64) -> Result<DecayFit, RbError> {
        let n = curve.len();
        if curve.lengths.len() != n {
            return Err(RbError::shape(format!(
                "group {group}: {} lengths for {n} survival points",
                curve.lengths.len()
            )));
        }
        if n <= PARAM_COUNT {
            return Err(self.failure(
                group,
                FitFailure::TooFewPoints {
                    points: n,
                    params: PARAM_COUNT,
                },
            ));
        }

        let sigma = match self.options.weighting {
            Weighting::Auto => curve.sigma(),
            Weighting::Unweighted => None,
        };
        let problem = DecayProblem {
            lengths: &curve.lengths,
            y: &curve.mean,
            sigma,
        };

        let x0 = DVector::from_row_slice(&initial_guess(curve, dimension));
        let bounds = self.options.bounds.to_bounds();
        let solution = levenberg_marquardt(&problem, &x0, &bounds, &self.options.lm_settings())
            .map_err(|reason| self.failure(group, reason))?;

        let dof = (n - PARAM_COUNT) as f64;
        let reduced_chi_sq = solution.chi_sq / dof;
        let mut warnings = Vec::new();

        let params_err: [f64; PARAM_COUNT] = match covariance_from_jacobian(&solution.jacobian) {
            Some(cov) => {
                if cov.rank < PARAM_COUNT {
                    warnings.push(FitWarning::RankDeficient { rank: cov.rank });
                }
                std::array::from_fn(|i| (cov.matrix[(i, i)] * reduced_chi_sq).sqrt())
            }
            None => {
                warnings.push(FitWarning::RankDeficient { rank: 0 });
                [f64::INFINITY; PARAM_COUNT]
            }
        };
        let params: [f64; PARAM_COUNT] = std::array::from_fn(|i| solution.params[i]);
        warnings.extend(error_warnings(&params, &params_err, self.options.ill_conditioned_ratio));
        for w in &warnings {
            warn!(group, warning = %w, "ill-conditioned decay fit");
        }

        let (alpha, alpha_err) = (params[1], params_err[1]);
        debug!(group, alpha, iterations = solution.iterations, reduced_chi_sq, "decay fit converged");

        Ok(DecayFit {
            params,
            params_err,
            epc: propagate::epc(alpha, dimension),
            epc_err: propagate::epc_err(alpha, alpha_err, dimension, self.options.propagation),
            diagnostics: FitDiagnostics {
                iterations: solution.iterations,
                reduced_chi_sq,
                weighted: sigma.is_some(),
                warnings,
            },
        })
    }

    /// Same options with different parameter bounds.
    pub fn with_bounds(&self, bounds: ParamBounds) -> Self {
        Self {
            options: FitOptions {
                bounds,
                ..self.options.clone()
            },
        }
    }

    /// Fit every group's curve, on the rayon pool when `parallel` is set.
    ///
    /// Failures stay with their group; only a curve count that does not
    /// match the pattern fails the whole call.
    pub fn fit_all(
        &self,
        curves: &[SurvivalCurve],
        pattern: &QubitPattern,
    ) -> Result<Vec<Result<DecayFit, RbError>>, RbError> {
        if curves.len() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} curves for {} groups",
                curves.len(),
                pattern.len()
            )));
        }
        let one = |(g, curve): (usize, &SurvivalCurve)| self.fit(g, curve, pattern.dimension(g));
        Ok(if self.options.parallel {
            curves.par_iter().enumerate().map(one).collect()
        } else {
            curves.iter().enumerate().map(one).collect()
        })
    }

    fn failure(&self, group: usize, reason: FitFailure) -> RbError {
        warn!(group, reason = %reason, "decay fit failed");
        RbError::FitConvergence { group, reason }
    }
}

/// Flag parameters whose standard error is non-finite or exceeds `ratio`
/// times the parameter's magnitude.
pub fn error_warnings(params: &[f64; PARAM_COUNT], params_err: &[f64; PARAM_COUNT], ratio: f64) -> Vec<FitWarning> {
    params
        .iter()
        .zip(params_err)
        .enumerate()
        .filter_map(|(i, (&value, &error))| {
            if !error.is_finite() {
                Some(FitWarning::NonFiniteError { param: PARAM_NAMES[i] })
            } else if error > ratio * value.abs() {
                Some(FitWarning::IllConditioned {
                    param: PARAM_NAMES[i],
                    value,
                    error,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay_curve(a: f64, alpha: f64, b: f64, lengths: &[u32]) -> SurvivalCurve {
        SurvivalCurve {
            lengths: lengths.to_vec(),
            mean: lengths.iter().map(|&m| a * alpha.powi(m as i32) + b).collect(),
            std: None,
            seeds: 1,
        }
    }

    const LENGTHS: [u32; 10] = [1, 21, 41, 61, 81, 101, 121, 141, 161, 181];

    #[test]
    fn recovers_noise_free_parameters_away_from_guess() {
        // B = 0.3 differs from 1/d, so the solver has to move every parameter.
        let curve = decay_curve(0.65, 0.97, 0.3, &LENGTHS);
        let fit = DecayCurveFitter::default().fit(0, &curve, 4).unwrap();
        assert!((fit.params[0] - 0.65).abs() < 1e-6, "{:?}", fit.params);
        assert!((fit.params[1] - 0.97).abs() < 1e-7, "{:?}", fit.params);
        assert!((fit.params[2] - 0.3).abs() < 1e-6, "{:?}", fit.params);
        assert!(!fit.diagnostics.weighted);
    }

    #[test]
    fn epc_follows_returned_alpha() {
        let curve = decay_curve(0.7, 0.98, 0.25, &LENGTHS);
        let fit = DecayCurveFitter::default().fit(0, &curve, 4).unwrap();
        assert_eq!(fit.epc, 0.75 * (1.0 - fit.params[1]));
    }

    #[test]
    fn fitting_twice_is_bit_identical() {
        let mut curve = decay_curve(0.7, 0.98, 0.25, &LENGTHS);
        for (i, y) in curve.mean.iter_mut().enumerate() {
            *y += if i % 2 == 0 { 0.004 } else { -0.003 };
        }
        curve.std = Some(vec![0.01; LENGTHS.len()]);
        let fitter = DecayCurveFitter::default();
        let first = fitter.fit(0, &curve, 4).unwrap();
        let second = fitter.fit(0, &curve, 4).unwrap();
        assert_eq!(first, second);
        assert!(first.diagnostics.weighted);
        assert!(first.params_err.iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn zero_deviation_disables_weights() {
        let mut curve = decay_curve(0.7, 0.98, 0.25, &LENGTHS);
        let mut std = vec![0.01; LENGTHS.len()];
        std[3] = 0.0;
        curve.std = Some(std);
        let fit = DecayCurveFitter::default().fit(0, &curve, 4).unwrap();
        assert!(!fit.diagnostics.weighted);
    }

    #[test]
    fn too_few_points_is_a_convergence_failure() {
        let curve = decay_curve(0.7, 0.98, 0.25, &[1, 10, 20]);
        let err = DecayCurveFitter::default().fit(3, &curve, 2).unwrap_err();
        assert_eq!(
            err,
            RbError::FitConvergence {
                group: 3,
                reason: FitFailure::TooFewPoints { points: 3, params: 3 }
            }
        );
    }

    #[test]
    fn iteration_cap_surfaces_as_failure() {
        let curve = decay_curve(0.65, 0.97, 0.3, &LENGTHS);
        let options = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };
        let err = DecayCurveFitter::new(options).unwrap().fit(0, &curve, 4).unwrap_err();
        assert_eq!(err.code(), "fit_convergence");
    }

    #[test]
    fn flat_curve_still_reports_a_fit() {
        let curve = SurvivalCurve {
            lengths: LENGTHS.to_vec(),
            mean: (0..LENGTHS.len()).map(|i| if i % 2 == 0 { 0.999 } else { 0.997 }).collect(),
            std: None,
            seeds: 1,
        };
        let fit = DecayCurveFitter::default().fit(0, &curve, 4).unwrap();
        assert!(fit.epc.is_finite());
    }

    #[test]
    fn large_or_missing_errors_are_flagged() {
        let warnings = error_warnings(&[0.01, 0.99, 0.5], &[0.5, 0.001, f64::NAN], 1.0);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], FitWarning::IllConditioned { param: "A", .. }));
        assert_eq!(warnings[1], FitWarning::NonFiniteError { param: "B" });
        assert!(error_warnings(&[0.7, 0.98, 0.25], &[0.01, 0.001, 0.01], 1.0).is_empty());
    }

    #[test]
    fn fit_all_keeps_group_order_and_isolates_failures() {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2], vec![3]]).unwrap();
        let curves = vec![
            decay_curve(0.7, 0.98, 0.25, &LENGTHS),
            decay_curve(0.5, 0.99, 0.5, &LENGTHS[..3]),
            decay_curve(0.45, 0.95, 0.5, &LENGTHS),
        ];
        for parallel in [true, false] {
            let fitter = DecayCurveFitter::new(FitOptions {
                parallel,
                ..FitOptions::default()
            })
            .unwrap();
            let fits = fitter.fit_all(&curves, &pattern).unwrap();
            assert!((fits[0].as_ref().unwrap().params[1] - 0.98).abs() < 1e-7);
            assert!(fits[1].is_err());
            assert!((fits[2].as_ref().unwrap().params[1] - 0.95).abs() < 1e-7);
        }
    }

    #[test]
    fn fit_all_rejects_more_curves_than_groups() {
        let pattern = QubitPattern::new(vec![vec![0]]).unwrap();
        let curves = vec![decay_curve(0.7, 0.98, 0.25, &LENGTHS); 2];
        let err = DecayCurveFitter::default().fit_all(&curves, &pattern).unwrap_err();
        assert_eq!(err.code(), "shape_mismatch");
    }
}
